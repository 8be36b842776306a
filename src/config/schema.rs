//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the harness.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::registry::Tier;

/// Root configuration for the failover harness.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct WatchConfig {
    /// Per-tier probe policies.
    pub tiers: TiersConfig,

    /// Static member topology.
    pub members: Vec<MemberConfig>,

    /// Backend pool adapter.
    pub routing: RoutingConfig,

    /// Retry policy for backend pool updates.
    pub retries: RetryConfig,

    /// Recovery actions.
    pub recovery: RecoveryConfig,

    /// Replica-set status polling for the db tier.
    pub replica_set: ReplicaSetConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Operator API.
    pub admin: AdminConfig,
}

/// A member declared in the topology.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MemberConfig {
    /// Unique member identifier (VM name).
    pub id: String,

    /// Tier the member belongs to.
    pub tier: Tier,

    /// Probe address, `host` or `host:port`.
    pub address: String,

    /// Availability zone label.
    #[serde(default)]
    pub zone: String,

    /// Replica-set vote (db tier only, default true).
    #[serde(default)]
    pub voting: Option<bool>,
}

/// Health probe protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeProtocol {
    Http,
    Tcp,
}

/// Probe settings of one tier as written in the file.
///
/// Unset fields fall back to the tier's defaults, see [`TierConfig::resolve`].
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TierConfig {
    /// `http` or `tcp`.
    pub probe: Option<ProbeProtocol>,

    /// Path for HTTP probes.
    pub path: Option<String>,

    /// Port appended to member addresses that carry none.
    pub default_port: Option<u16>,

    /// Probe interval in milliseconds.
    pub interval_ms: Option<u64>,

    /// Probe timeout in milliseconds.
    pub timeout_ms: Option<u64>,

    /// Consecutive failures before a member is marked unhealthy.
    pub unhealthy_threshold: Option<u32>,

    /// Consecutive successes before a recovering member is marked healthy.
    pub healthy_threshold: Option<u32>,
}

/// What to probe and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeKind {
    /// GET `path`; success is a status in 200..=399.
    Http { path: String },
    /// TCP connect.
    Tcp,
}

/// Fully resolved probe policy for one tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbePolicy {
    pub kind: ProbeKind,
    pub default_port: u16,
    pub interval: Duration,
    pub timeout: Duration,
    pub unhealthy_threshold: u32,
    pub healthy_threshold: u32,
}

impl ProbePolicy {
    /// Deadline after which the scheduler abandons a probe.
    pub fn hard_deadline(&self) -> Duration {
        self.timeout.saturating_mul(2)
    }
}

impl TierConfig {
    /// Fill unset fields with the defaults for `tier`.
    ///
    /// Web and app tiers probe `/health` over HTTP like the platform load
    /// balancers; the db tier connects to the MongoDB port.
    pub fn resolve(&self, tier: Tier) -> ProbePolicy {
        let (protocol, port) = match tier {
            Tier::Web => (ProbeProtocol::Http, 80),
            Tier::App => (ProbeProtocol::Http, 3000),
            Tier::Db => (ProbeProtocol::Tcp, 27017),
        };
        let kind = match self.probe.unwrap_or(protocol) {
            ProbeProtocol::Http => ProbeKind::Http {
                path: normalize_path(self.path.as_deref().unwrap_or("/health")),
            },
            ProbeProtocol::Tcp => ProbeKind::Tcp,
        };

        ProbePolicy {
            kind,
            default_port: self.default_port.unwrap_or(port),
            interval: Duration::from_millis(self.interval_ms.unwrap_or(15_000)),
            timeout: Duration::from_millis(self.timeout_ms.unwrap_or(5_000)),
            unhealthy_threshold: self.unhealthy_threshold.unwrap_or(2),
            healthy_threshold: self.healthy_threshold.unwrap_or(2),
        }
    }
}

fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

/// Probe settings for every tier.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TiersConfig {
    pub web: TierConfig,
    pub app: TierConfig,
    pub db: TierConfig,
}

impl TiersConfig {
    pub fn get(&self, tier: Tier) -> &TierConfig {
        match tier {
            Tier::Web => &self.web,
            Tier::App => &self.app,
            Tier::Db => &self.db,
        }
    }

    pub fn get_mut(&mut self, tier: Tier) -> &mut TierConfig {
        match tier {
            Tier::Web => &mut self.web,
            Tier::App => &mut self.app,
            Tier::Db => &mut self.db,
        }
    }

    /// Resolved policy for `tier`.
    pub fn policy(&self, tier: Tier) -> ProbePolicy {
        self.get(tier).resolve(tier)
    }
}

/// Backend pool adapter selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingKind {
    /// In-process pool; nothing leaves the harness.
    Memory,
    /// External pool-management HTTP API.
    Http,
}

/// Backend pool adapter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub kind: RoutingKind,

    /// Base URL of the pool-management API (kind = "http").
    pub base_url: Option<String>,

    /// Per-call timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            kind: RoutingKind::Memory,
            base_url: None,
            timeout_ms: 10_000,
        }
    }
}

/// Retry configuration for backend pool updates.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, first call included.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Interval of the rotation reconcile pass in seconds.
    pub reconcile_interval_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            reconcile_interval_secs: 60,
        }
    }
}

/// How members are restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RestartKind {
    Disabled,
    Command,
    Webhook,
}

/// Recovery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RecoveryConfig {
    pub restart: RestartKind,

    /// Program to run (restart = "command"), e.g. "az".
    pub program: Option<String>,

    /// Arguments; `{member}` is replaced with the member id.
    pub args: Vec<String>,

    /// Webhook URL (restart = "webhook").
    pub webhook_url: Option<String>,

    /// Timeout of a restart action in seconds.
    pub timeout_secs: u64,

    /// Number of closed incidents kept for the operator surface.
    pub incident_history: usize,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            restart: RestartKind::Disabled,
            program: None,
            args: Vec::new(),
            webhook_url: None,
            timeout_secs: 300,
            incident_history: 100,
        }
    }
}

/// Replica-set status polling.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReplicaSetConfig {
    /// Endpoint returning `rs.status()`-shaped JSON. Polling is off when unset.
    pub status_url: Option<String>,

    /// Poll interval in milliseconds.
    pub interval_ms: u64,

    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for ReplicaSetConfig {
    fn default() -> Self {
        Self {
            status_url: None,
            interval_ms: 10_000,
            timeout_ms: 5_000,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,

    /// Number of transition events and alerts kept in memory.
    pub audit_capacity: usize,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
            audit_capacity: 256,
        }
    }
}

/// Operator API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the operator API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
