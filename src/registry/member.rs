//! Member records and the enums that classify them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the unix epoch.
pub type Timestamp = u64;

/// Current wall-clock time as a [`Timestamp`].
pub fn now_millis() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as Timestamp
}

/// Deployment tier. Each tier shares one failover policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Web,
    App,
    Db,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Web, Tier::App, Tier::Db];

    /// Only the db tier runs replica-set quorum logic.
    pub fn quorum_required(self) -> bool {
        matches!(self, Tier::Db)
    }

    /// Stateless tiers sit behind a load balancer backend pool.
    pub fn is_load_balanced(self) -> bool {
        !self.quorum_required()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Web => "web",
            Tier::App => "app",
            Tier::Db => "db",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Replica-set role of a db member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Primary,
    Secondary,
    Unknown,
}

/// Health as decided by the hysteresis state machine.
///
/// Suspect and Recovering only ever appear as a member's `phase`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HealthState {
    Unknown,
    Healthy,
    Suspect,
    Unhealthy,
    Recovering,
}

impl HealthState {
    /// Published states in which a member still belongs in its backend pool.
    pub fn is_routable(self) -> bool {
        matches!(self, HealthState::Healthy | HealthState::Unknown)
    }

    /// Only a currently-Healthy member's vote counts toward quorum.
    pub fn holds_vote(self) -> bool {
        self == HealthState::Healthy
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Stable member identifier, usually the VM name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(String);

impl MemberId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MemberId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A `host:port` pair to probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Endpoint(String);

impl Endpoint {
    /// Build an endpoint, appending `default_port` when `address` has none.
    ///
    /// Bracketed IPv6 literals (`[::1]:80`) are understood; a bare IPv6
    /// literal is bracketed before the port is added.
    pub fn resolve(address: &str, default_port: u16) -> Self {
        let address = address.trim();
        if has_port(address) {
            return Self(address.to_string());
        }
        if address.contains(':') && !address.starts_with('[') {
            return Self(format!("[{}]:{}", address, default_port));
        }
        Self(format!("{}:{}", address, default_port))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn has_port(address: &str) -> bool {
    if let Some(rest) = address.strip_prefix('[') {
        return rest
            .split_once("]:")
            .is_some_and(|(_, port)| port.parse::<u16>().is_ok());
    }
    match address.rsplit_once(':') {
        Some((host, port)) => !host.contains(':') && port.parse::<u16>().is_ok(),
        None => false,
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One backend instance.
///
/// Records are immutable once published by the registry; every update
/// produces a new record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub tier: Tier,
    pub endpoint: Endpoint,
    pub zone: String,
    /// Replica-set role; `None` outside the db tier.
    pub role: Option<Role>,
    /// Whether this member votes in replica-set elections.
    pub voting: bool,
    /// Published state; only Unknown, Healthy or Unhealthy.
    pub health: HealthState,
    /// Hysteresis phase after the latest probe, e.g. Suspect.
    pub phase: HealthState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub last_probe_at: Option<Timestamp>,
    pub last_transition_at: Option<Timestamp>,
}

impl Member {
    /// A freshly registered member in the `Unknown` state.
    pub fn new(id: MemberId, tier: Tier, endpoint: Endpoint, zone: impl Into<String>) -> Self {
        let quorum = tier.quorum_required();
        Self {
            id,
            tier,
            endpoint,
            zone: zone.into(),
            role: quorum.then_some(Role::Unknown),
            voting: quorum,
            health: HealthState::Unknown,
            phase: HealthState::Unknown,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_probe_at: None,
            last_transition_at: None,
        }
    }

    pub fn with_voting(mut self, voting: bool) -> Self {
        self.voting = voting && self.tier.quorum_required();
        self
    }

    pub fn is_primary(&self) -> bool {
        self.role == Some(Role::Primary)
    }

    /// True when this member currently contributes a vote to quorum.
    pub fn has_vote(&self) -> bool {
        self.voting && self.health.holds_vote()
    }
}
