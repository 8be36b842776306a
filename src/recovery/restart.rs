//! Instance restarts.
//!
//! # Responsibilities
//! - Restart the VM behind a web/app member through an external mechanism
//! - Map every failure onto [`RecoveryError`]
//!
//! # Design Decisions
//! - Restart is fire-and-confirm: success means the mechanism accepted the
//!   request, not that the member is healthy again
//! - Every restart has a deadline

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::process::Command;
use uuid::Uuid;

use crate::config::{RecoveryConfig, RestartKind};
use crate::registry::{Member, MemberId, Tier};

/// Placeholder substituted with the member id in command arguments.
pub const MEMBER_PLACEHOLDER: &str = "{member}";

#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("unknown member '{0}'")]
    NotFound(MemberId),

    #[error("member '{id}' is in the {tier} tier; only web and app members can be restarted")]
    UnsupportedTier { id: MemberId, tier: Tier },

    #[error("instance restarts are disabled")]
    Disabled,

    #[error("restart command failed: {0}")]
    Command(String),

    #[error("restart webhook failed: {0}")]
    Webhook(String),

    #[error("restart timed out after {0:?}")]
    Timeout(Duration),

    #[error("unknown incident {0}")]
    IncidentNotFound(Uuid),

    #[error("incident {0} is already resolved")]
    IncidentResolved(Uuid),
}

/// Confirmation of an accepted restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestartAck {
    pub member_id: MemberId,
    /// Whether an immediate re-probe was scheduled.
    pub reprobe_requested: bool,
}

/// Restarts the instance behind a member.
#[async_trait]
pub trait InstanceRestarter: Send + Sync {
    async fn restart(&self, member: &Member) -> Result<(), RecoveryError>;
}

/// Used when no restart mechanism is configured.
#[derive(Debug, Default)]
pub struct DisabledRestarter;

#[async_trait]
impl InstanceRestarter for DisabledRestarter {
    async fn restart(&self, _member: &Member) -> Result<(), RecoveryError> {
        Err(RecoveryError::Disabled)
    }
}

/// Runs a local program, e.g. `az vm restart --name {member}`.
#[derive(Debug, Clone)]
pub struct CommandRestarter {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandRestarter {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    /// Arguments with the member placeholder filled in.
    pub fn args_for(&self, member: &MemberId) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.replace(MEMBER_PLACEHOLDER, member.as_str()))
            .collect()
    }
}

#[async_trait]
impl InstanceRestarter for CommandRestarter {
    async fn restart(&self, member: &Member) -> Result<(), RecoveryError> {
        let args = self.args_for(&member.id);
        tracing::info!(member = %member.id, program = %self.program, args = ?args, "Running restart command");

        let output = Command::new(&self.program)
            .args(&args)
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, output).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(RecoveryError::Command(e.to_string())),
            Err(_) => return Err(RecoveryError::Timeout(self.timeout)),
        };

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(RecoveryError::Command(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )))
        }
    }
}

/// Posts `{"member": id, "tier": tier}` to an automation endpoint.
#[derive(Debug, Clone)]
pub struct WebhookRestarter {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct RestartRequest<'a> {
    member: &'a str,
    tier: Tier,
}

impl WebhookRestarter {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, RecoveryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RecoveryError::Webhook(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
            timeout,
        })
    }
}

#[async_trait]
impl InstanceRestarter for WebhookRestarter {
    async fn restart(&self, member: &Member) -> Result<(), RecoveryError> {
        tracing::info!(member = %member.id, url = %self.url, "Requesting restart via webhook");
        let body = RestartRequest {
            member: member.id.as_str(),
            tier: member.tier,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RecoveryError::Timeout(self.timeout)
                } else {
                    RecoveryError::Webhook(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(RecoveryError::Webhook(format!("HTTP {}", status.as_u16())))
        }
    }
}

/// Build the restarter selected by `[recovery]`.
pub fn restarter_from_config(config: &RecoveryConfig) -> Result<Arc<dyn InstanceRestarter>, RecoveryError> {
    let timeout = Duration::from_secs(config.timeout_secs);
    match config.restart {
        RestartKind::Disabled => Ok(Arc::new(DisabledRestarter)),
        RestartKind::Command => {
            let program = config
                .program
                .clone()
                .ok_or_else(|| RecoveryError::Command("recovery.program is not set".to_string()))?;
            Ok(Arc::new(CommandRestarter::new(program, config.args.clone(), timeout)))
        }
        RestartKind::Webhook => {
            let url = config
                .webhook_url
                .clone()
                .ok_or_else(|| RecoveryError::Webhook("recovery.webhook_url is not set".to_string()))?;
            Ok(Arc::new(WebhookRestarter::new(url, timeout)?))
        }
    }
}
