//! Replica-set status polling.
//!
//! The replica set elects its own primary; this poller only observes the
//! outcome (`rs.status()`-shaped readings) and hands roles to the controller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::time;

use crate::config::ReplicaSetConfig;
use crate::health::event::{HealthEvent, RoleObservation};
use crate::registry::{now_millis, Member, MemberRegistry, Role, Tier};

/// Errors while reading replica-set status.
#[derive(Debug, Error)]
pub enum ReplicaStatusError {
    #[error("status request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("status endpoint returned HTTP {0}")]
    Status(u16),
}

/// One member entry of a status reading.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReplicaMemberStatus {
    /// `host:port` as the replica set knows the member.
    pub name: String,
    /// `PRIMARY`, `SECONDARY`, `RECOVERING`, ...
    #[serde(rename = "stateStr")]
    pub state: String,
}

#[derive(Debug, Deserialize)]
struct ReplicaStatusDocument {
    #[serde(default)]
    members: Vec<ReplicaMemberStatus>,
}

/// Source of replica-set status readings.
#[async_trait]
pub trait ReplicaStatusSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<ReplicaMemberStatus>, ReplicaStatusError>;
}

/// Reads status JSON from an HTTP endpoint.
pub struct HttpReplicaStatus {
    client: reqwest::Client,
    url: String,
}

impl HttpReplicaStatus {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ReplicaStatusError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ReplicaStatusSource for HttpReplicaStatus {
    async fn fetch(&self) -> Result<Vec<ReplicaMemberStatus>, ReplicaStatusError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ReplicaStatusError::Status(status.as_u16()));
        }
        let document: ReplicaStatusDocument = response.json().await?;
        Ok(document.members)
    }
}

fn role_from_state(state: &str) -> Role {
    match state.trim().to_ascii_uppercase().as_str() {
        "PRIMARY" => Role::Primary,
        "SECONDARY" => Role::Secondary,
        _ => Role::Unknown,
    }
}

fn matches_member(name: &str, member: &Member) -> bool {
    let host = name.rsplit_once(':').map_or(name, |(host, _)| host);
    name.eq_ignore_ascii_case(member.endpoint.as_str())
        || name.eq_ignore_ascii_case(member.id.as_str())
        || host.eq_ignore_ascii_case(member.id.as_str())
}

/// Map a status reading onto registered db members.
///
/// Members missing from the reading are reported as `Unknown`; entries that
/// match no member are ignored.
pub fn resolve_roles(db_members: &[Member], statuses: &[ReplicaMemberStatus]) -> Vec<RoleObservation> {
    db_members
        .iter()
        .map(|member| {
            let role = statuses
                .iter()
                .find(|s| matches_member(&s.name, member))
                .map_or(Role::Unknown, |s| role_from_state(&s.state));
            RoleObservation {
                member_id: member.id.clone(),
                role,
            }
        })
        .collect()
}

/// Periodically reads replica-set status and forwards roles.
pub struct ReplicaStatusPoller {
    registry: Arc<MemberRegistry>,
    source: Arc<dyn ReplicaStatusSource>,
    events: mpsc::Sender<HealthEvent>,
    interval: Duration,
}

impl ReplicaStatusPoller {
    pub fn new(
        registry: Arc<MemberRegistry>,
        source: Arc<dyn ReplicaStatusSource>,
        events: mpsc::Sender<HealthEvent>,
        config: &ReplicaSetConfig,
    ) -> Self {
        Self {
            registry,
            source,
            events,
            interval: Duration::from_millis(config.interval_ms),
        }
    }

    /// Take one reading and publish it.
    pub async fn poll_once(&self) -> Result<(), ReplicaStatusError> {
        let statuses = self.source.fetch().await?;
        let roles = resolve_roles(&self.registry.snapshot(Tier::Db), &statuses);
        let event = HealthEvent::RolesObserved {
            observed_at: now_millis(),
            roles,
        };
        if self.events.send(event).await.is_err() {
            tracing::debug!("Controller channel closed, dropping role observation");
        }
        Ok(())
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if self.registry.count(Tier::Db) == 0 {
            tracing::info!("No db members, replica status polling disabled");
            return;
        }

        tracing::info!(interval_ms = self.interval.as_millis() as u64, "Replica status poller starting");
        let mut ticker = time::interval(self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        tracing::warn!(error = %e, "Replica status poll failed, roles unchanged");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Replica status poller received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
