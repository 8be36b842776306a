//! Recovery orchestrator.
//!
//! # Responsibilities
//! - Open incidents when the db tier needs a human (quorum loss)
//! - Let operators acknowledge and resolve incidents
//! - Restart web/app instances and re-probe them right away
//!
//! # Design Decisions
//! - Never promotes a db member; quorum loss only opens an incident
//! - Incidents stay pending until an operator resolves them

use std::sync::{Arc, OnceLock};

use uuid::Uuid;

use crate::health::ProbeScheduler;
use crate::observability::metrics;
use crate::recovery::incidents::{Incident, IncidentKind, IncidentStore};
use crate::recovery::restart::{InstanceRestarter, RecoveryError, RestartAck};
use crate::registry::{MemberId, MemberRegistry, Tier};

pub struct RecoveryOrchestrator {
    registry: Arc<MemberRegistry>,
    restarter: Arc<dyn InstanceRestarter>,
    scheduler: OnceLock<Arc<dyn ProbeScheduler>>,
    incidents: IncidentStore,
}

impl RecoveryOrchestrator {
    pub fn new(
        registry: Arc<MemberRegistry>,
        restarter: Arc<dyn InstanceRestarter>,
        incident_history: usize,
    ) -> Self {
        Self {
            registry,
            restarter,
            scheduler: OnceLock::new(),
            incidents: IncidentStore::new(incident_history),
        }
    }

    /// Connect the health monitor used for forced re-probes.
    ///
    /// The monitor is built after the orchestrator; only the first call wins.
    pub fn attach_scheduler(&self, scheduler: Arc<dyn ProbeScheduler>) {
        if self.scheduler.set(scheduler).is_err() {
            tracing::warn!("Probe scheduler already attached, ignoring");
        }
    }

    /// Record that `tier` needs manual intervention.
    pub fn request_manual_intervention(&self, tier: Tier, reason: impl Into<String>) -> Incident {
        let incident = self.incidents.open(tier, IncidentKind::QuorumLost, reason.into());
        tracing::error!(
            incident = %incident.id,
            tier = %tier,
            reason = %incident.reason,
            "Manual intervention required"
        );
        metrics::record_incident(tier);
        incident
    }

    /// Open and acknowledged incidents, oldest first.
    pub fn pending_incidents(&self) -> Vec<Incident> {
        self.incidents.pending()
    }

    pub fn incidents(&self) -> Vec<Incident> {
        self.incidents.all()
    }

    pub fn acknowledge(&self, id: Uuid) -> Result<Incident, RecoveryError> {
        let incident = self.incidents.acknowledge(id)?;
        tracing::info!(incident = %id, "Incident acknowledged");
        Ok(incident)
    }

    pub fn resolve(&self, id: Uuid, note: Option<String>) -> Result<Incident, RecoveryError> {
        let incident = self.incidents.resolve(id, note)?;
        tracing::info!(incident = %id, note = ?incident.resolution_note, "Incident resolved");
        Ok(incident)
    }

    /// Restart a web/app member and probe it without waiting for its next tick.
    pub async fn restart_member(&self, member_id: &MemberId) -> Result<RestartAck, RecoveryError> {
        let member = self
            .registry
            .get(member_id)
            .map_err(|_| RecoveryError::NotFound(member_id.clone()))?;

        if !member.tier.is_load_balanced() {
            return Err(RecoveryError::UnsupportedTier {
                id: member.id,
                tier: member.tier,
            });
        }

        self.restarter.restart(&member).await?;
        tracing::info!(member = %member.id, tier = %member.tier, "Restart accepted");

        let reprobe_requested = match self.scheduler.get() {
            Some(scheduler) => scheduler.request_probe(&member.id),
            None => {
                tracing::warn!(member = %member.id, "No probe scheduler attached, waiting for next tick");
                false
            }
        };

        Ok(RestartAck {
            member_id: member.id,
            reprobe_requested,
        })
    }
}
