//! Messages from the monitoring side to the failover controller.

use serde::Serialize;

use crate::registry::{HealthState, MemberId, Role, Tier, Timestamp};

/// A change of a member's health state.
///
/// Emitted exactly once per crossed threshold by the member's monitor task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateTransitionEvent {
    pub member_id: MemberId,
    pub tier: Tier,
    pub from: HealthState,
    pub to: HealthState,
    pub timestamp: Timestamp,
    pub reason: String,
}

/// Hysteresis counters and phase after one probe.
///
/// `phase` may be Suspect or Recovering; those never appear as transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeSummary {
    pub member_id: MemberId,
    pub tier: Tier,
    pub timestamp: Timestamp,
    pub success: bool,
    pub phase: HealthState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
}

/// A replica-set member's role as reported by the replica set itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleObservation {
    pub member_id: MemberId,
    pub role: Role,
}

/// Everything the controller consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    Transition(StateTransitionEvent),
    ProbeObserved(ProbeSummary),
    /// One complete replica-set status reading.
    RolesObserved {
        observed_at: Timestamp,
        roles: Vec<RoleObservation>,
    },
}

impl HealthEvent {
    /// Tier whose worker must handle this event.
    pub fn tier(&self) -> Tier {
        match self {
            HealthEvent::Transition(e) => e.tier,
            HealthEvent::ProbeObserved(s) => s.tier,
            HealthEvent::RolesObserved { .. } => Tier::Db,
        }
    }
}
