//! Operator incidents.
//!
//! Incidents are opened by the controller and closed only by an operator.

use std::sync::Mutex;

use serde::Serialize;
use uuid::Uuid;

use crate::recovery::restart::RecoveryError;
use crate::registry::{now_millis, Tier, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IncidentKind {
    QuorumLost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IncidentStatus {
    Open,
    Acknowledged,
    Resolved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Incident {
    pub id: Uuid,
    pub tier: Tier,
    pub kind: IncidentKind,
    pub reason: String,
    pub opened_at: Timestamp,
    pub status: IncidentStatus,
    pub acknowledged_at: Option<Timestamp>,
    pub resolved_at: Option<Timestamp>,
    pub resolution_note: Option<String>,
}

impl Incident {
    pub fn is_pending(&self) -> bool {
        self.status != IncidentStatus::Resolved
    }
}

/// Incidents in the order they were opened.
///
/// Once more than `history` incidents are held, the oldest resolved ones are
/// dropped. Pending incidents are never dropped.
#[derive(Debug)]
pub struct IncidentStore {
    incidents: Mutex<Vec<Incident>>,
    history: usize,
}

impl IncidentStore {
    pub fn new(history: usize) -> Self {
        Self {
            incidents: Mutex::new(Vec::new()),
            history: history.max(1),
        }
    }

    pub fn open(&self, tier: Tier, kind: IncidentKind, reason: String) -> Incident {
        let incident = Incident {
            id: Uuid::new_v4(),
            tier,
            kind,
            reason,
            opened_at: now_millis(),
            status: IncidentStatus::Open,
            acknowledged_at: None,
            resolved_at: None,
            resolution_note: None,
        };

        let mut incidents = self.incidents.lock().unwrap_or_else(|p| p.into_inner());
        incidents.push(incident.clone());
        while incidents.len() > self.history {
            match incidents.iter().position(|i| !i.is_pending()) {
                Some(idx) => {
                    incidents.remove(idx);
                }
                None => break,
            }
        }
        incident
    }

    pub fn all(&self) -> Vec<Incident> {
        self.incidents.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn pending(&self) -> Vec<Incident> {
        self.incidents
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .filter(|i| i.is_pending())
            .cloned()
            .collect()
    }

    fn modify<F>(&self, id: Uuid, f: F) -> Result<Incident, RecoveryError>
    where
        F: FnOnce(&mut Incident),
    {
        let mut incidents = self.incidents.lock().unwrap_or_else(|p| p.into_inner());
        let incident = incidents
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or(RecoveryError::IncidentNotFound(id))?;
        if !incident.is_pending() {
            return Err(RecoveryError::IncidentResolved(id));
        }
        f(incident);
        Ok(incident.clone())
    }

    /// Mark an incident as seen. Acknowledging twice is a no-op.
    pub fn acknowledge(&self, id: Uuid) -> Result<Incident, RecoveryError> {
        self.modify(id, |incident| {
            if incident.status == IncidentStatus::Open {
                incident.status = IncidentStatus::Acknowledged;
                incident.acknowledged_at = Some(now_millis());
            }
        })
    }

    pub fn resolve(&self, id: Uuid, note: Option<String>) -> Result<Incident, RecoveryError> {
        self.modify(id, |incident| {
            incident.status = IncidentStatus::Resolved;
            incident.resolved_at = Some(now_millis());
            incident.resolution_note = note;
        })
    }
}
