//! Operator alerts raised by the controller.

use serde::Serialize;

use crate::failover::audit::BoundedLog;
use crate::observability::metrics;
use crate::registry::{now_millis, MemberId, Tier, Timestamp};

const ALERT_HISTORY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AlertKind {
    /// The last active member of a load-balanced tier was taken out of rotation.
    PoolExhausted,
    /// A backend pool update kept failing after every retry.
    RoutingRetryExhausted,
}

impl AlertKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertKind::PoolExhausted => "pool_exhausted",
            AlertKind::RoutingRetryExhausted => "routing_retry_exhausted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub tier: Tier,
    pub member_id: Option<MemberId>,
    pub message: String,
    pub raised_at: Timestamp,
}

/// Recent alerts, newest last.
#[derive(Debug)]
pub struct AlertLog {
    log: BoundedLog<Alert>,
}

impl Default for AlertLog {
    fn default() -> Self {
        Self::new(ALERT_HISTORY)
    }
}

impl AlertLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            log: BoundedLog::new(capacity),
        }
    }

    pub fn raise(
        &self,
        kind: AlertKind,
        tier: Tier,
        member_id: Option<MemberId>,
        message: impl Into<String>,
    ) -> Alert {
        let alert = Alert {
            kind,
            tier,
            member_id,
            message: message.into(),
            raised_at: now_millis(),
        };
        tracing::error!(
            kind = kind.as_str(),
            tier = %alert.tier,
            member = ?alert.member_id.as_ref().map(MemberId::as_str),
            message = %alert.message,
            "ALERT"
        );
        metrics::record_alert(kind.as_str());
        self.log.push(alert.clone());
        alert
    }

    pub fn recent(&self) -> Vec<Alert> {
        self.log.snapshot()
    }

    /// Number of retained alerts of `kind`.
    pub fn count(&self, kind: AlertKind) -> usize {
        self.log.snapshot().iter().filter(|a| a.kind == kind).count()
    }
}
