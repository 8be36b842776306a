//! Recovery subsystem.
//!
//! # Data Flow
//! ```text
//! FailoverController (db quorum lost)
//!     → orchestrator.rs request_manual_intervention → incidents.rs (Open)
//!     → operator: acknowledge / resolve via admin API
//!
//! Operator restart (admin API)
//!     → restart.rs InstanceRestarter (command / webhook)
//!     → HealthMonitor forced re-probe
//! ```

pub mod incidents;
pub mod orchestrator;
pub mod restart;

pub use incidents::{Incident, IncidentKind, IncidentStatus, IncidentStore};
pub use orchestrator::RecoveryOrchestrator;
pub use restart::{
    restarter_from_config, CommandRestarter, DisabledRestarter, InstanceRestarter, RecoveryError,
    RestartAck, WebhookRestarter,
};
