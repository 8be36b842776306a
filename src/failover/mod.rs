//! Failover subsystem.
//!
//! # Data Flow
//! ```text
//! HealthMonitor / ReplicaStatusPoller
//!     → mpsc channel
//!     → dispatcher.rs (one FIFO queue per tier)
//!     → controller.rs
//!         web/app: registry + TrafficRouter (retried), alerts.rs on trouble
//!         db:      registry + quorum.rs, RecoveryOrchestrator on quorum loss
//!     → audit.rs (recent transitions for operators)
//! ```
//!
//! # Design Decisions
//! - Tiers never block each other; a slow pool API only delays its own tier
//! - No automatic promotion of a db primary

pub mod alerts;
pub mod audit;
pub mod controller;
pub mod dispatcher;
pub mod quorum;

pub use alerts::{Alert, AlertKind, AlertLog};
pub use controller::{FailoverController, TierStatus};
pub use quorum::{QuorumState, QuorumTracker};
