//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Probing (probe.rs):
//!     HTTP GET / TCP connect → ProbeResult (never an error)
//!
//! Monitoring (monitor.rs):
//!     Per-member timer or forced re-probe
//!     → probe with hard deadline
//!     → state.rs hysteresis
//!     → event.rs ProbeObserved / Transition → controller channel
//!
//! Replica status (replica.rs):
//!     Periodic rs.status() reading → RolesObserved → controller channel
//! ```
//!
//! # Design Decisions
//! - Network faults stop here; only modeled state travels upward
//! - State transitions require consecutive successes/failures
//! - Health state is per-member, not per-tier

pub mod event;
pub mod monitor;
pub mod probe;
pub mod replica;
pub mod state;

pub use event::{HealthEvent, ProbeSummary, RoleObservation, StateTransitionEvent};
pub use monitor::{HealthMonitor, ProbeScheduler};
pub use probe::{NetworkProbeClient, ProbeClient, ProbeErrorKind, ProbeResult};
pub use replica::{HttpReplicaStatus, ReplicaStatusPoller, ReplicaStatusSource};
pub use state::{HealthTracker, Transition};
