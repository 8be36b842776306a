//! Member registry subsystem.
//!
//! # Data Flow
//! ```text
//! static topology (config)
//!     → store.rs (register once at startup)
//!     → FailoverController (sole writer: transitions, probe counters, roles)
//!     → readers: controller policy, admin API, orchestrator (copy-on-read)
//! ```
//!
//! # Design Decisions
//! - Members are never added or removed after startup
//! - Writes are serialized; reads never block on them
//! - Health state is ephemeral and rebuilt by re-probing after a restart

pub mod member;
pub mod store;

pub use member::{now_millis, Endpoint, HealthState, Member, MemberId, Role, Tier, Timestamp};
pub use store::{MemberRegistry, RegistryError, RegistryResult};
