//! Backend pool subsystem.
//!
//! # Data Flow
//! ```text
//! FailoverController decides rotation membership
//!     → TrafficRouter::set_member_active(member, bool)
//!         - pool.rs (in-process pool, dry runs and tests)
//!         - http.rs (external pool-management API)
//!     → Ack or RoutingError (caller retries with backoff)
//! ```
//!
//! # Design Decisions
//! - Updates are idempotent: setting the current state is a successful no-op
//! - The real pool is eventually consistent; callers never wait for the edge
//!   to reflect a change

pub mod http;
pub mod pool;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::registry::{Member, MemberId};

pub use http::HttpPoolRouter;
pub use pool::BackendPool;

/// Acknowledgement of a rotation update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Ack {
    /// False when the member was already in the requested state.
    pub changed: bool,
}

/// Errors from the backend pool boundary.
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("backend pool rejected update: HTTP {status}")]
    Rejected { status: u16 },

    #[error("backend pool unreachable: {0}")]
    Transport(String),

    #[error("backend pool call timed out after {0:?}")]
    Timeout(Duration),

    #[error("member '{0}' is not in any backend pool")]
    UnknownMember(MemberId),

    #[error("invalid backend pool configuration: {0}")]
    Config(String),
}

/// Boundary to the load balancer's backend pool.
#[async_trait]
pub trait TrafficRouter: Send + Sync {
    /// Put `member` into (`true`) or take it out of (`false`) rotation.
    async fn set_member_active(&self, member: &Member, active: bool) -> Result<Ack, RoutingError>;
}
