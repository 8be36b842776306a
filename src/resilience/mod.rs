//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to an external collaborator (backend pool API):
//!     → retries.rs (attempt, on failure wait and try again)
//!     → backoff.rs (exponential delay, capped, jittered)
//!     → exhaustion handed back to the caller for alerting
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Retry count is bounded so a dead dependency cannot cause a retry storm

pub mod backoff;
pub mod retries;

pub use retries::{retry_with_backoff, RetryExhausted, RetryPolicy};
