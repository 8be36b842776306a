//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! monitor, controller, orchestrator
//!     → logging.rs: tracing events with member / tier fields
//!     → metrics.rs: probe counts and latency, transitions, routing
//!                   attempts, alerts, incidents, quorum gauge
//!
//! Exported as:
//!     → stdout (pretty or JSON lines)
//!     → Prometheus scrape endpoint (observability.metrics_address)
//! ```
//!
//! # Design Decisions
//! - Alerts and incidents are logged at error so they surface without metrics
//! - Metric recording is a no-op until an exporter is installed

pub mod logging;
pub mod metrics;
