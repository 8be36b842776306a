//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! startup.rs:
//!     WatchConfig → registry → router → orchestrator → controller
//!     → monitor → replica poller → admin API
//!
//! signals.rs:
//!     SIGINT / SIGTERM → Shutdown::trigger
//!
//! shutdown.rs:
//!     broadcast → every loop exits → monitors joined → process exits
//! ```
//!
//! # Design Decisions
//! - Nothing is persisted; health is rebuilt by probing after a restart
//! - A startup error aborts the process before any task is spawned

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::{shutdown_signal, spawn_signal_handler};
pub use startup::{build, StartupError, Tierwatch};
