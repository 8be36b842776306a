//! Configuration: TOML schema, semantic validation, hot reload.
//!
//! A file is parsed into [`WatchConfig`] and checked as a whole; startup
//! refuses to run on any validation error and reports all of them.
//!
//! The member list is registered once. Per-tier probe policies live behind
//! [`SharedPolicies`] and are replaced when the watched file changes and the
//! new contents still validate. A reload that edits `[[members]]` is logged
//! and ignored.

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, LogFormat, MemberConfig, ObservabilityConfig, ProbeKind, ProbePolicy,
    ProbeProtocol, RecoveryConfig, ReplicaSetConfig, RestartKind, RetryConfig, RoutingConfig,
    RoutingKind, TierConfig, TiersConfig, WatchConfig,
};
pub use watcher::{ConfigWatcher, SharedPolicies};
