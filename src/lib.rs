//! tierwatch: health-probe driven failover for a three-tier deployment.

pub mod admin;
pub mod config;
pub mod failover;
pub mod health;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;
pub mod recovery;
pub mod registry;
pub mod resilience;

pub use config::schema::WatchConfig;
pub use failover::FailoverController;
pub use health::HealthMonitor;
pub use lifecycle::Shutdown;
pub use registry::MemberRegistry;
