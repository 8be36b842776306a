//! Startup orchestration.
//!
//! # Responsibilities
//! - Build every subsystem from a validated configuration
//! - Start background tasks in dependency order
//! - Tear them down again on shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Order: registry → router → orchestrator → controller → monitor →
//!   replica poller → admin server
//! - The admin API starts last, once there is state to report

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::admin::{self, AdminState};
use crate::config::{ConfigWatcher, RoutingKind, SharedPolicies, WatchConfig};
use crate::failover::{dispatcher, FailoverController};
use crate::health::replica::ReplicaStatusError;
use crate::health::{HealthEvent, HealthMonitor, HttpReplicaStatus, ProbeClient, ReplicaStatusPoller};
use crate::lifecycle::Shutdown;
use crate::load_balancer::{BackendPool, HttpPoolRouter, RoutingError, TrafficRouter};
use crate::recovery::{restarter_from_config, RecoveryError, RecoveryOrchestrator};
use crate::registry::{MemberRegistry, RegistryError};
use crate::resilience::RetryPolicy;

/// Capacity of the monitor → controller channel.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Recovery(#[from] RecoveryError),

    #[error(transparent)]
    ReplicaStatus(#[from] ReplicaStatusError),

    #[error("invalid {field} '{value}'")]
    Address { field: &'static str, value: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Every subsystem, built but not yet running.
pub struct Tierwatch {
    pub config: WatchConfig,
    pub registry: Arc<MemberRegistry>,
    pub policies: SharedPolicies,
    /// The in-memory pool when `routing.kind = "memory"`.
    pub pool: Option<Arc<BackendPool>>,
    pub recovery: Arc<RecoveryOrchestrator>,
    pub controller: Arc<FailoverController>,
    pub monitor: Arc<HealthMonitor>,
    replica_source: Option<Arc<HttpReplicaStatus>>,
    admin_addr: Option<SocketAddr>,
    events_tx: mpsc::Sender<HealthEvent>,
    events_rx: mpsc::Receiver<HealthEvent>,
}

/// Build all subsystems from `config`.
pub fn build(config: WatchConfig, probe_client: Arc<dyn ProbeClient>) -> Result<Tierwatch, StartupError> {
    let registry = Arc::new(MemberRegistry::from_config(&config.members, &config.tiers)?);
    let policies = SharedPolicies::new(config.tiers.clone());

    let (pool, router): (Option<Arc<BackendPool>>, Arc<dyn TrafficRouter>) = match config.routing.kind {
        RoutingKind::Memory => {
            let pool = Arc::new(BackendPool::from_registry(&registry));
            (Some(pool.clone()), pool)
        }
        RoutingKind::Http => {
            let base_url = config
                .routing
                .base_url
                .as_deref()
                .ok_or_else(|| RoutingError::Config("routing.base_url is not set".to_string()))?;
            let timeout = Duration::from_millis(config.routing.timeout_ms);
            (None, Arc::new(HttpPoolRouter::new(base_url, timeout)?))
        }
    };
    tracing::info!(kind = ?config.routing.kind, "Traffic router ready");

    let restarter = restarter_from_config(&config.recovery)?;
    let recovery = Arc::new(RecoveryOrchestrator::new(
        registry.clone(),
        restarter,
        config.recovery.incident_history,
    ));

    let controller = Arc::new(FailoverController::new(
        registry.clone(),
        router,
        recovery.clone(),
        RetryPolicy::from(&config.retries),
        config.observability.audit_capacity,
    ));

    let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let monitor = Arc::new(HealthMonitor::new(
        registry.clone(),
        policies.clone(),
        probe_client,
        events_tx.clone(),
    ));
    recovery.attach_scheduler(monitor.clone());

    let replica_source = match config.replica_set.status_url.as_deref() {
        Some(url) => Some(Arc::new(HttpReplicaStatus::new(
            url,
            Duration::from_millis(config.replica_set.timeout_ms),
        )?)),
        None => None,
    };

    let admin_addr = if config.admin.enabled {
        let addr: SocketAddr = config.admin.bind_address.parse().map_err(|_| StartupError::Address {
            field: "admin.bind_address",
            value: config.admin.bind_address.clone(),
        })?;
        Some(addr)
    } else {
        None
    };

    Ok(Tierwatch {
        config,
        registry,
        policies,
        pool,
        recovery,
        controller,
        monitor,
        replica_source,
        admin_addr,
        events_tx,
        events_rx,
    })
}

impl Tierwatch {
    /// Sender for injecting events, e.g. from an external status source.
    pub fn events(&self) -> mpsc::Sender<HealthEvent> {
        self.events_tx.clone()
    }

    /// Run until `shutdown` fires.
    ///
    /// With `config_path` set, probe policies are reloaded when the file
    /// changes.
    pub async fn run(self, shutdown: &Shutdown, config_path: Option<&Path>) -> Result<(), StartupError> {
        let mut stop = shutdown.subscribe();
        let Tierwatch {
            config,
            registry,
            policies,
            controller,
            monitor,
            replica_source,
            admin_addr,
            events_tx,
            events_rx,
            ..
        } = self;

        let mut handles: Vec<JoinHandle<()>> = dispatcher::spawn(
            controller.clone(),
            events_rx,
            Duration::from_secs(config.retries.reconcile_interval_secs),
            shutdown,
        );

        monitor.start(shutdown).await;

        if let Some(source) = replica_source {
            let poller = ReplicaStatusPoller::new(registry.clone(), source, events_tx.clone(), &config.replica_set);
            handles.push(tokio::spawn(poller.run(shutdown.subscribe())));
        }
        drop(events_tx);

        let _watcher = match config_path {
            Some(path) => {
                let (watcher, mut updates) = ConfigWatcher::new(path);
                let members = config.members.clone();
                let reload_policies = policies.clone();
                let mut reload_stop = shutdown.subscribe();
                handles.push(tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            update = updates.recv() => match update {
                                Some(reloaded) => {
                                    reload_policies.apply_reload(&members, &reloaded);
                                }
                                None => break,
                            },
                            _ = reload_stop.recv() => break,
                        }
                    }
                }));
                match watcher.run() {
                    Ok(watcher) => Some(watcher),
                    Err(e) => {
                        tracing::warn!(error = %e, "Config watcher unavailable, hot reload disabled");
                        None
                    }
                }
            }
            None => None,
        };

        if let Some(addr) = admin_addr {
            let state = AdminState::new(controller.clone(), &config.admin.api_key);
            let rx = shutdown.subscribe();
            handles.push(tokio::spawn(async move {
                if let Err(e) = admin::serve(state, addr, rx).await {
                    tracing::error!(error = %e, "Admin API failed");
                }
            }));
        }

        tracing::info!(members = registry.len(), tiers = ?registry.tiers(), "tierwatch running");

        let _ = stop.recv().await;

        monitor.stop_all().await;
        for result in join_all(handles).await {
            if let Err(e) = result {
                tracing::warn!(error = %e, "Task ended abnormally");
            }
        }
        tracing::info!("Shutdown complete");
        Ok(())
    }
}
