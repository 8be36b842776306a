//! Configuration file watcher for hot reload of probe policies.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::{MemberConfig, ProbePolicy, TiersConfig, WatchConfig};
use crate::registry::Tier;

/// Probe policies shared by every monitor task.
///
/// Tasks read the current policy on every cycle, so a swap takes effect at
/// each member's next tick.
#[derive(Debug, Clone)]
pub struct SharedPolicies {
    inner: Arc<ArcSwap<TiersConfig>>,
}

impl SharedPolicies {
    pub fn new(tiers: TiersConfig) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(tiers)),
        }
    }

    /// Current resolved policy for `tier`.
    pub fn policy(&self, tier: Tier) -> ProbePolicy {
        self.inner.load().policy(tier)
    }

    /// Current raw tier configuration.
    pub fn tiers(&self) -> Arc<TiersConfig> {
        self.inner.load_full()
    }

    /// Apply a reloaded configuration.
    ///
    /// Returns `false` and keeps the current policies when the reload would
    /// change the member topology, which is fixed for the lifetime of the run.
    pub fn apply_reload(&self, members: &[MemberConfig], reloaded: &WatchConfig) -> bool {
        if reloaded.members != members {
            tracing::warn!("Config reload changes members; topology is fixed until restart, ignoring");
            return false;
        }
        let current = self.inner.load();
        for tier in Tier::ALL {
            if current.policy(tier).default_port != reloaded.tiers.policy(tier).default_port {
                tracing::warn!(tier = %tier, "Config reload changes default_port; topology is fixed until restart, ignoring");
                return false;
            }
        }

        self.inner.store(Arc::new(reloaded.tiers.clone()));
        for tier in Tier::ALL {
            let policy = reloaded.tiers.policy(tier);
            tracing::info!(
                tier = %tier,
                interval_ms = policy.interval.as_millis() as u64,
                timeout_ms = policy.timeout.as_millis() as u64,
                unhealthy_threshold = policy.unhealthy_threshold,
                healthy_threshold = policy.healthy_threshold,
                "Probe policy reloaded"
            );
        }
        true
    }
}

/// A watcher that monitors the configuration file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<WatchConfig>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<WatchConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching the file in a background thread.
    ///
    /// The returned watcher must be kept alive for events to be delivered.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx.clone();
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!("Config file change detected, reloading...");
                        match load_config(&path) {
                            Ok(new_config) => {
                                let _ = tx.send(new_config);
                            }
                            Err(e) => {
                                tracing::error!(error = %e, "Failed to reload config, keeping current configuration");
                            }
                        }
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}
