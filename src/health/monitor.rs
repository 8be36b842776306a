//! Health monitor: one background polling task per member.
//!
//! # Responsibilities
//! - Periodically probe each member with its tier's policy
//! - Run the member's hysteresis state machine
//! - Publish probe summaries and transitions to the controller
//!
//! # Design Decisions
//! - The monitor never writes the registry; it only proposes via events
//! - One tracker per member, locked for a whole probe cycle, so a forced
//!   re-probe and a tick can never interleave
//! - Probes are abandoned at twice the configured timeout

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tokio::sync::{broadcast, mpsc, watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time;

use crate::config::SharedPolicies;
use crate::health::event::{HealthEvent, ProbeSummary, StateTransitionEvent};
use crate::health::probe::{ProbeClient, ProbeErrorKind, ProbeResult};
use crate::health::state::HealthTracker;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::registry::{HealthState, MemberId, MemberRegistry, RegistryError, RegistryResult};

/// Something that can be asked to probe a member right away.
pub trait ProbeScheduler: Send + Sync {
    /// Request an out-of-band probe. Returns `false` for unknown members.
    fn request_probe(&self, member_id: &MemberId) -> bool;
}

/// Per-member task handle.
struct MonitorSlot {
    handle: JoinHandle<()>,
    stop_tx: watch::Sender<bool>,
}

/// Polls every registered member and feeds the failover controller.
pub struct HealthMonitor {
    registry: Arc<MemberRegistry>,
    policies: SharedPolicies,
    client: Arc<dyn ProbeClient>,
    events: mpsc::Sender<HealthEvent>,
    trackers: HashMap<MemberId, Mutex<HealthTracker>>,
    triggers: HashMap<MemberId, Arc<Notify>>,
    slots: Mutex<HashMap<MemberId, MonitorSlot>>,
}

impl HealthMonitor {
    /// Create a monitor for every member currently in `registry`.
    ///
    /// Trackers start from the registry's recorded health.
    pub fn new(
        registry: Arc<MemberRegistry>,
        policies: SharedPolicies,
        client: Arc<dyn ProbeClient>,
        events: mpsc::Sender<HealthEvent>,
    ) -> Self {
        let mut trackers = HashMap::new();
        let mut triggers = HashMap::new();
        for member in registry.all() {
            trackers.insert(member.id.clone(), Mutex::new(HealthTracker::with_state(member.health)));
            triggers.insert(member.id.clone(), Arc::new(Notify::new()));
        }

        Self {
            registry,
            policies,
            client,
            events,
            trackers,
            triggers,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Current state of a member's tracker.
    pub async fn tracked_state(&self, member_id: &MemberId) -> RegistryResult<HealthState> {
        let tracker = self
            .trackers
            .get(member_id)
            .ok_or_else(|| RegistryError::NotFound(member_id.clone()))?;
        Ok(tracker.lock().await.state())
    }

    /// Run one probe cycle for `member_id`.
    ///
    /// Returns the transition event it produced, if any.
    pub async fn poll(&self, member_id: &MemberId) -> RegistryResult<Option<StateTransitionEvent>> {
        let member = self.registry.get_shared(member_id)?;
        let tracker = self
            .trackers
            .get(member_id)
            .ok_or_else(|| RegistryError::NotFound(member_id.clone()))?;
        let policy = self.policies.policy(member.tier);

        let mut tracker = tracker.lock().await;

        let start = Instant::now();
        let deadline = policy.hard_deadline();
        let probe = self
            .client
            .probe(&member.id, &member.endpoint, &policy.kind, policy.timeout);
        let result = match time::timeout(deadline, probe).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    member = %member.id,
                    deadline_ms = deadline.as_millis() as u64,
                    "Probe exceeded hard deadline, cancelled"
                );
                ProbeResult::failure(member.id.clone(), start.elapsed(), ProbeErrorKind::Timeout)
            }
        };

        metrics::record_probe(
            member.tier,
            result.success,
            Duration::from_millis(result.latency_ms),
        );

        let transition = tracker.record(
            result.success,
            policy.unhealthy_threshold,
            policy.healthy_threshold,
        );

        let summary = ProbeSummary {
            member_id: member.id.clone(),
            tier: member.tier,
            timestamp: result.timestamp,
            success: result.success,
            phase: tracker.state(),
            consecutive_failures: tracker.consecutive_failures(),
            consecutive_successes: tracker.consecutive_successes(),
        };
        self.publish(HealthEvent::ProbeObserved(summary)).await;

        let Some(transition) = transition else {
            return Ok(None);
        };

        let event = StateTransitionEvent {
            member_id: member.id.clone(),
            tier: member.tier,
            from: transition.from,
            to: transition.to,
            timestamp: result.timestamp,
            reason: transition.reason,
        };

        match event.to {
            HealthState::Unhealthy => tracing::warn!(
                member = %event.member_id,
                tier = %event.tier,
                from = ?event.from,
                to = ?event.to,
                error_kind = ?result.error_kind,
                reason = %event.reason,
                "Member health transition"
            ),
            _ => tracing::info!(
                member = %event.member_id,
                tier = %event.tier,
                from = ?event.from,
                to = ?event.to,
                reason = %event.reason,
                "Member health transition"
            ),
        }
        metrics::record_transition(event.tier, event.to);

        self.publish(HealthEvent::Transition(event.clone())).await;
        Ok(Some(event))
    }

    async fn publish(&self, event: HealthEvent) {
        if self.events.send(event).await.is_err() {
            tracing::debug!("Controller channel closed, dropping health event");
        }
    }

    /// Spawn a polling task for every member.
    pub async fn start(self: &Arc<Self>, shutdown: &Shutdown) {
        let mut slots = self.slots.lock().await;
        for member in self.registry.all() {
            if slots.contains_key(&member.id) {
                continue;
            }
            let Some(trigger) = self.triggers.get(&member.id).cloned() else {
                continue;
            };

            let (stop_tx, stop_rx) = watch::channel(false);
            let monitor = Arc::clone(self);
            let id = member.id.clone();
            let shutdown_rx = shutdown.subscribe();
            let handle = tokio::spawn(async move {
                monitor.run_member(id, trigger, stop_rx, shutdown_rx).await;
            });
            slots.insert(member.id.clone(), MonitorSlot { handle, stop_tx });
        }

        tracing::info!(members = slots.len(), "Health monitor started");
    }

    async fn run_member(
        &self,
        member_id: MemberId,
        trigger: Arc<Notify>,
        mut stop: watch::Receiver<bool>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let Ok(member) = self.registry.get_shared(&member_id) else {
            return;
        };

        // Spread the first probes over one interval.
        let interval = self.policies.policy(member.tier).interval;
        let stagger = Duration::from_millis(fastrand::u64(0..=interval.as_millis() as u64));
        tracing::debug!(member = %member_id, stagger_ms = stagger.as_millis() as u64, "Health loop starting");

        tokio::select! {
            _ = time::sleep(stagger) => {}
            _ = trigger.notified() => {}
            _ = stop.changed() => return,
            _ = shutdown.recv() => return,
        }

        loop {
            if let Err(e) = self.poll(&member_id).await {
                tracing::error!(member = %member_id, error = %e, "Health poll failed");
            }

            let interval = self.policies.policy(member.tier).interval;
            tokio::select! {
                _ = time::sleep(interval) => {}
                _ = trigger.notified() => {
                    tracing::debug!(member = %member_id, "Forced re-probe");
                }
                _ = stop.changed() => break,
                _ = shutdown.recv() => break,
            }
        }

        tracing::debug!(member = %member_id, "Health loop exiting");
    }

    /// Stop every polling task and wait for them to exit.
    pub async fn stop_all(&self) {
        let mut slots = self.slots.lock().await;
        let handles: Vec<_> = slots
            .drain()
            .map(|(_, slot)| {
                let _ = slot.stop_tx.send(true);
                slot.handle
            })
            .collect();
        drop(slots);

        for result in join_all(handles).await {
            if let Err(e) = result {
                tracing::warn!(error = %e, "Health loop ended abnormally");
            }
        }
        tracing::info!("All health loops stopped");
    }

    /// Member ids with a running polling task.
    pub async fn active_monitors(&self) -> Vec<MemberId> {
        let slots = self.slots.lock().await;
        let mut ids: Vec<_> = slots.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn is_monitoring(&self, member_id: &MemberId) -> bool {
        self.slots.lock().await.contains_key(member_id)
    }
}

impl ProbeScheduler for HealthMonitor {
    fn request_probe(&self, member_id: &MemberId) -> bool {
        match self.triggers.get(member_id) {
            Some(trigger) => {
                trigger.notify_one();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProbeKind, TiersConfig};
    use crate::registry::{Endpoint, Member, Tier};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns queued outcomes, then successes.
    struct Scripted {
        outcomes: std::sync::Mutex<VecDeque<bool>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(outcomes: &[bool]) -> Self {
            Self {
                outcomes: std::sync::Mutex::new(outcomes.iter().copied().collect()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ProbeClient for Scripted {
        async fn probe(
            &self,
            member_id: &MemberId,
            _endpoint: &Endpoint,
            _kind: &ProbeKind,
            _timeout: Duration,
        ) -> ProbeResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let ok = self.outcomes.lock().unwrap().pop_front().unwrap_or(true);
            if ok {
                ProbeResult::success(member_id.clone(), Duration::from_millis(1))
            } else {
                ProbeResult::failure(member_id.clone(), Duration::from_millis(1), ProbeErrorKind::ConnectionRefused)
            }
        }
    }

    /// Never answers.
    struct Hanging;

    #[async_trait]
    impl ProbeClient for Hanging {
        async fn probe(
            &self,
            _member_id: &MemberId,
            _endpoint: &Endpoint,
            _kind: &ProbeKind,
            _timeout: Duration,
        ) -> ProbeResult {
            std::future::pending().await
        }
    }

    fn registry(state: HealthState) -> Arc<MemberRegistry> {
        let mut web = Member::new("web-1".into(), Tier::Web, Endpoint::resolve("127.0.0.1", 80), "1");
        web.health = state;
        Arc::new(MemberRegistry::new(vec![web]).unwrap())
    }

    fn fast_policies() -> SharedPolicies {
        let mut tiers = TiersConfig::default();
        tiers.web.interval_ms = Some(10);
        tiers.web.timeout_ms = Some(20);
        SharedPolicies::new(tiers)
    }

    #[tokio::test]
    async fn emits_only_on_threshold_crossing() {
        let (tx, mut rx) = mpsc::channel(64);
        let monitor = HealthMonitor::new(
            registry(HealthState::Healthy),
            fast_policies(),
            Arc::new(Scripted::new(&[false, false, false])),
            tx,
        );
        let id = MemberId::from("web-1");

        assert!(monitor.poll(&id).await.unwrap().is_none());
        assert_eq!(monitor.tracked_state(&id).await.unwrap(), HealthState::Suspect);
        let crossed = monitor.poll(&id).await.unwrap().unwrap();
        assert_eq!((crossed.from, crossed.to), (HealthState::Healthy, HealthState::Unhealthy));
        assert!(monitor.poll(&id).await.unwrap().is_none());

        let mut transitions = 0;
        let mut phases = Vec::new();
        while let Ok(event) = rx.try_recv() {
            match event {
                HealthEvent::Transition(_) => transitions += 1,
                HealthEvent::ProbeObserved(summary) => phases.push(summary.phase),
                HealthEvent::RolesObserved { .. } => unreachable!(),
            }
        }
        assert_eq!(transitions, 1);
        assert_eq!(
            phases,
            vec![HealthState::Suspect, HealthState::Unhealthy, HealthState::Unhealthy]
        );
    }

    #[tokio::test]
    async fn hung_probe_is_cancelled_as_timeout() {
        let (tx, mut rx) = mpsc::channel(8);
        let monitor = HealthMonitor::new(registry(HealthState::Healthy), fast_policies(), Arc::new(Hanging), tx);

        assert!(monitor.poll(&"web-1".into()).await.unwrap().is_none());
        match rx.recv().await {
            Some(HealthEvent::ProbeObserved(summary)) => {
                assert!(!summary.success);
                assert_eq!(summary.phase, HealthState::Suspect);
                assert_eq!(summary.consecutive_failures, 1);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn unknown_member_is_an_error() {
        let (tx, _rx) = mpsc::channel(8);
        let monitor = HealthMonitor::new(registry(HealthState::Healthy), fast_policies(), Arc::new(Hanging), tx);
        let err = monitor.poll(&"ghost".into()).await.unwrap_err();
        assert_eq!(err, RegistryError::NotFound("ghost".into()));
        assert!(!monitor.request_probe(&"ghost".into()));
    }

    #[tokio::test]
    async fn tasks_start_and_stop() {
        let (tx, mut rx) = mpsc::channel(1024);
        let client = Arc::new(Scripted::new(&[]));
        let monitor = Arc::new(HealthMonitor::new(
            registry(HealthState::Unknown),
            fast_policies(),
            client.clone(),
            tx,
        ));
        let shutdown = Shutdown::new();

        monitor.start(&shutdown).await;
        assert!(monitor.is_monitoring(&"web-1".into()).await);

        // Unknown → Healthy after two successes.
        let event = loop {
            match time::timeout(Duration::from_secs(2), rx.recv()).await {
                Ok(Some(HealthEvent::Transition(event))) => break event,
                Ok(Some(_)) => continue,
                other => panic!("no transition: {:?}", other),
            }
        };
        assert_eq!(event.to, HealthState::Healthy);

        monitor.stop_all().await;
        assert!(monitor.active_monitors().await.is_empty());
        assert!(client.calls.load(Ordering::SeqCst) >= 2);
    }
}
