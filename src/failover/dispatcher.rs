//! Fans controller input out to one FIFO worker per tier.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::failover::controller::FailoverController;
use crate::health::HealthEvent;
use crate::lifecycle::Shutdown;
use crate::registry::Tier;

enum WorkItem {
    Event(HealthEvent),
    Reconcile,
}

/// Spawn the dispatcher, the per-tier workers and the reconcile timer.
///
/// The dispatcher stops on shutdown or when every event sender is gone;
/// workers finish the item in hand and exit.
pub fn spawn(
    controller: Arc<FailoverController>,
    events: mpsc::Receiver<HealthEvent>,
    reconcile_every: Duration,
    shutdown: &Shutdown,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();
    let mut queues = HashMap::new();

    for tier in Tier::ALL {
        let (tx, rx) = mpsc::unbounded_channel();
        queues.insert(tier, tx);
        handles.push(tokio::spawn(run_worker(
            Arc::clone(&controller),
            tier,
            rx,
            shutdown.subscribe(),
        )));
    }

    let reconcile_queues: Vec<_> = Tier::ALL
        .into_iter()
        .filter(|t| t.is_load_balanced())
        .filter_map(|t| queues.get(&t).cloned())
        .collect();
    handles.push(tokio::spawn(run_reconcile(
        reconcile_queues,
        reconcile_every,
        shutdown.subscribe(),
    )));

    handles.push(tokio::spawn(run_dispatcher(events, queues, shutdown.subscribe())));
    handles
}

async fn run_dispatcher(
    mut events: mpsc::Receiver<HealthEvent>,
    queues: HashMap<Tier, mpsc::UnboundedSender<WorkItem>>,
    mut shutdown: broadcast::Receiver<()>,
) {
    tracing::info!("Failover dispatcher starting");
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    tracing::info!("Event channel closed, dispatcher exiting");
                    break;
                };
                let tier = event.tier();
                if let Some(queue) = queues.get(&tier) {
                    if queue.send(WorkItem::Event(event)).is_err() {
                        tracing::warn!(tier = %tier, "Tier worker gone, dropping event");
                    }
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Failover dispatcher received shutdown signal, exiting loop");
                break;
            }
        }
    }
}

async fn run_worker(
    controller: Arc<FailoverController>,
    tier: Tier,
    mut queue: mpsc::UnboundedReceiver<WorkItem>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        let item = tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            item = queue.recv() => match item {
                Some(item) => item,
                None => break,
            },
        };

        match item {
            WorkItem::Event(event) => controller.handle(event).await,
            WorkItem::Reconcile => {
                let fixed = controller.reconcile(tier).await;
                if fixed > 0 {
                    tracing::info!(tier = %tier, fixed, "Reconcile brought members back in line");
                }
            }
        }
    }
    tracing::debug!(tier = %tier, "Tier worker exiting");
}

async fn run_reconcile(
    queues: Vec<mpsc::UnboundedSender<WorkItem>>,
    every: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let every = every.max(Duration::from_secs(1));
    let mut ticker = time::interval_at(Instant::now() + every, every);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for queue in &queues {
                    let _ = queue.send(WorkItem::Reconcile);
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::StateTransitionEvent;
    use crate::load_balancer::BackendPool;
    use crate::recovery::{DisabledRestarter, RecoveryOrchestrator};
    use crate::registry::{Endpoint, HealthState, Member, MemberRegistry};
    use crate::resilience::RetryPolicy;

    #[tokio::test]
    async fn events_reach_their_tier_worker() {
        let registry = Arc::new(
            MemberRegistry::new(vec![
                Member::new("web-1".into(), Tier::Web, Endpoint::resolve("web-1", 80), ""),
                Member::new("web-2".into(), Tier::Web, Endpoint::resolve("web-2", 80), ""),
            ])
            .unwrap(),
        );
        let pool = Arc::new(BackendPool::from_registry(&registry));
        let recovery = Arc::new(RecoveryOrchestrator::new(registry.clone(), Arc::new(DisabledRestarter), 10));
        let controller = Arc::new(FailoverController::new(
            registry.clone(),
            pool.clone(),
            recovery,
            RetryPolicy::default(),
            16,
        ));
        let shutdown = Shutdown::new();
        let (tx, rx) = mpsc::channel(16);
        let handles = spawn(controller, rx, Duration::from_secs(60), &shutdown);

        tx.send(HealthEvent::Transition(StateTransitionEvent {
            member_id: "web-1".into(),
            tier: Tier::Web,
            from: HealthState::Unknown,
            to: HealthState::Unhealthy,
            timestamp: 1,
            reason: "2 consecutive failures".into(),
        }))
        .await
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while pool.is_active(&"web-1".into()) && Instant::now() < deadline {
            time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!pool.is_active(&"web-1".into()));
        assert_eq!(registry.get(&"web-1".into()).unwrap().health, HealthState::Unhealthy);

        shutdown.trigger();
        for handle in handles {
            handle.await.unwrap();
        }
    }
}
