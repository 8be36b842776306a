//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use tierwatch::config::{ProbeKind, SharedPolicies, TiersConfig};
use tierwatch::failover::FailoverController;
use tierwatch::health::{HealthEvent, HealthMonitor, ProbeClient, ProbeErrorKind, ProbeResult};
use tierwatch::load_balancer::{Ack, BackendPool, RoutingError, TrafficRouter};
use tierwatch::recovery::{InstanceRestarter, RecoveryError, RecoveryOrchestrator};
use tierwatch::registry::{Endpoint, HealthState, Member, MemberId, MemberRegistry, Role, Tier};
use tierwatch::resilience::RetryPolicy;

/// Start a mock HTTP backend on an ephemeral port answering every request
/// with whatever `f` returns.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        // Read the request head before answering.
                        let mut buf = [0u8; 1024];
                        let _ = socket.read(&mut buf).await;

                        let (status, body) = f().await;
                        let status_text = match status {
                            200 => "200 OK",
                            204 => "204 No Content",
                            301 => "301 Moved Permanently",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };
                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// A mock backend with a fixed status.
pub async fn start_mock_backend(status: u16) -> SocketAddr {
    start_programmable_backend(move || async move { (status, "ok".to_string()) }).await
}

/// A backend that accepts connections and never answers.
pub async fn start_silent_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    addr
}

/// An address nothing is listening on.
pub fn closed_port() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Probe client whose outcomes are scripted per member.
///
/// Queued outcomes are used first; after that the member's steady outcome
/// applies (success unless set otherwise).
#[derive(Default)]
pub struct ScriptedProbe {
    queued: Mutex<HashMap<MemberId, VecDeque<bool>>>,
    steady: Mutex<HashMap<MemberId, bool>>,
    calls: AtomicU32,
}

impl ScriptedProbe {
    pub fn queue(&self, member: &str, outcomes: &[bool]) {
        self.queued
            .lock()
            .unwrap()
            .entry(member.into())
            .or_default()
            .extend(outcomes.iter().copied());
    }

    pub fn set_up(&self, member: &str, up: bool) {
        self.steady.lock().unwrap().insert(member.into(), up);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProbeClient for ScriptedProbe {
    async fn probe(
        &self,
        member_id: &MemberId,
        _endpoint: &Endpoint,
        _kind: &ProbeKind,
        _timeout: Duration,
    ) -> ProbeResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let queued = self
            .queued
            .lock()
            .unwrap()
            .get_mut(member_id)
            .and_then(|q| q.pop_front());
        let up = queued.unwrap_or_else(|| *self.steady.lock().unwrap().get(member_id).unwrap_or(&true));

        if up {
            ProbeResult::success(member_id.clone(), Duration::from_millis(1))
        } else {
            ProbeResult::failure(member_id.clone(), Duration::from_millis(1), ProbeErrorKind::ConnectionRefused)
        }
    }
}

/// Router that records every call and forwards to an in-memory pool.
///
/// `fail_next(n)` makes the next `n` calls fail; `fail_forever()` makes all
/// of them fail.
#[derive(Default)]
pub struct RecordingRouter {
    pub pool: BackendPool,
    calls: Mutex<Vec<(MemberId, bool)>>,
    failures_left: AtomicU32,
}

impl RecordingRouter {
    pub fn new(registry: &MemberRegistry) -> Self {
        Self {
            pool: BackendPool::from_registry(registry),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<(MemberId, bool)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, member: &str, active: bool) -> usize {
        let id = MemberId::from(member);
        self.calls().iter().filter(|(m, a)| *m == id && *a == active).count()
    }

    pub fn fail_next(&self, n: u32) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    pub fn fail_forever(&self) {
        self.fail_next(u32::MAX);
    }

    pub fn recover(&self) {
        self.fail_next(0);
    }
}

#[async_trait]
impl TrafficRouter for RecordingRouter {
    async fn set_member_active(&self, member: &Member, active: bool) -> Result<Ack, RoutingError> {
        self.calls.lock().unwrap().push((member.id.clone(), active));
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                0 => None,
                u32::MAX => Some(u32::MAX),
                n => Some(n - 1),
            })
            .is_ok();
        if failing {
            return Err(RoutingError::Rejected { status: 503 });
        }
        self.pool.set_member_active(member, active).await
    }
}

/// Restarter that records the members it was asked to restart.
#[derive(Default)]
pub struct RecordingRestarter {
    pub restarted: Mutex<Vec<MemberId>>,
}

#[async_trait]
impl InstanceRestarter for RecordingRestarter {
    async fn restart(&self, member: &Member) -> Result<(), RecoveryError> {
        self.restarted.lock().unwrap().push(member.id.clone());
        Ok(())
    }
}

pub fn member(id: &str, tier: Tier, health: HealthState) -> Member {
    let port = match tier {
        Tier::Web => 80,
        Tier::App => 3000,
        Tier::Db => 27017,
    };
    let mut m = Member::new(id.into(), tier, Endpoint::resolve("127.0.0.1", port), "1");
    m.health = health;
    m.phase = health;
    m
}

pub fn db_member(id: &str, role: Role) -> Member {
    let mut m = member(id, Tier::Db, HealthState::Healthy);
    m.role = Some(role);
    m
}

/// Retries that finish in milliseconds.
pub fn quick_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 5,
        base_delay_ms: 1,
        max_delay_ms: 4,
    }
}

/// Every component wired together, driven one probe at a time.
pub struct Harness {
    pub registry: Arc<MemberRegistry>,
    pub probes: Arc<ScriptedProbe>,
    pub router: Arc<RecordingRouter>,
    pub restarter: Arc<RecordingRestarter>,
    pub recovery: Arc<RecoveryOrchestrator>,
    pub controller: Arc<FailoverController>,
    pub monitor: Arc<HealthMonitor>,
    events: mpsc::Receiver<HealthEvent>,
    /// Every event the controller has handled, in order.
    pub seen: Vec<HealthEvent>,
}

impl Harness {
    pub fn new(members: Vec<Member>) -> Self {
        let registry = Arc::new(MemberRegistry::new(members).unwrap());
        let probes = Arc::new(ScriptedProbe::default());
        let router = Arc::new(RecordingRouter::new(&registry));
        let restarter = Arc::new(RecordingRestarter::default());
        let recovery = Arc::new(RecoveryOrchestrator::new(registry.clone(), restarter.clone(), 100));
        let controller = Arc::new(FailoverController::new(
            registry.clone(),
            router.clone(),
            recovery.clone(),
            quick_retry(),
            256,
        ));

        let (tx, events) = mpsc::channel(1024);
        let monitor = Arc::new(HealthMonitor::new(
            registry.clone(),
            SharedPolicies::new(TiersConfig::default()),
            probes.clone(),
            tx,
        ));
        recovery.attach_scheduler(monitor.clone());

        Self {
            registry,
            probes,
            router,
            restarter,
            recovery,
            controller,
            monitor,
            events,
            seen: Vec::new(),
        }
    }

    /// Probe `member` once and let the controller handle the result.
    pub async fn probe(&mut self, member: &str) {
        self.monitor.poll(&member.into()).await.unwrap();
        self.drain().await;
    }

    /// Probe `member` once per outcome, scripting the outcomes first.
    pub async fn probe_with(&mut self, member: &str, outcomes: &[bool]) {
        self.probes.queue(member, outcomes);
        for _ in outcomes {
            self.probe(member).await;
        }
    }

    pub async fn drain(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.seen.push(event.clone());
            self.controller.handle(event).await;
        }
    }

    /// Transitions seen so far as `(member, from, to)`.
    pub fn transitions(&self) -> Vec<(String, HealthState, HealthState)> {
        self.seen
            .iter()
            .filter_map(|e| match e {
                HealthEvent::Transition(t) => Some((t.member_id.to_string(), t.from, t.to)),
                _ => None,
            })
            .collect()
    }

    pub fn health(&self, member: &str) -> HealthState {
        self.registry.get(&member.into()).unwrap().health
    }

    pub fn phase(&self, member: &str) -> HealthState {
        self.registry.get(&member.into()).unwrap().phase
    }

    pub fn role(&self, member: &str) -> Option<Role> {
        self.registry.get(&member.into()).unwrap().role
    }
}
