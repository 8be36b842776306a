//! Failover controller: the single writer of the member registry.
//!
//! # Responsibilities
//! - Apply probe summaries, transitions and replica roles to the registry
//! - Take unhealthy web/app members out of rotation and put recovered ones back
//! - Track db quorum and open an incident when it is lost
//!
//! # Design Decisions
//! - Events for one tier are handled in order by one worker (see dispatcher.rs)
//! - A member that becomes Unhealthy is removed even if it was the last one;
//!   an empty pool raises an alert instead of failing open
//! - Routing calls that exhaust their retries leave the member
//!   routing-pending; reconcile re-drives it later

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use crate::failover::alerts::{Alert, AlertKind, AlertLog};
use crate::failover::audit::BoundedLog;
use crate::failover::quorum::{QuorumChange, QuorumState, QuorumTracker};
use crate::health::{HealthEvent, ProbeSummary, RoleObservation, StateTransitionEvent};
use crate::load_balancer::TrafficRouter;
use crate::observability::metrics;
use crate::recovery::RecoveryOrchestrator;
use crate::registry::{HealthState, Member, MemberId, MemberRegistry, Role, Tier};
use crate::resilience::{retry_with_backoff, RetryPolicy};

/// Point-in-time view of one tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierStatus {
    pub tier: Tier,
    pub quorum_required: bool,
    pub voting_members: usize,
    pub healthy_votes: usize,
    pub degraded_no_quorum: bool,
    /// Members in rotation (web/app) or holding a vote (db).
    pub active_members: Vec<MemberId>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}

pub struct FailoverController {
    registry: Arc<MemberRegistry>,
    router: Arc<dyn TrafficRouter>,
    recovery: Arc<RecoveryOrchestrator>,
    retry: RetryPolicy,
    /// What the controller believes each backend pool contains.
    rotation: Mutex<HashMap<Tier, BTreeSet<MemberId>>>,
    pending: Mutex<BTreeSet<MemberId>>,
    quorum: Mutex<QuorumTracker>,
    events: BoundedLog<StateTransitionEvent>,
    alerts: AlertLog,
}

impl FailoverController {
    /// Every routable load-balanced member starts out in rotation, and quorum
    /// starts from the registry's recorded health.
    pub fn new(
        registry: Arc<MemberRegistry>,
        router: Arc<dyn TrafficRouter>,
        recovery: Arc<RecoveryOrchestrator>,
        retry: RetryPolicy,
        audit_capacity: usize,
    ) -> Self {
        let mut rotation: HashMap<Tier, BTreeSet<MemberId>> = HashMap::new();
        for member in registry.all() {
            if member.tier.is_load_balanced() && member.health.is_routable() {
                rotation.entry(member.tier).or_default().insert(member.id);
            }
        }

        let mut quorum = QuorumTracker::default();
        quorum.observe(QuorumState::compute(&registry.snapshot(Tier::Db)));

        Self {
            registry,
            router,
            recovery,
            retry,
            rotation: Mutex::new(rotation),
            pending: Mutex::new(BTreeSet::new()),
            quorum: Mutex::new(quorum),
            events: BoundedLog::new(audit_capacity),
            alerts: AlertLog::default(),
        }
    }

    pub fn registry(&self) -> &Arc<MemberRegistry> {
        &self.registry
    }

    /// Handle one event from the monitoring side.
    pub async fn handle(&self, event: HealthEvent) {
        match event {
            HealthEvent::ProbeObserved(summary) => self.on_probe(&summary),
            HealthEvent::Transition(event) => self.on_transition(event).await,
            HealthEvent::RolesObserved { roles, .. } => self.on_roles(&roles),
        }
    }

    fn on_probe(&self, summary: &ProbeSummary) {
        if let Err(e) = self.registry.record_probe(summary) {
            tracing::error!(member = %summary.member_id, error = %e, "Failed to record probe summary");
        }
    }

    async fn on_transition(&self, event: StateTransitionEvent) {
        let member = match self.registry.apply_transition(&event) {
            Ok(member) => member,
            Err(e) => {
                tracing::error!(member = %event.member_id, error = %e, "Failed to apply transition");
                return;
            }
        };
        metrics::record_member_health(&member.id, member.tier, member.health);

        if member.tier.quorum_required() {
            self.on_db_transition(&member, &event);
        } else {
            self.on_pool_transition(&member, &event).await;
        }
        self.events.push(event);
    }

    async fn on_pool_transition(&self, member: &Member, event: &StateTransitionEvent) {
        match (event.from, event.to) {
            (_, HealthState::Unhealthy) => {
                self.drive_rotation(member, false, true).await;
            }
            (HealthState::Recovering | HealthState::Unknown | HealthState::Unhealthy, HealthState::Healthy) => {
                self.drive_rotation(member, true, true).await;
            }
            _ => {}
        }
    }

    /// Bring the pool in line for `member`. Returns whether the router acked.
    async fn drive_rotation(&self, member: &Member, active: bool, alert_on_exhaustion: bool) -> bool {
        let result = retry_with_backoff(&self.retry, "set_member_active", |_| async move {
            let result = self.router.set_member_active(member, active).await;
            metrics::record_routing_attempt(result.is_ok());
            result
        })
        .await;

        match result {
            Ok(ack) => {
                lock(&self.pending).remove(&member.id);
                let remaining = {
                    let mut rotation = lock(&self.rotation);
                    let pool = rotation.entry(member.tier).or_default();
                    if active {
                        pool.insert(member.id.clone());
                    } else {
                        pool.remove(&member.id);
                    }
                    pool.len()
                };
                tracing::info!(
                    member = %member.id,
                    tier = %member.tier,
                    active,
                    changed = ack.changed,
                    remaining,
                    "Backend pool updated"
                );
                if !active && remaining == 0 {
                    self.alerts.raise(
                        AlertKind::PoolExhausted,
                        member.tier,
                        Some(member.id.clone()),
                        format!("no {} members left in rotation", member.tier),
                    );
                }
                true
            }
            Err(exhausted) => {
                let newly_pending = lock(&self.pending).insert(member.id.clone());
                if alert_on_exhaustion || newly_pending {
                    self.alerts.raise(
                        AlertKind::RoutingRetryExhausted,
                        member.tier,
                        Some(member.id.clone()),
                        format!(
                            "could not set {} active={} after {} attempts: {}",
                            member.id, active, exhausted.attempts, exhausted.last_error
                        ),
                    );
                } else {
                    tracing::warn!(
                        member = %member.id,
                        attempts = exhausted.attempts,
                        error = %exhausted.last_error,
                        "Reconcile could not update backend pool, still pending"
                    );
                }
                false
            }
        }
    }

    /// Re-drive members of `tier` whose pool membership may not match health.
    ///
    /// Returns the number of members that were brought back in line.
    pub async fn reconcile(&self, tier: Tier) -> usize {
        if !tier.is_load_balanced() {
            return 0;
        }

        let mut fixed = 0;
        for member in self.registry.snapshot(tier) {
            let desired = member.health.is_routable();
            let pending = lock(&self.pending).contains(&member.id);
            let in_rotation = lock(&self.rotation)
                .get(&tier)
                .is_some_and(|pool| pool.contains(&member.id));

            if !pending && in_rotation == desired {
                continue;
            }
            tracing::info!(member = %member.id, tier = %tier, desired, "Reconciling backend pool");
            if self.drive_rotation(&member, desired, false).await {
                fixed += 1;
            }
        }
        fixed
    }

    fn on_db_transition(&self, member: &Member, event: &StateTransitionEvent) {
        if event.to == HealthState::Unhealthy && member.role != Some(Role::Unknown) {
            tracing::info!(member = %member.id, role = ?member.role, "Unreachable db member, role now unknown");
            self.set_role(&member.id, Role::Unknown);
        }
        self.recompute_quorum();
    }

    fn recompute_quorum(&self) {
        let members = self.registry.snapshot(Tier::Db);
        let state = QuorumState::compute(&members);
        let change = lock(&self.quorum).observe(state);
        metrics::set_quorum_held(state.held());

        match change {
            QuorumChange::Lost => {
                for member in members.iter().filter(|m| m.is_primary()) {
                    self.set_role(&member.id, Role::Unknown);
                }
                let reason = format!(
                    "db replica set lost quorum: {} of {} voting members healthy, majority needs {}; \
                     no primary can be elected, manual recovery required",
                    state.healthy_votes,
                    state.voting_members,
                    state.voting_members / 2 + 1
                );
                tracing::error!(
                    healthy_votes = state.healthy_votes,
                    voting_members = state.voting_members,
                    "Db tier degraded: no quorum"
                );
                self.recovery.request_manual_intervention(Tier::Db, reason);
            }
            QuorumChange::Restored => tracing::info!(
                healthy_votes = state.healthy_votes,
                voting_members = state.voting_members,
                "Db quorum restored, observing replica set"
            ),
            QuorumChange::Established => tracing::info!(
                healthy_votes = state.healthy_votes,
                voting_members = state.voting_members,
                "Db quorum established"
            ),
            QuorumChange::Unchanged => tracing::debug!(
                held = state.held(),
                healthy_votes = state.healthy_votes,
                voting_members = state.voting_members,
                "Db quorum unchanged"
            ),
        }
    }

    fn on_roles(&self, roles: &[RoleObservation]) {
        let primaries = roles.iter().filter(|r| r.role == Role::Primary).count();
        let degraded = lock(&self.quorum).degraded();

        for observation in roles {
            let mut role = observation.role;
            if role == Role::Primary && (primaries > 1 || degraded) {
                tracing::warn!(
                    member = %observation.member_id,
                    primaries,
                    degraded,
                    "Primary claim not accepted, recording role as unknown"
                );
                role = Role::Unknown;
            }
            self.set_role(&observation.member_id, role);
        }
    }

    fn set_role(&self, member_id: &MemberId, role: Role) {
        match self.registry.set_role(member_id, role) {
            Ok(member) => tracing::debug!(member = %member.id, role = ?role, "Role recorded"),
            Err(e) => tracing::warn!(member = %member_id, error = %e, "Failed to record role"),
        }
    }

    pub fn tier_status(&self, tier: Tier) -> TierStatus {
        let members = self.registry.snapshot(tier);
        let votes = QuorumState::compute(&members);

        let active_members = if tier.is_load_balanced() {
            lock(&self.rotation)
                .get(&tier)
                .map(|pool| pool.iter().cloned().collect())
                .unwrap_or_default()
        } else {
            members.iter().filter(|m| m.has_vote()).map(|m| m.id.clone()).collect()
        };

        TierStatus {
            tier,
            quorum_required: tier.quorum_required(),
            voting_members: votes.voting_members,
            healthy_votes: votes.healthy_votes,
            degraded_no_quorum: tier.quorum_required() && lock(&self.quorum).degraded(),
            active_members,
        }
    }

    /// Status of every tier that has members.
    pub fn tiers_status(&self) -> Vec<TierStatus> {
        self.registry.tiers().into_iter().map(|t| self.tier_status(t)).collect()
    }

    /// Most recent transitions, oldest first.
    pub fn recent_events(&self) -> Vec<StateTransitionEvent> {
        self.events.snapshot()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.recent()
    }

    /// Members whose last pool update failed.
    pub fn routing_pending(&self) -> Vec<MemberId> {
        lock(&self.pending).iter().cloned().collect()
    }

    pub fn recovery(&self) -> &Arc<RecoveryOrchestrator> {
        &self.recovery
    }
}
