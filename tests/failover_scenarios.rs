//! End-to-end failover scenarios: scripted probes through monitor,
//! controller, registry, router and recovery.

mod common;

use common::*;
use tierwatch::failover::AlertKind;
use tierwatch::health::{HealthEvent, RoleObservation};
use tierwatch::recovery::IncidentStatus;
use tierwatch::registry::{HealthState, MemberId, Role, Tier};
use HealthState::*;

fn web_pair() -> Harness {
    Harness::new(vec![member("web-a", Tier::Web, Healthy), member("web-b", Tier::Web, Healthy)])
}

#[tokio::test]
async fn two_failures_remove_member_from_rotation() {
    let mut h = web_pair();

    h.probe_with("web-a", &[false]).await;
    assert!(h.transitions().is_empty());
    assert_eq!(h.phase("web-a"), Suspect);
    assert_eq!(h.health("web-a"), Healthy);

    h.probe_with("web-a", &[false]).await;

    assert_eq!(h.transitions(), vec![("web-a".to_string(), Healthy, Unhealthy)]);
    assert_eq!(h.router.calls(), vec![(MemberId::from("web-a"), false)]);
    assert_eq!(h.health("web-a"), Unhealthy);
    assert!(!h.router.pool.is_active(&"web-a".into()));
    assert!(h.router.pool.is_active(&"web-b".into()));
    assert!(h.controller.alerts().is_empty());
}

#[tokio::test]
async fn failure_then_success_produces_no_transition() {
    let mut h = web_pair();

    h.probe_with("web-b", &[false, true]).await;
    assert!(h.transitions().is_empty());
    assert!(h.router.calls().is_empty());
    assert_eq!(h.phase("web-b"), Healthy);

    // After the member went Unhealthy, a failure then a single success
    // neither reports anything nor puts it back.
    h.probe_with("web-a", &[false, false]).await;
    let before = h.transitions().len();
    h.probe_with("web-a", &[false, true]).await;
    let after: Vec<_> = h.transitions().into_iter().skip(before).collect();
    assert!(after.is_empty());
    assert_eq!(h.phase("web-a"), Recovering);
    assert_eq!(h.health("web-a"), Unhealthy);
    assert_eq!(h.router.calls_for("web-a", true), 0);
}

#[tokio::test]
async fn hysteresis_never_flaps_on_alternating_results() {
    let mut h = web_pair();
    h.probe_with("web-a", &[false, true, false, true, false, true, false, true]).await;

    assert!(h.transitions().iter().all(|(_, _, to)| *to != Unhealthy));
    assert!(h.router.calls().is_empty());
    assert_eq!(h.health("web-a"), Healthy);
}

#[tokio::test]
async fn two_voter_replica_set_losing_primary_opens_one_incident() {
    let mut h = Harness::new(vec![db_member("db-1", Role::Primary), db_member("db-2", Role::Secondary)]);

    h.probe_with("db-2", &[true]).await;
    h.probe_with("db-1", &[false, false]).await;
    // More failures must not open more incidents.
    h.probe_with("db-1", &[false, false]).await;

    assert_eq!(h.health("db-1"), Unhealthy);
    let status = h.controller.tier_status(Tier::Db);
    assert_eq!(status.voting_members, 2);
    assert_eq!(status.healthy_votes, 1);
    assert!(status.degraded_no_quorum);

    let incidents = h.recovery.pending_incidents();
    assert_eq!(incidents.len(), 1);
    assert_eq!(incidents[0].tier, Tier::Db);
    assert!(incidents[0].reason.contains("quorum"));
    assert!(incidents[0].reason.contains("1 of 2"));

    assert_eq!(h.role("db-1"), Some(Role::Unknown));
    assert!(h.registry.snapshot(Tier::Db).iter().all(|m| !m.is_primary()));
    assert!(h.router.calls().is_empty());
}

#[tokio::test]
async fn three_voter_replica_set_tolerates_one_failure() {
    let mut h = Harness::new(vec![
        db_member("db-1", Role::Primary),
        db_member("db-2", Role::Secondary),
        db_member("db-3", Role::Secondary),
    ]);

    h.probe_with("db-1", &[true]).await;
    h.probe_with("db-3", &[false, false]).await;

    assert_eq!(h.health("db-3"), Unhealthy);
    let status = h.controller.tier_status(Tier::Db);
    assert_eq!((status.healthy_votes, status.voting_members), (2, 3));
    assert!(!status.degraded_no_quorum);
    assert!(h.recovery.pending_incidents().is_empty());

    // Roles are left to replica-set status polling.
    assert_eq!(h.role("db-1"), Some(Role::Primary));
    assert_eq!(h.role("db-2"), Some(Role::Secondary));
}

#[tokio::test]
async fn quorum_restore_keeps_incident_pending_until_resolved() {
    let mut h = Harness::new(vec![db_member("db-1", Role::Primary), db_member("db-2", Role::Secondary)]);

    h.probe_with("db-1", &[true]).await;
    h.probe_with("db-2", &[false, false]).await;
    assert!(h.controller.tier_status(Tier::Db).degraded_no_quorum);

    h.probe_with("db-2", &[true, true]).await;
    assert_eq!(h.health("db-2"), Healthy);
    assert!(!h.controller.tier_status(Tier::Db).degraded_no_quorum);

    let pending = h.recovery.pending_incidents();
    assert_eq!(pending.len(), 1);
    let resolved = h.recovery.resolve(pending[0].id, Some("restarted db-2".into())).unwrap();
    assert_eq!(resolved.status, IncidentStatus::Resolved);
    assert!(h.recovery.pending_incidents().is_empty());

    // Replica set elected again; the new primary is accepted.
    h.controller
        .handle(HealthEvent::RolesObserved {
            observed_at: 1,
            roles: vec![
                RoleObservation { member_id: "db-1".into(), role: Role::Secondary },
                RoleObservation { member_id: "db-2".into(), role: Role::Primary },
            ],
        })
        .await;
    assert_eq!(h.role("db-2"), Some(Role::Primary));
}

#[tokio::test]
async fn startup_without_quorum_opens_no_incident() {
    let mut h = Harness::new(vec![
        member("db-1", Tier::Db, Unknown),
        member("db-2", Tier::Db, Unknown),
    ]);

    h.probe_with("db-1", &[false, false]).await;
    h.probe_with("db-2", &[false, false]).await;

    assert!(h.recovery.pending_incidents().is_empty());
    assert!(!h.controller.tier_status(Tier::Db).degraded_no_quorum);
}

#[tokio::test]
async fn recovered_member_is_readded_once() {
    let mut h = web_pair();
    h.probe_with("web-a", &[false, false]).await;
    assert!(!h.router.pool.is_active(&"web-a".into()));

    h.probe_with("web-a", &[true, true]).await;

    assert_eq!(
        h.transitions(),
        vec![
            ("web-a".to_string(), Healthy, Unhealthy),
            ("web-a".to_string(), Recovering, Healthy),
        ]
    );
    assert_eq!(h.router.calls_for("web-a", true), 1);
    assert!(h.router.pool.is_active(&"web-a".into()));
}

#[tokio::test]
async fn failing_router_is_retried_five_times_with_one_alert() {
    let mut h = web_pair();
    h.router.fail_forever();

    h.probe_with("web-a", &[false, false]).await;

    assert_eq!(h.router.calls_for("web-a", false), 5);
    let alerts = h.controller.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::RoutingRetryExhausted);
    assert_eq!(alerts[0].member_id, Some(MemberId::from("web-a")));
    assert_eq!(h.controller.routing_pending(), vec![MemberId::from("web-a")]);

    // Once the pool API is back, reconcile takes the member out.
    h.router.recover();
    assert_eq!(h.controller.reconcile(Tier::Web).await, 1);
    assert!(!h.router.pool.is_active(&"web-a".into()));
    assert!(h.controller.routing_pending().is_empty());
    assert_eq!(h.controller.alerts().len(), 1);
}

#[tokio::test]
async fn transient_router_failure_is_absorbed_by_retry() {
    let mut h = web_pair();
    h.router.fail_next(2);

    h.probe_with("web-a", &[false, false]).await;

    assert_eq!(h.router.calls_for("web-a", false), 3);
    assert!(!h.router.pool.is_active(&"web-a".into()));
    assert!(h.controller.alerts().is_empty());
}

#[tokio::test]
async fn unhealthy_member_never_stays_in_rotation() {
    let mut h = Harness::new(vec![
        member("app-1", Tier::App, Healthy),
        member("app-2", Tier::App, Healthy),
        member("app-3", Tier::App, Healthy),
    ]);

    let script: &[(&str, &[bool])] = &[
        ("app-1", &[false, false]),
        ("app-2", &[false, true, false, false]),
        ("app-1", &[true, false, true, true]),
        ("app-3", &[false, false, true]),
        ("app-2", &[true, true]),
    ];
    for (id, outcomes) in script {
        h.probe_with(id, outcomes).await;
        for member in h.registry.snapshot(Tier::App) {
            if member.health == Unhealthy {
                assert!(!h.router.pool.is_active(&member.id), "{} is unhealthy but active", member.id);
            }
        }
    }
}

#[tokio::test]
async fn last_member_removed_raises_pool_exhausted() {
    let mut h = web_pair();
    h.probe_with("web-a", &[false, false]).await;
    h.probe_with("web-b", &[false, false]).await;

    assert!(h.router.pool.active_members(Tier::Web).is_empty());
    let alerts = h.controller.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::PoolExhausted);
    assert_eq!(alerts[0].tier, Tier::Web);
}

#[tokio::test]
async fn restart_forces_immediate_reprobe() {
    let mut h = web_pair();
    h.probe_with("web-a", &[false, false]).await;

    let shutdown = tierwatch::Shutdown::new();
    h.monitor.start(&shutdown).await;
    let before = h.probes.calls();
    let ack = h.recovery.restart_member(&"web-a".into()).await.unwrap();
    assert!(ack.reprobe_requested);
    assert_eq!(*h.restarter.restarted.lock().unwrap(), vec![MemberId::from("web-a")]);

    // Default interval is 15s; a probe well before that is the forced one.
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(2);
    while h.probes.calls() == before && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    assert!(h.probes.calls() > before);
    h.monitor.stop_all().await;
}
