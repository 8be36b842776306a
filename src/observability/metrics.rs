//! Metrics collection and exposition.
//!
//! # Metrics
//! - `tierwatch_probes_total` (counter): probes by tier, result
//! - `tierwatch_probe_latency_seconds` (histogram): probe latency by tier
//! - `tierwatch_member_health` (gauge): 1=healthy, 0=otherwise
//! - `tierwatch_transitions_total` (counter): transitions by tier, target state
//! - `tierwatch_routing_attempts_total` (counter): pool updates by result
//! - `tierwatch_alerts_total` (counter): alerts by kind
//! - `tierwatch_incidents_total` (counter): incidents by tier
//! - `tierwatch_quorum_held` (gauge): 1 while the db tier has quorum
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed, so tests need no setup
//! - Labels are low-cardinality except `member`, bounded by the static topology

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::registry::{HealthState, MemberId, Tier};

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(addr = %addr, "Serving metrics");
    Ok(())
}

pub fn record_probe(tier: Tier, success: bool, latency: Duration) {
    let result = if success { "success" } else { "failure" };
    counter!("tierwatch_probes_total", "tier" => tier.as_str(), "result" => result).increment(1);
    histogram!("tierwatch_probe_latency_seconds", "tier" => tier.as_str()).record(latency.as_secs_f64());
}

pub fn record_member_health(member: &MemberId, tier: Tier, state: HealthState) {
    let value = if state == HealthState::Healthy { 1.0 } else { 0.0 };
    gauge!("tierwatch_member_health", "member" => member.to_string(), "tier" => tier.as_str()).set(value);
}

pub fn record_transition(tier: Tier, to: HealthState) {
    counter!("tierwatch_transitions_total", "tier" => tier.as_str(), "to" => to.to_string()).increment(1);
}

pub fn record_routing_attempt(success: bool) {
    let result = if success { "success" } else { "failure" };
    counter!("tierwatch_routing_attempts_total", "result" => result).increment(1);
}

pub fn record_alert(kind: &'static str) {
    counter!("tierwatch_alerts_total", "kind" => kind).increment(1);
}

pub fn record_incident(tier: Tier) {
    counter!("tierwatch_incidents_total", "tier" => tier.as_str()).increment(1);
}

pub fn set_quorum_held(held: bool) {
    gauge!("tierwatch_quorum_held").set(if held { 1.0 } else { 0.0 });
}
