use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::admin::{AdminError, AdminState};
use crate::failover::{Alert, TierStatus};
use crate::health::StateTransitionEvent;
use crate::recovery::{Incident, RestartAck};
use crate::registry::{Member, MemberId};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub members: usize,
    pub pending_incidents: usize,
    pub routing_pending: Vec<MemberId>,
}

#[derive(Debug, Default, Deserialize)]
pub struct IncidentQuery {
    /// Include resolved incidents.
    #[serde(default)]
    pub all: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResolveRequest {
    pub note: Option<String>,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let degraded = state
        .controller
        .tiers_status()
        .iter()
        .any(|t| t.degraded_no_quorum);
    let routing_pending = state.controller.routing_pending();

    let status = if degraded {
        "degraded"
    } else if !routing_pending.is_empty() {
        "reconciling"
    } else {
        "operational"
    };

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status,
        members: state.controller.registry().len(),
        pending_incidents: state.controller.recovery().pending_incidents().len(),
        routing_pending,
    })
}

pub async fn get_tiers(State(state): State<AdminState>) -> Json<Vec<TierStatus>> {
    Json(state.controller.tiers_status())
}

pub async fn get_members(State(state): State<AdminState>) -> Json<Vec<Member>> {
    Json(state.controller.registry().all())
}

pub async fn get_events(State(state): State<AdminState>) -> Json<Vec<StateTransitionEvent>> {
    Json(state.controller.recent_events())
}

pub async fn get_alerts(State(state): State<AdminState>) -> Json<Vec<Alert>> {
    Json(state.controller.alerts())
}

pub async fn get_incidents(
    State(state): State<AdminState>,
    Query(query): Query<IncidentQuery>,
) -> Json<Vec<Incident>> {
    let recovery = state.controller.recovery();
    if query.all {
        Json(recovery.incidents())
    } else {
        Json(recovery.pending_incidents())
    }
}

fn parse_incident_id(raw: &str) -> Result<Uuid, AdminError> {
    Uuid::parse_str(raw).map_err(|_| AdminError::BadRequest(format!("'{}' is not an incident id", raw)))
}

pub async fn ack_incident(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> Result<Json<Incident>, AdminError> {
    let id = parse_incident_id(&id)?;
    Ok(Json(state.controller.recovery().acknowledge(id)?))
}

pub async fn resolve_incident(
    State(state): State<AdminState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Incident>, AdminError> {
    let id = parse_incident_id(&id)?;
    let request = if body.is_empty() {
        ResolveRequest::default()
    } else {
        serde_json::from_slice::<ResolveRequest>(&body)
            .map_err(|e| AdminError::BadRequest(format!("invalid resolve body: {}", e)))?
    };
    Ok(Json(state.controller.recovery().resolve(id, request.note)?))
}

pub async fn restart_member(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> Result<Json<RestartAck>, AdminError> {
    let member_id = MemberId::new(id);
    Ok(Json(state.controller.recovery().restart_member(&member_id).await?))
}
