//! Operator HTTP API.
//!
//! Every route requires `Authorization: Bearer <admin.api_key>`. Errors are
//! returned as `{"error": "..."}` with a matching status code.

pub mod auth;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::failover::FailoverController;
use crate::recovery::RecoveryError;

#[derive(Clone)]
pub struct AdminState {
    pub controller: Arc<FailoverController>,
    pub api_key: Arc<str>,
}

impl AdminState {
    pub fn new(controller: Arc<FailoverController>, api_key: &str) -> Self {
        Self {
            controller,
            api_key: Arc::from(api_key),
        }
    }
}

#[derive(Debug)]
pub enum AdminError {
    Unauthorized,
    BadRequest(String),
    Recovery(RecoveryError),
}

impl From<RecoveryError> for AdminError {
    fn from(e: RecoveryError) -> Self {
        AdminError::Recovery(e)
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AdminError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
            AdminError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            AdminError::Recovery(e) => {
                let status = match &e {
                    RecoveryError::NotFound(_) | RecoveryError::IncidentNotFound(_) => StatusCode::NOT_FOUND,
                    RecoveryError::UnsupportedTier { .. } => StatusCode::BAD_REQUEST,
                    RecoveryError::IncidentResolved(_) => StatusCode::CONFLICT,
                    RecoveryError::Disabled => StatusCode::SERVICE_UNAVAILABLE,
                    RecoveryError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                    RecoveryError::Command(_) | RecoveryError::Webhook(_) => StatusCode::BAD_GATEWAY,
                };
                (status, e.to_string())
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/tiers", get(get_tiers))
        .route("/admin/members", get(get_members))
        .route("/admin/members/{id}/restart", post(restart_member))
        .route("/admin/events", get(get_events))
        .route("/admin/alerts", get(get_alerts))
        .route("/admin/incidents", get(get_incidents))
        .route("/admin/incidents/{id}/ack", post(ack_incident))
        .route("/admin/incidents/{id}/resolve", post(resolve_incident))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the admin API until shutdown.
pub async fn serve(
    state: AdminState,
    addr: SocketAddr,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(address = %listener.local_addr()?, "Admin API listening");

    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    tracing::info!("Admin API stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::BackendPool;
    use crate::recovery::{DisabledRestarter, RecoveryOrchestrator};
    use crate::registry::{Endpoint, Member, MemberRegistry, Tier};
    use crate::resilience::RetryPolicy;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    const KEY: &str = "test-key";

    fn state() -> AdminState {
        let registry = Arc::new(
            MemberRegistry::new(vec![
                Member::new("vm-web-1".into(), Tier::Web, Endpoint::resolve("10.0.1.4", 80), "1"),
                Member::new("vm-db-1".into(), Tier::Db, Endpoint::resolve("10.0.3.4", 27017), "1"),
            ])
            .unwrap(),
        );
        let pool = Arc::new(BackendPool::from_registry(&registry));
        let recovery = Arc::new(RecoveryOrchestrator::new(registry.clone(), Arc::new(DisabledRestarter), 10));
        let controller = Arc::new(FailoverController::new(registry, pool, recovery, RetryPolicy::default(), 16));
        AdminState::new(controller, KEY)
    }

    fn request(method: &str, uri: &str, key: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(key) = key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn rejects_missing_or_wrong_token() {
        let app = setup_admin_router(state());
        let response = app.clone().oneshot(request("GET", "/admin/status", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app.oneshot(request("GET", "/admin/status", Some("nope"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json(response).await["error"], "unauthorized");
    }

    #[tokio::test]
    async fn lists_tiers_and_members() {
        let app = setup_admin_router(state());

        let response = app.clone().oneshot(request("GET", "/admin/tiers", Some(KEY))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let tiers = json(response).await;
        assert_eq!(tiers[0]["tier"], "web");
        assert_eq!(tiers[0]["active_members"][0], "vm-web-1");
        assert_eq!(tiers[1]["quorum_required"], true);

        let response = app.oneshot(request("GET", "/admin/members", Some(KEY))).await.unwrap();
        let members = json(response).await;
        assert_eq!(members.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn incident_ack_and_resolve() {
        let state = state();
        let incident = state
            .controller
            .recovery()
            .request_manual_intervention(Tier::Db, "quorum lost");
        let app = setup_admin_router(state);

        let uri = format!("/admin/incidents/{}/ack", incident.id);
        let response = app.clone().oneshot(request("POST", &uri, Some(KEY))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["status"], "Acknowledged");

        let resolve = Request::builder()
            .method("POST")
            .uri(format!("/admin/incidents/{}/resolve", incident.id))
            .header("Authorization", format!("Bearer {}", KEY))
            .body(Body::from(r#"{"note":"third member added"}"#))
            .unwrap();
        let response = app.clone().oneshot(resolve).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["resolution_note"], "third member added");

        let response = app.clone().oneshot(request("POST", &uri, Some(KEY))).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app.oneshot(request("GET", "/admin/incidents", Some(KEY))).await.unwrap();
        assert!(json(response).await.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn bad_incident_id_is_json_error() {
        let app = setup_admin_router(state());
        let response = app
            .oneshot(request("POST", "/admin/incidents/not-a-uuid/ack", Some(KEY)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json(response).await["error"].as_str().unwrap().contains("not-a-uuid"));
    }

    #[tokio::test]
    async fn restart_maps_recovery_errors() {
        let app = setup_admin_router(state());

        let response = app
            .clone()
            .oneshot(request("POST", "/admin/members/vm-db-1/restart", Some(KEY)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .clone()
            .oneshot(request("POST", "/admin/members/ghost/restart", Some(KEY)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(request("POST", "/admin/members/vm-web-1/restart", Some(KEY)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
