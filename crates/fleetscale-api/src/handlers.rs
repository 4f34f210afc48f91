//! REST API handlers.
//!
//! Each handler resolves the fleet's controller and returns the JSON
//! envelope `{success, data?, error?}`.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::warn;

use fleetscale_core::MetricsSnapshot;
use fleetscale_policy::PolicyError;
use fleetscale_reconcile::ControllerError;

use crate::ApiState;

const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
        .into_response()
}

fn status_for(err: &ControllerError) -> StatusCode {
    match err {
        ControllerError::Policy(PolicyError::UnknownPolicy(_)) | ControllerError::UnknownFleet(_) => {
            StatusCode::NOT_FOUND
        }
        ControllerError::Policy(_) => StatusCode::BAD_REQUEST,
        ControllerError::Provider(_) => StatusCode::BAD_GATEWAY,
        ControllerError::State(_) | ControllerError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn controller_error(err: ControllerError) -> Response {
    let status = status_for(&err);
    if status.is_server_error() {
        warn!(error = %err, "request failed");
    }
    error_response(&err.to_string(), status)
}

/// Body of scale and preview requests.
#[derive(Debug, Serialize, Deserialize)]
pub struct ScaleRequest {
    pub policy: String,
    pub metrics: MetricsSnapshot,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

// ── Fleets ─────────────────────────────────────────────────────

/// GET /api/v1/fleets
pub async fn list_fleets(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.fleets.names())
}

/// POST /api/v1/fleets/{fleet}/scale
///
/// The cycle runs detached, so a client hanging up mid-cycle does not cut
/// it short.
pub async fn scale_fleet(
    State(state): State<ApiState>,
    Path(fleet): Path<String>,
    Json(req): Json<ScaleRequest>,
) -> Response {
    let controller = match state.fleets.get(&fleet) {
        Ok(c) => c,
        Err(e) => return controller_error(e),
    };
    match controller.clone().trigger_detached(req.policy, req.metrics).await {
        Ok(outcome) => ApiResponse::ok(outcome).into_response(),
        Err(e) => controller_error(e),
    }
}

/// POST /api/v1/fleets/{fleet}/preview
pub async fn preview_fleet(
    State(state): State<ApiState>,
    Path(fleet): Path<String>,
    Json(req): Json<ScaleRequest>,
) -> Response {
    let controller = match state.fleets.get(&fleet) {
        Ok(c) => c,
        Err(e) => return controller_error(e),
    };
    match controller.preview(&req.policy, &req.metrics).await {
        Ok(decision) => ApiResponse::ok(decision).into_response(),
        Err(e) => controller_error(e),
    }
}

/// PUT /api/v1/fleets/{fleet}/metrics
pub async fn push_metrics(
    State(state): State<ApiState>,
    Path(fleet): Path<String>,
    Json(metrics): Json<MetricsSnapshot>,
) -> Response {
    let result = state
        .fleets
        .get(&fleet)
        .and_then(|c| c.push_metrics(&metrics));
    match result {
        Ok(()) => ApiResponse::ok(metrics).into_response(),
        Err(e) => controller_error(e),
    }
}

// ── Instances & history ────────────────────────────────────────

/// GET /api/v1/fleets/{fleet}/instances
pub async fn list_instances(State(state): State<ApiState>, Path(fleet): Path<String>) -> Response {
    let controller = match state.fleets.get(&fleet) {
        Ok(c) => c,
        Err(e) => return controller_error(e),
    };
    match controller.fleet_listing().await {
        Ok(instances) => ApiResponse::ok(instances).into_response(),
        Err(e) => controller_error(e),
    }
}

/// GET /api/v1/fleets/{fleet}/history?limit=N
pub async fn fleet_history(
    State(state): State<ApiState>,
    Path(fleet): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    match state.fleets.get(&fleet).and_then(|c| c.history(limit)) {
        Ok(records) => ApiResponse::ok(records).into_response(),
        Err(e) => controller_error(e),
    }
}

// ── Policies ───────────────────────────────────────────────────

/// GET /api/v1/policies
pub async fn list_policies(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.engine.policies())
}

// ── Prometheus ─────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let body = fleetscale_telemetry::render_prometheus(&state.metrics.samples());
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use fleetscale_core::config::FleetConfig;
    use fleetscale_policy::{BudgetCap, DecisionEngine, PolicyRegistry};
    use fleetscale_provider::InMemoryProvider;
    use fleetscale_reconcile::{FleetController, Fleets};
    use fleetscale_state::StateStore;
    use fleetscale_telemetry::{MetricsRegistry, MetricsReporter};

    fn test_state() -> (ApiState, Arc<InMemoryProvider>) {
        let provider = Arc::new(InMemoryProvider::seeded("game-server", 1));
        let metrics = MetricsRegistry::new();
        let engine = DecisionEngine::new(PolicyRegistry::with_budget(
            BudgetCap::with_budget(100.0).unwrap(),
        ));
        let mut fleets = Fleets::new();
        fleets.insert(FleetController::new(
            FleetConfig::named("eu"),
            engine.clone(),
            provider.clone(),
            MetricsReporter::new(Arc::new(metrics.clone())),
            StateStore::open_in_memory().unwrap(),
        ));
        (
            ApiState {
                fleets,
                engine,
                metrics,
            },
            provider,
        )
    }

    fn snapshot(capacity: u64) -> MetricsSnapshot {
        MetricsSnapshot {
            current_players: 100,
            server_capacity: capacity,
            current_servers: 1,
            queue_length: 5,
            daily_cost: 100.0,
            daily_budget: None,
        }
    }

    fn request(policy: &str, capacity: u64) -> Json<ScaleRequest> {
        Json(ScaleRequest {
            policy: policy.to_string(),
            metrics: snapshot(capacity),
        })
    }

    #[tokio::test]
    async fn scale_runs_cycle() {
        let (state, provider) = test_state();
        let resp = scale_fleet(State(state), Path("eu".to_string()), request("aggressive", 10)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(provider.instances().len(), 12);
    }

    #[tokio::test]
    async fn scale_invalid_metrics_is_bad_request() {
        let (state, provider) = test_state();
        let resp = scale_fleet(State(state), Path("eu".to_string()), request("aggressive", 0)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(provider.calls().total(), 0);
    }

    #[tokio::test]
    async fn scale_unknown_policy_is_not_found() {
        let (state, _) = test_state();
        let resp = scale_fleet(State(state), Path("eu".to_string()), request("lazy", 10)).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn scale_unknown_fleet_is_not_found() {
        let (state, _) = test_state();
        let resp = scale_fleet(State(state), Path("ap".to_string()), request("aggressive", 10)).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn preview_leaves_fleet_untouched() {
        let (state, provider) = test_state();
        let resp = preview_fleet(State(state), Path("eu".to_string()), request("aggressive", 10)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(provider.calls().total(), 0);
    }

    #[tokio::test]
    async fn push_metrics_rejects_zero_capacity() {
        let (state, _) = test_state();
        let resp = push_metrics(State(state.clone()), Path("eu".to_string()), Json(snapshot(0))).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = push_metrics(State(state), Path("eu".to_string()), Json(snapshot(10))).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn instances_provider_failure_is_bad_gateway() {
        let (state, provider) = test_state();
        provider.fail_list(true);
        let resp = list_instances(State(state), Path("eu".to_string())).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn history_after_scale() {
        let (state, provider) = test_state();
        scale_fleet(State(state.clone()), Path("eu".to_string()), request("cost-capped", 10)).await;
        preview_fleet(State(state.clone()), Path("eu".to_string()), request("aggressive", 10)).await;
        assert!(provider.instances().is_empty());

        let resp = fleet_history(
            State(state.clone()),
            Path("eu".to_string()),
            Query(HistoryQuery { limit: Some(5) }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let records = json["data"].as_array().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["seq"], 2);
        assert_eq!(records[0]["dry_run"], true);
        assert_eq!(records[0]["decision"]["policy"], "aggressive");
        assert_eq!(records[1]["seq"], 1);
        assert_eq!(records[1]["decision"]["policy"], "cost-capped");
        assert_eq!(records[1]["decision"]["target_servers"], 0);
        assert_eq!(records[1]["result"]["realized_count"], 0);

        let resp = fleet_history(
            State(state),
            Path("eu".to_string()),
            Query(HistoryQuery { limit: Some(1) }),
        )
        .await;
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["data"].as_array().unwrap().len(), 1);
        assert_eq!(json["data"][0]["seq"], 2);
    }

    #[tokio::test]
    async fn list_endpoints_ok() {
        let (state, _) = test_state();
        assert_eq!(
            list_fleets(State(state.clone())).await.into_response().status(),
            StatusCode::OK
        );
        assert_eq!(
            list_policies(State(state)).await.into_response().status(),
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn prometheus_endpoint_returns_text() {
        let (state, _) = test_state();
        scale_fleet(State(state.clone()), Path("eu".to_string()), request("aggressive", 10)).await;
        let resp = prometheus_metrics(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp.headers().get("content-type").unwrap().to_str().unwrap();
        assert!(content_type.contains("text/plain"));
    }
}
