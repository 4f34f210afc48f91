//! fleetscale-api — REST API for fleetscale.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/fleets` | List fleet names |
//! | POST | `/api/v1/fleets/{fleet}/scale` | Decide and reconcile |
//! | POST | `/api/v1/fleets/{fleet}/preview` | Decide only (dry run) |
//! | PUT | `/api/v1/fleets/{fleet}/metrics` | Store metrics for the ticker |
//! | GET | `/api/v1/fleets/{fleet}/instances` | Provider listing |
//! | GET | `/api/v1/fleets/{fleet}/history` | Decision history |
//! | GET | `/api/v1/policies` | Registered policy names |
//! | GET | `/metrics` | Prometheus exposition |

pub mod handlers;

use axum::Router;
use axum::routing::{get, post, put};

use fleetscale_policy::DecisionEngine;
use fleetscale_reconcile::Fleets;
use fleetscale_telemetry::MetricsRegistry;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub fleets: Fleets,
    pub engine: DecisionEngine,
    pub metrics: MetricsRegistry,
}

/// Build the complete API router (REST + metrics).
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/fleets", get(handlers::list_fleets))
        .route("/fleets/{fleet}/scale", post(handlers::scale_fleet))
        .route("/fleets/{fleet}/preview", post(handlers::preview_fleet))
        .route("/fleets/{fleet}/metrics", put(handlers::push_metrics))
        .route("/fleets/{fleet}/instances", get(handlers::list_instances))
        .route("/fleets/{fleet}/history", get(handlers::fleet_history))
        .route("/policies", get(handlers::list_policies))
        .with_state(state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::prometheus_metrics).with_state(state))
}
