//! Axum router configuration with middleware.
//!
//! All routes are under `/api/v1/` and require an API key; `/health` does not.
//! Middleware: CORS, tracing.

use axum::Router;
use axum::extract::State;
use axum::routing::{get, post, put};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/me", get(handlers::me::get_me))
        // Skills
        .route(
            "/skills",
            post(handlers::skill::create_skill).get(handlers::skill::list_skills),
        )
        .route(
            "/skills/{id}",
            get(handlers::skill::get_skill).put(handlers::skill::update_skill),
        )
        .route(
            "/skills/{id}/versions",
            get(handlers::skill::list_versions),
        )
        .route(
            "/skills/{id}/collaborators/{principal_id}",
            put(handlers::skill::set_collaborator).delete(handlers::skill::remove_collaborator),
        )
        // Runs
        .route("/skills/{id}/runs", post(handlers::run::submit_run))
        .route("/runs", get(handlers::run::list_runs))
        .route("/runs/{id}", get(handlers::run::get_run))
        .route("/runs/{id}/cancel", post(handlers::run::cancel_run));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Liveness plus queue occupancy (no auth required).
async fn health_check(State(state): State<AppState>) -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "queue": {
            "depth": state.run_service.queue_depth(),
            "capacity": state.run_service.queue_capacity(),
        },
    }))
}
