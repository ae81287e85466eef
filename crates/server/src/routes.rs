//! Route configuration.

use crate::auth::identity_middleware;
use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::middleware;
use axum::routing::{get, post, put};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Health check (unauthenticated for load balancers/k8s probes)
        .route("/v1/health", get(handlers::health_check))
        // Upload sessions
        .route("/v1/uploads", post(handlers::initiate_upload))
        .route(
            "/v1/uploads/{session_id}",
            get(handlers::get_upload).delete(handlers::abort_upload),
        )
        .route(
            "/v1/uploads/{session_id}/parts/{part_number}",
            put(handlers::upload_part),
        )
        .route(
            "/v1/uploads/{session_id}/complete",
            post(handlers::complete_upload),
        )
        // File catalog
        .route(
            "/v1/files/{file_id}",
            get(handlers::get_file).delete(handlers::delete_file),
        )
        .route("/v1/usage", get(handlers::get_usage));

    let mut router = Router::new().merge(api_routes);

    // When enabled, /metrics must be network-restricted to the scraper.
    if state.config.server.metrics_enabled {
        let metrics_routes = Router::new().route("/metrics", get(metrics_handler));
        router = router.merge(metrics_routes);
    }

    router
        .layer(middleware::from_fn_with_state(
            state.clone(),
            identity_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
