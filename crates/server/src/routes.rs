//! Route configuration.

use crate::auth::trace_middleware;
use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::get;
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    // Health check (intentionally unauthenticated for load balancers/k8s probes)
    let mut router = Router::new().route("/v1/health", get(handlers::health_check));

    // SECURITY: When enabled, this endpoint MUST be network-restricted
    // to authorized Prometheus scraper IPs only.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    // Gem sources own their prefixes; the source table decides, not the router.
    let body_limit = usize::try_from(state.config.server.max_gem_size).unwrap_or(usize::MAX);

    // Order of execution: TraceLayer -> trace ID span -> body limit -> handler
    router
        .fallback(handlers::gem_source_fallback)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(trace_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
