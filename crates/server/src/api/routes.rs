use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::{handlers, proxy, validate};
use crate::api::middleware::metrics_middleware;
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Browser-facing download routes answer cross-origin preflights
    let proxy_routes = Router::new()
        .route("/proxy/download", get(proxy::download))
        .route("/proxy/wheel", get(proxy::wheel))
        .route("/wheels/{filename}", get(proxy::local_wheel))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any));

    Router::new()
        // Health, client config and metrics
        .route("/health", get(handlers::health))
        .route("/config.json", get(handlers::client_config))
        .route("/metrics", get(handlers::metrics))
        // Validation
        .route("/validate", post(validate::validate))
        .merge(proxy_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
