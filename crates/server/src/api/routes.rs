use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::{handlers, metrics_middleware, sessions, ws};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let max_upload_bytes = state.config().server.max_upload_bytes;

    // API routes
    let api_routes = Router::new()
        .route("/health", get(handlers::health))
        // Sessions
        .route(
            "/sessions",
            post(sessions::create_session).get(sessions::list_sessions),
        )
        .route(
            "/sessions/{id}",
            get(sessions::get_session).delete(sessions::delete_session),
        )
        // Jobs
        .route("/sessions/{id}/files", post(sessions::submit_file))
        .route("/sessions/{id}/cancel", post(sessions::cancel_job))
        .route("/sessions/{id}/reload", post(sessions::reload_engine))
        .route("/sessions/{id}/logs", get(sessions::get_logs))
        // Delivery
        .route(
            "/sessions/{id}/notifications",
            get(sessions::list_notifications),
        )
        .route("/sessions/{id}/outbox", get(sessions::list_outbox))
        .route(
            "/sessions/{id}/outbox/{name}",
            get(sessions::download_outbound),
        )
        .route("/sessions/{id}/ws", get(ws::ws_handler))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state);

    Router::new()
        .route("/metrics", get(handlers::metrics))
        .nest("/api/v1", api_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
