use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{changes, handlers, middleware::metrics_middleware, tasks};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Tasks
        .route("/tasks", post(tasks::enqueue_task))
        .route("/tasks/run", post(tasks::run_task))
        .route("/postsubmit/{branch}", post(tasks::queue_postsubmit))
        // Changes
        .route("/changes/{change}/{patchset}", get(changes::get_change));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
}
