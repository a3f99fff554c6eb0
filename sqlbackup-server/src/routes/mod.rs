pub mod health;
pub mod rotation;
pub mod servers;

use crate::state::AppState;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .nest("/api/servers", servers::router())
        .nest("/api/rotate", rotation::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
