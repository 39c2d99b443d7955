//! HTTP routing.

use axum::{
    Router,
    routing::get,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::auth::{AppState, routes};

/// Builds the gateway router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/auth/{provider}/login", get(routes::login))
        .route("/auth/{provider}/callback", get(routes::callback))
        .route("/auth/session", get(routes::session_status))
        .route("/auth/logout", get(routes::logout).post(routes::logout))
        .route("/auth/me", get(routes::me))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
