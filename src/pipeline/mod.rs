//! Layers and dispatch shared by every endpoint.

pub mod middleware;
pub mod resource;

use axum::Router;
use axum::middleware::from_fn_with_state;

use crate::models::AppState;

pub use resource::{ApiReply, Resource, ResourceRequest, resource_handler};

/// Wraps `router` in the request pipeline, with the timeout outermost and
/// CORS innermost.
pub fn with_pipeline(router: Router<AppState>, app_state: AppState) -> Router<AppState> {
    let router = match middleware::cors_layer(&app_state.config) {
        Some(cors) => router.layer(cors),
        None => router,
    };

    router
        .layer(from_fn_with_state(app_state.clone(), middleware::request_pipeline))
        .layer(from_fn_with_state(app_state, middleware::timeout))
}
