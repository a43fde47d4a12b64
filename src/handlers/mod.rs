pub mod authenticated_handler;
pub mod oauth;

use axum::Router;
use axum::routing::get;

use crate::models::AppState;
use crate::pipeline::{resource_handler, with_pipeline};
use authenticated_handler::Authenticated;
use oauth::{callback_handler, entry_handler, logout_handler, signin_handler};

pub fn router(app_state: AppState) -> Router {
    let routes = Router::new()
        .route("/twitter", get(entry_handler))
        .route("/twitter/signin", get(signin_handler))
        .route("/twitter/callback", get(callback_handler))
        .route("/twitter/logout", get(logout_handler))
        .route("/authenticated", resource_handler(Authenticated));

    with_pipeline(routes, app_state.clone()).with_state(app_state)
}
