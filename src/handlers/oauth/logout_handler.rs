use axum::extract::State;
use axum::response::IntoResponse;
use axum_extra::extract::cookie::CookieJar;

use super::found;
use crate::models::AppState;
use crate::session::cookies::{SESSION_COOKIE_NAME, clear_cookie};

pub async fn logout_handler(State(app_state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    let jar = jar.add(clear_cookie(SESSION_COOKIE_NAME, app_state.config.secured_cookie));
    (jar, found(&app_state.config.logout_redirect_url))
}
