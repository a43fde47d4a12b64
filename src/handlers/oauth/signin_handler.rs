use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::CookieJar;

use super::{SIGNIN_PATH, found};
use crate::error::AppError;
use crate::models::AppState;
use crate::session::cookies::{SESSION_COOKIE_NAME, clear_cookie};
use crate::session::{check_session, temporary_id};

pub async fn entry_handler(State(app_state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    let (jar, _) = check_session(jar, app_state.config.secured_cookie);
    (jar, found(SIGNIN_PATH))
}

/// Starts a handshake: obtains a request token and sends the browser to
/// the provider's authorize page.
pub async fn signin_handler(State(app_state): State<AppState>, jar: CookieJar) -> Response {
    let secure = app_state.config.secured_cookie;
    let jar = jar.add(clear_cookie(SESSION_COOKIE_NAME, secure));
    let (jar, temporary_id) = temporary_id(jar, secure);

    match authorize_url(&app_state, &temporary_id).await {
        Ok(url) => (jar, found(&url)).into_response(),
        Err(e) => (jar, e).into_response(),
    }
}

async fn authorize_url(app_state: &AppState, temporary_id: &str) -> Result<String, AppError> {
    let request_token = app_state.provider.request_token().await.map_err(|e| {
        tracing::error!(error = %e, "Could not get a request token");
        AppError::Transport(format!("Problem getting the request token: {e}"))
    })?;
    let url = app_state.provider.authorize_url(&request_token)?;

    if app_state.pending.get(temporary_id).is_some() {
        tracing::debug!("Replacing an unfinished handshake");
    }
    app_state.pending.put(temporary_id, request_token);
    tracing::debug!(pending = app_state.pending.len(), "Redirecting to the provider");

    Ok(url)
}
