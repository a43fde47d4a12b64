use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::CookieJar;

use super::found;
use crate::error::AppError;
use crate::models::AppState;
use crate::models::oauth::{AuthorizedSession, CallbackParams};
use crate::models::user::User;
use crate::oauth1::AccessToken;
use crate::session::cookies::{
    SESSION_COOKIE_NAME, TEMPORARY_COOKIE_NAME, clear_cookie, existing_temporary_id,
    session_cookie,
};
use crate::session::{Claim, SessionCheck, check_session, codec};

const USER_ID_PREFIX: &str = "tw/";

/// Completes the handshake the provider redirected back from.
pub async fn callback_handler(
    Query(params): Query<CallbackParams>,
    State(app_state): State<AppState>,
    jar: CookieJar,
) -> Response {
    let config = &app_state.config;
    let secure = config.secured_cookie;

    if params.is_denied() {
        if let Some(id) = existing_temporary_id(&jar) {
            app_state.pending.remove(&id);
        }
        tracing::info!("User denied the authorization request");
        return found(&config.app_root_url);
    }

    let (jar, check) = check_session(jar, secure);
    let temporary_id = match check {
        SessionCheck::Authorized(session) if session.is_authorized() => {
            tracing::debug!(user_id = %session.user_id, "Already signed in");
            return (jar, found(&config.app_root_url)).into_response();
        }
        SessionCheck::Temporary(id) => id,
        SessionCheck::Authorized(_) | SessionCheck::Issued(_) => {
            return (jar, AppError::Session).into_response();
        }
    };

    let session = match exchange(&app_state, &temporary_id, &params).await {
        Ok(session) => session,
        Err(e) => return (jar, e).into_response(),
    };

    let jar = jar
        .add(session_cookie(SESSION_COOKIE_NAME, codec::encode(&session), secure))
        .add(clear_cookie(TEMPORARY_COOKIE_NAME, secure));
    tracing::info!(user_id = %session.user_id, screen_name = %session.screen_name, "Signed in");

    let location = format!(
        "{}{}",
        config.login_redirect_url,
        urlencoding::encode(&session.user_id)
    );
    (jar, found(&location)).into_response()
}

async fn exchange(
    app_state: &AppState,
    temporary_id: &str,
    params: &CallbackParams,
) -> Result<AuthorizedSession, AppError> {
    let (oauth_token, verifier) = match credentials(params) {
        Ok(credentials) => credentials,
        Err(e) if app_state.pending.get(temporary_id).is_none() => {
            tracing::warn!(error = %e, "No pending handshake for this session");
            return Err(AppError::Session);
        }
        Err(e) => return Err(e),
    };

    let pending = match app_state.pending.claim(temporary_id, oauth_token) {
        Claim::Claimed(pending) => pending,
        Claim::Mismatch => {
            return Err(AppError::Protocol(
                "Problem parsing authorization: oauth_token does not match".into(),
            ));
        }
        Claim::Missing => {
            tracing::warn!("No pending handshake for this session");
            return Err(AppError::Session);
        }
    };

    let access = match app_state.provider.access_token(&pending.token, verifier).await {
        Ok(access) => access,
        Err(e) => {
            tracing::error!(error = %e, "Could not get an access token");
            if !app_state.pending.restore(temporary_id, pending) {
                tracing::debug!("A newer handshake replaced this one");
            }
            return Err(AppError::from(e));
        }
    };

    let user_id = format!("{USER_ID_PREFIX}{}", access.user_id);
    save_user(app_state, &user_id, &access.screen_name).await;
    let screen_image = profile_image(app_state, &access).await;

    Ok(AuthorizedSession {
        user_id,
        screen_name: access.screen_name,
        screen_image,
        access_token_key: access.token,
        access_token_secret: access.secret,
    })
}

/// The `oauth_token` and `oauth_verifier` the provider sent back.
fn credentials(params: &CallbackParams) -> Result<(&str, &str), AppError> {
    let token = non_empty(&params.oauth_token).ok_or_else(|| {
        AppError::Protocol("Problem parsing authorization: missing oauth_token".into())
    })?;
    let verifier = non_empty(&params.oauth_verifier).ok_or_else(|| {
        AppError::Protocol("Problem parsing authorization: missing oauth_verifier".into())
    })?;
    Ok((token, verifier))
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Records the screen name against the user. Failures only cost the record.
async fn save_user(app_state: &AppState, user_id: &str, screen_name: &str) {
    let mut user = match app_state.users.get_user(user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            tracing::info!(%user_id, "Creating new user");
            User::new(user_id)
        }
        Err(e) => {
            tracing::warn!(error = %e, %user_id, "Could not look up user");
            User::new(user_id)
        }
    };
    user.name = screen_name.to_string();

    if let Err(e) = app_state.users.save_user(&user).await {
        tracing::warn!(error = %e, %user_id, "Could not save user");
    }
}

async fn profile_image(app_state: &AppState, access: &AccessToken) -> String {
    match app_state
        .provider
        .profile_image(access, &access.screen_name)
        .await
    {
        Ok(url) => strip_scheme(&url),
        Err(e) => {
            tracing::warn!(error = %e, screen_name = %access.screen_name, "Could not get profile image");
            String::new()
        }
    }
}

/// Scheme-relative form of `url`, so the page picks its own scheme.
fn strip_scheme(url: &str) -> String {
    url.replace("https:", "").replace("http:", "")
}
