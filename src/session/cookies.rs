use axum_extra::extract::cookie::{Cookie, CookieJar};
use oauth2::CsrfToken;
use time::Duration;

use super::codec;
use crate::models::oauth::AuthorizedSession;

pub const TEMPORARY_COOKIE_NAME: &str = "tw-temp";
pub const SESSION_COOKIE_NAME: &str = "tw-sess";

const COOKIE_MAX_AGE: Duration = Duration::hours(24);
const TEMPORARY_ID_BYTES: u32 = 128;

/// What the browser's cookies say about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCheck {
    /// A session cookie that decoded.
    Authorized(AuthorizedSession),
    /// A temporary session id the browser already held.
    Temporary(String),
    /// A temporary session id issued with this response.
    Issued(String),
}

impl SessionCheck {
    pub fn session(&self) -> AuthorizedSession {
        match self {
            Self::Authorized(session) => session.clone(),
            Self::Temporary(_) | Self::Issued(_) => AuthorizedSession::default(),
        }
    }
}

pub fn session_cookie(name: &str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name.to_string(), value))
        .secure(secure)
        .path("/")
        .max_age(COOKIE_MAX_AGE)
        .build()
}

/// A cookie that makes the browser drop `name`.
pub fn clear_cookie(name: &str, secure: bool) -> Cookie<'static> {
    Cookie::build((name.to_string(), String::new()))
        .secure(secure)
        .path("/")
        .max_age(Duration::seconds(-1))
        .build()
}

pub fn new_temporary_id() -> String {
    CsrfToken::new_random_len(TEMPORARY_ID_BYTES).secret().to_string()
}

/// Decodes the session cookie, or falls back to the temporary session,
/// issuing a fresh temporary id when the browser has neither.
///
/// A session cookie that fails to decode is treated as absent.
pub fn check_session(jar: CookieJar, secure: bool) -> (CookieJar, SessionCheck) {
    if let Some(session) = jar
        .get(SESSION_COOKIE_NAME)
        .and_then(|cookie| codec::decode(cookie.value()))
    {
        let jar = jar.add(clear_cookie(TEMPORARY_COOKIE_NAME, secure));
        return (jar, SessionCheck::Authorized(session));
    }

    match existing_temporary_id(&jar) {
        Some(id) => (jar, SessionCheck::Temporary(id)),
        None => {
            let (jar, id) = issue_temporary_id(jar, secure);
            (jar, SessionCheck::Issued(id))
        }
    }
}

/// The temporary session id, issuing one if the browser has none.
pub fn temporary_id(jar: CookieJar, secure: bool) -> (CookieJar, String) {
    match existing_temporary_id(&jar) {
        Some(id) => (jar, id),
        None => issue_temporary_id(jar, secure),
    }
}

pub fn existing_temporary_id(jar: &CookieJar) -> Option<String> {
    jar.get(TEMPORARY_COOKIE_NAME)
        .map(|cookie| cookie.value().to_string())
        .filter(|id| !id.is_empty())
}

fn issue_temporary_id(jar: CookieJar, secure: bool) -> (CookieJar, String) {
    let id = new_temporary_id();
    tracing::debug!("Issuing new temporary session");
    let jar = jar.add(session_cookie(TEMPORARY_COOKIE_NAME, id.clone(), secure));
    (jar, id)
}
