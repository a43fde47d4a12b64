//! Cookie-safe text form of an [`AuthorizedSession`].
//!
//! The session is written as its JSON object with the quotes dropped and the
//! field separators replaced by `|`, e.g.
//! `{id:tw/42|name:alice|img://pbs.example/a.png|token:k|secret:s}`.
//! A `:` inside a value is stored as `*`.
//!
//! Values containing `|`, `*`, `{`, `}`, `,`, `"` or `\` cannot be
//! recovered, and `;` or spaces are not valid in a cookie value;
//! [`is_encodable`] checks for all of them.

use crate::models::oauth::AuthorizedSession;

const RESERVED: &[char] = &['|', '*', '{', '}', ',', '"', '\\', ';', ' '];

pub fn encode(session: &AuthorizedSession) -> String {
    if !is_encodable(session) {
        tracing::warn!(
            user_id = %session.user_id,
            "Session contains characters that do not survive the cookie"
        );
    }

    let fields = [
        ("id", &session.user_id),
        ("name", &session.screen_name),
        ("img", &session.screen_image),
        ("token", &session.access_token_key),
        ("secret", &session.access_token_secret),
    ];
    let body = fields
        .iter()
        .map(|(key, value)| format!("{key}:{}", value.replace(':', "*")))
        .collect::<Vec<_>>()
        .join("|");

    format!("{{{body}}}")
}

/// Returns `None` for anything that does not parse back into a session.
pub fn decode(value: &str) -> Option<AuthorizedSession> {
    let json = value
        .replace(':', "\":\"")
        .replace('|', ",")
        .replace(',', "\",\"")
        .replace('{', "{\"")
        .replace('}', "\"}")
        .replace('*', ":");

    match serde_json::from_str::<AuthorizedSession>(&json) {
        Ok(session) => Some(session),
        Err(e) => {
            tracing::warn!(error = %e, "Could not decode session cookie");
            None
        }
    }
}

pub fn is_encodable(session: &AuthorizedSession) -> bool {
    [
        &session.user_id,
        &session.screen_name,
        &session.screen_image,
        &session.access_token_key,
        &session.access_token_secret,
    ]
    .iter()
    .all(|value| !value.contains(RESERVED) && !value.chars().any(char::is_control))
}
