use serde::{Deserialize, Serialize};

/// Credentials and profile of a browser that completed the handshake.
///
/// Held only by the browser, inside the session cookie.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct AuthorizedSession {
    #[serde(rename = "id")]
    pub user_id: String,
    #[serde(rename = "name")]
    pub screen_name: String,
    #[serde(rename = "img")]
    pub screen_image: String,
    #[serde(rename = "token")]
    pub access_token_key: String,
    #[serde(rename = "secret")]
    pub access_token_secret: String,
}

impl AuthorizedSession {
    pub fn is_authorized(&self) -> bool {
        !self.access_token_key.is_empty()
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct CallbackParams {
    pub oauth_token: Option<String>,
    pub oauth_verifier: Option<String>,
    pub denied: Option<String>,
}

impl CallbackParams {
    pub fn is_denied(&self) -> bool {
        self.denied.as_deref().is_some_and(|d| !d.is_empty())
    }
}
