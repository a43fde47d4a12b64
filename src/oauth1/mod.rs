//! OAuth 1.0a client for the identity provider.

pub mod signature;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::Deserialize;

use signature::Signer;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider responded with HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Malformed provider response: {0}")]
    Malformed(String),
}

/// Temporary credentials issued by the provider for one handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestToken {
    pub token: String,
    pub secret: String,
}

/// Token credentials plus the account they belong to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AccessToken {
    pub token: String,
    pub secret: String,
    pub user_id: String,
    pub screen_name: String,
}

/// The provider side of the three-legged handshake.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    async fn request_token(&self) -> Result<RequestToken, ProviderError>;

    /// Where to send the browser so the user can approve `token`.
    fn authorize_url(&self, token: &RequestToken) -> Result<String, ProviderError>;

    async fn access_token(
        &self,
        token: &RequestToken,
        verifier: &str,
    ) -> Result<AccessToken, ProviderError>;

    /// Profile image URL of `screen_name`, fetched with the user's own token.
    async fn profile_image(
        &self,
        access: &AccessToken,
        screen_name: &str,
    ) -> Result<String, ProviderError>;
}

#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    pub request_token_url: String,
    pub authorize_url: String,
    pub access_token_url: String,
    pub profile_url: String,
}

pub struct TwitterClient {
    http: reqwest::Client,
    signer: Signer,
    callback_url: String,
    endpoints: ProviderEndpoints,
}

impl TwitterClient {
    pub fn new(
        http: reqwest::Client,
        consumer_key: String,
        consumer_secret: String,
        callback_url: String,
        endpoints: ProviderEndpoints,
    ) -> Self {
        Self {
            http,
            signer: Signer::new(consumer_key, consumer_secret),
            callback_url,
            endpoints,
        }
    }

    async fn post_signed(
        &self,
        url: &str,
        token: Option<(&str, &str)>,
        extra: &[(&str, &str)],
    ) -> Result<std::collections::HashMap<String, String>, ProviderError> {
        let authorization = self.signer.authorization("POST", url, &[], token, extra)?;
        let response = self
            .http
            .post(url)
            .header(AUTHORIZATION, authorization)
            .send()
            .await?;

        let body = read_success(response).await?;
        Ok(signature::parse_form(&body))
    }
}

async fn read_success(response: reqwest::Response) -> Result<String, ProviderError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ProviderError::Status { status, body });
    }
    Ok(body)
}

fn required(
    values: &mut std::collections::HashMap<String, String>,
    key: &str,
) -> Result<String, ProviderError> {
    values
        .remove(key)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ProviderError::Malformed(format!("missing {key}")))
}

#[async_trait]
impl OAuthProvider for TwitterClient {
    async fn request_token(&self) -> Result<RequestToken, ProviderError> {
        let mut values = self
            .post_signed(
                &self.endpoints.request_token_url,
                None,
                &[("oauth_callback", self.callback_url.as_str())],
            )
            .await?;

        if values
            .get("oauth_callback_confirmed")
            .is_some_and(|confirmed| confirmed != "true")
        {
            return Err(ProviderError::Malformed("callback not confirmed".into()));
        }

        Ok(RequestToken {
            token: required(&mut values, "oauth_token")?,
            secret: required(&mut values, "oauth_token_secret")?,
        })
    }

    fn authorize_url(&self, token: &RequestToken) -> Result<String, ProviderError> {
        let mut url = reqwest::Url::parse(&self.endpoints.authorize_url)
            .map_err(|e| ProviderError::Malformed(format!("authorize URL: {e}")))?;
        url.query_pairs_mut().append_pair("oauth_token", &token.token);
        Ok(url.to_string())
    }

    async fn access_token(
        &self,
        token: &RequestToken,
        verifier: &str,
    ) -> Result<AccessToken, ProviderError> {
        let mut values = self
            .post_signed(
                &self.endpoints.access_token_url,
                Some((&token.token, &token.secret)),
                &[("oauth_verifier", verifier)],
            )
            .await?;

        Ok(AccessToken {
            token: required(&mut values, "oauth_token")?,
            secret: required(&mut values, "oauth_token_secret")?,
            user_id: values.remove("user_id").unwrap_or_default(),
            screen_name: values.remove("screen_name").unwrap_or_default(),
        })
    }

    async fn profile_image(
        &self,
        access: &AccessToken,
        screen_name: &str,
    ) -> Result<String, ProviderError> {
        let query = vec![("screen_name".to_string(), screen_name.to_string())];
        let authorization = self.signer.authorization(
            "GET",
            &self.endpoints.profile_url,
            &query,
            Some((&access.token, &access.secret)),
            &[],
        )?;

        let mut url = reqwest::Url::parse(&self.endpoints.profile_url)
            .map_err(|e| ProviderError::Malformed(format!("profile URL: {e}")))?;
        url.query_pairs_mut().append_pair("screen_name", screen_name);

        let response = self
            .http
            .get(url)
            .header(AUTHORIZATION, authorization)
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        let body = read_success(response).await?;

        #[derive(Deserialize)]
        struct Profile {
            profile_image_url: String,
        }

        let profile: Profile =
            serde_json::from_str(&body).map_err(|e| ProviderError::Malformed(e.to_string()))?;
        Ok(profile.profile_image_url)
    }
}
