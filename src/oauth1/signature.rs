//! OAuth 1.0a request signing (HMAC-SHA1, RFC 5849 section 3.4).

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::{Engine, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use rand::{Rng, distr::Alphanumeric};
use sha1::Sha1;

use super::ProviderError;

type HmacSha1 = Hmac<Sha1>;

/// RFC 3986 percent-encoding: everything but `A-Z a-z 0-9 - . _ ~`.
pub fn percent_encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

pub fn base_string(method: &str, url: &str, params: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .collect();
    encoded.sort();

    let normalized = encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        percent_encode(url),
        percent_encode(&normalized)
    )
}

pub fn sign(base: &str, consumer_secret: &str, token_secret: &str) -> Result<String, ProviderError> {
    let key = format!("{}&{}", percent_encode(consumer_secret), percent_encode(token_secret));
    let mut mac = HmacSha1::new_from_slice(key.as_bytes())
        .map_err(|e| ProviderError::Malformed(format!("signing key: {e}")))?;
    mac.update(base.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Consumer credentials that sign every outbound provider request.
#[derive(Clone)]
pub struct Signer {
    consumer_key: String,
    consumer_secret: String,
}

impl Signer {
    pub fn new(consumer_key: String, consumer_secret: String) -> Self {
        Self {
            consumer_key,
            consumer_secret,
        }
    }

    /// Builds the `Authorization` header value for a request.
    ///
    /// `query` holds the request's own parameters, which are signed but not
    /// repeated in the header. `extra` holds protocol parameters such as
    /// `oauth_callback` or `oauth_verifier`.
    pub fn authorization(
        &self,
        method: &str,
        url: &str,
        query: &[(String, String)],
        token: Option<(&str, &str)>,
        extra: &[(&str, &str)],
    ) -> Result<String, ProviderError> {
        self.authorization_with(method, url, query, token, extra, &nonce(), timestamp())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn authorization_with(
        &self,
        method: &str,
        url: &str,
        query: &[(String, String)],
        token: Option<(&str, &str)>,
        extra: &[(&str, &str)],
        nonce: &str,
        timestamp: u64,
    ) -> Result<String, ProviderError> {
        let mut oauth: Vec<(String, String)> = vec![
            ("oauth_consumer_key".into(), self.consumer_key.clone()),
            ("oauth_nonce".into(), nonce.to_string()),
            ("oauth_signature_method".into(), "HMAC-SHA1".into()),
            ("oauth_timestamp".into(), timestamp.to_string()),
            ("oauth_version".into(), "1.0".into()),
        ];
        if let Some((token, _)) = token {
            oauth.push(("oauth_token".into(), token.to_string()));
        }
        oauth.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));

        let mut signed = oauth.clone();
        signed.extend(query.iter().cloned());

        let base = base_string(method, url, &signed);
        let token_secret = token.map(|(_, secret)| secret).unwrap_or_default();
        let signature = sign(&base, &self.consumer_secret, token_secret)?;

        oauth.push(("oauth_signature".into(), signature));
        oauth.sort();

        let fields = oauth
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", percent_encode(k), percent_encode(v)))
            .collect::<Vec<_>>()
            .join(", ");

        Ok(format!("OAuth {fields}"))
    }
}

fn nonce() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

fn timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Parses an `application/x-www-form-urlencoded` provider response.
pub fn parse_form(body: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(body.trim().as_bytes())
        .into_owned()
        .collect()
}
