use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::user::{HttpUserDirectory, UserDirectory};
use crate::oauth1::{OAuthProvider, ProviderEndpoints, TwitterClient};
use crate::session::pending::PendingExchangeStore;

const DEFAULT_CONFIG_FILE: &str = "/etc/authentication-server/config.json";

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AppConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub access_log: bool,
    pub cors_methods: String,
    pub cors_origin: String,
    pub secured_cookie: bool,
    pub twitter_key: String,
    pub twitter_secret: String,
    pub twitter_callback: String,
    pub request_token_url: String,
    pub authorize_url: String,
    pub access_token_url: String,
    pub profile_url: String,
    pub user_service_url: String,
    pub app_root_url: String,
    pub login_redirect_url: String,
    pub logout_redirect_url: String,
    pub request_timeout_secs: u64,
    pub pending_ttl_secs: u64,
    pub pending_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "Authentication".into(),
            host: "0.0.0.0".into(),
            port: 80,
            log_level: "info".into(),
            access_log: true,
            cors_methods: String::new(),
            cors_origin: "*".into(),
            secured_cookie: false,
            twitter_key: String::new(),
            twitter_secret: String::new(),
            twitter_callback: String::new(),
            request_token_url: "https://api.twitter.com/oauth/request_token".into(),
            authorize_url: "https://api.twitter.com/oauth/authorize".into(),
            access_token_url: "https://api.twitter.com/oauth/access_token".into(),
            profile_url: "https://api.twitter.com/1.1/users/show.json".into(),
            user_service_url: "http://dbio".into(),
            app_root_url: "/".into(),
            login_redirect_url: "/auth/login?id=".into(),
            logout_redirect_url: "/auth/logout".into(),
            request_timeout_secs: 300,
            pending_ttl_secs: 15 * 60,
            pending_capacity: 10_000,
        }
    }
}

impl AppConfig {
    /// Defaults, then the JSON config file, then `APP_*` environment variables.
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let path = std::env::var("CONFIG_FILE_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.into());
        Self::from_figment(Self::figment(&path))
    }

    pub fn figment(config_file: &str) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Json::file(config_file))
            .merge(Env::prefixed("APP_").map(|key| env_key(key.as_str()).into()))
    }

    pub fn from_figment(figment: Figment) -> Result<Self, AppError> {
        let mut config: AppConfig = figment.extract()?;
        config.trim_whitespace();
        Ok(config)
    }

    fn trim_whitespace(&mut self) {
        for field in [
            &mut self.name,
            &mut self.host,
            &mut self.cors_methods,
            &mut self.cors_origin,
            &mut self.twitter_key,
            &mut self.twitter_secret,
            &mut self.twitter_callback,
            &mut self.user_service_url,
        ] {
            let trimmed = field.trim();
            if trimmed.len() != field.len() {
                *field = trimmed.to_string();
            }
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// Environment names kept from the deployment manifests.
fn env_key(key: &str) -> String {
    let key = key.to_ascii_lowercase();
    match key.as_str() {
        "twitter_consumer_key" => "twitter_key".into(),
        "twitter_consumer_secret" => "twitter_secret".into(),
        "twitter_consumer_callback" => "twitter_callback".into(),
        "access_control_allow_methods" => "cors_methods".into(),
        "access_control_allow_origin" => "cors_origin".into(),
        _ => key,
    }
}

impl fmt::Display for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Name: {}, Port: {}, LogLevel: {}, AccessLog: {}, TwitterKey: {}, TwitterCallback: {}, \
             CorsMethods: {}, CorsOrigin: {}, SecuredCookie: {}",
            self.name,
            self.port,
            self.log_level,
            self.access_log,
            self.twitter_key,
            self.twitter_callback,
            self.cors_methods,
            self.cors_origin,
            self.secured_cookie
        )
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub provider: Arc<dyn OAuthProvider>,
    pub pending: Arc<PendingExchangeStore>,
    pub users: Arc<dyn UserDirectory>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let http = reqwest::Client::new();

        let provider = TwitterClient::new(
            http.clone(),
            config.twitter_key.clone(),
            config.twitter_secret.clone(),
            config.twitter_callback.clone(),
            ProviderEndpoints {
                request_token_url: config.request_token_url.clone(),
                authorize_url: config.authorize_url.clone(),
                access_token_url: config.access_token_url.clone(),
                profile_url: config.profile_url.clone(),
            },
        );
        let users = HttpUserDirectory::new(http, config.user_service_url.clone());
        let pending = PendingExchangeStore::new(
            Duration::from_secs(config.pending_ttl_secs),
            config.pending_capacity,
        );

        Self {
            config,
            provider: Arc::new(provider),
            pending: Arc::new(pending),
            users: Arc::new(users),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults_without_sources() {
        Jail::expect_with(|_jail| {
            let config = AppConfig::from_figment(AppConfig::figment("missing.json")).unwrap();
            assert_eq!(config.port, 80);
            assert!(config.access_log);
            assert_eq!(config.cors_origin, "*");
            assert_eq!(config.request_timeout(), Duration::from_secs(300));
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_file_overrides_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.json",
                r#"{ "name": "from-file", "port": 8080, "twitter_key": "file-key" }"#,
            )?;
            jail.set_env("APP_PORT", "9090");
            jail.set_env("APP_TWITTER_CONSUMER_KEY", "  env-key  ");
            jail.set_env("APP_SECURED_COOKIE", "true");

            let config = AppConfig::from_figment(AppConfig::figment("config.json")).unwrap();
            assert_eq!(config.name, "from-file");
            assert_eq!(config.port, 9090);
            assert_eq!(config.twitter_key, "env-key");
            assert!(config.secured_cookie);
            Ok(())
        });
    }

    #[test]
    fn test_legacy_cors_names() {
        Jail::expect_with(|jail| {
            jail.set_env("APP_ACCESS_CONTROL_ALLOW_ORIGIN", "https://example.com");
            jail.set_env("APP_ACCESS_CONTROL_ALLOW_METHODS", "GET, POST");

            let config = AppConfig::from_figment(AppConfig::figment("missing.json")).unwrap();
            assert_eq!(config.cors_origin, "https://example.com");
            assert_eq!(config.cors_methods, "GET, POST");
            Ok(())
        });
    }

    #[test]
    fn test_display_omits_secret() {
        let config = AppConfig {
            twitter_secret: "very-secret".into(),
            ..AppConfig::default()
        };
        assert!(!config.to_string().contains("very-secret"));
    }
}
