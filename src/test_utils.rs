//! In-memory collaborators for handler tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::error::AppError;
use crate::models::user::{User, UserDirectory};
use crate::models::{AppConfig, AppState};
use crate::oauth1::{AccessToken, OAuthProvider, ProviderError, RequestToken};
use crate::session::PendingExchangeStore;

pub const AUTHORIZE_URL: &str = "https://provider.test/oauth/authorize";

/// Provider whose access tokens are derived from the verifier:
/// verifier `v42` belongs to user `42`, screen name `user42`.
#[derive(Default)]
pub struct FakeProvider {
    pub fail_request_token: AtomicBool,
    pub fail_access_token: AtomicBool,
    pub fail_profile: AtomicBool,
    pub exchanges: AtomicUsize,
    issued: AtomicUsize,
}

impl FakeProvider {
    pub fn exchanges(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
    }
}

fn unavailable() -> ProviderError {
    ProviderError::Status {
        status: StatusCode::SERVICE_UNAVAILABLE,
        body: "Over capacity".into(),
    }
}

#[async_trait]
impl OAuthProvider for FakeProvider {
    async fn request_token(&self) -> Result<RequestToken, ProviderError> {
        if self.fail_request_token.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(RequestToken {
            token: format!("req-token-{n}"),
            secret: format!("req-secret-{n}"),
        })
    }

    fn authorize_url(&self, token: &RequestToken) -> Result<String, ProviderError> {
        Ok(format!("{AUTHORIZE_URL}?oauth_token={}", token.token))
    }

    async fn access_token(
        &self,
        _token: &RequestToken,
        verifier: &str,
    ) -> Result<AccessToken, ProviderError> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        if self.fail_access_token.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        tokio::task::yield_now().await;

        let user_id = verifier.trim_start_matches('v').to_string();
        Ok(AccessToken {
            token: format!("{user_id}-access"),
            secret: format!("{user_id}-secret"),
            screen_name: format!("user{user_id}"),
            user_id,
        })
    }

    async fn profile_image(
        &self,
        _access: &AccessToken,
        screen_name: &str,
    ) -> Result<String, ProviderError> {
        if self.fail_profile.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(format!("https://pbs.twimg.com/profile_images/{screen_name}.png"))
    }
}

#[derive(Default)]
pub struct MemoryUsers {
    pub users: Mutex<HashMap<String, User>>,
    pub fail: AtomicBool,
}

impl MemoryUsers {
    pub fn get(&self, id: &str) -> Option<User> {
        self.users.lock().unwrap().get(id).cloned()
    }
}

#[async_trait]
impl UserDirectory for MemoryUsers {
    async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::Transport("user service down".into()));
        }
        Ok(self.get(id))
    }

    async fn save_user(&self, user: &User) -> Result<(), AppError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::Transport("user service down".into()));
        }
        self.users
            .lock()
            .unwrap()
            .insert(user.id.clone(), user.clone());
        Ok(())
    }
}

pub fn test_state() -> (AppState, Arc<FakeProvider>, Arc<MemoryUsers>) {
    test_state_with(|_| {})
}

pub fn test_state_with(
    configure: impl FnOnce(&mut AppConfig),
) -> (AppState, Arc<FakeProvider>, Arc<MemoryUsers>) {
    let mut config = AppConfig {
        access_log: false,
        ..AppConfig::default()
    };
    configure(&mut config);

    let provider = Arc::new(FakeProvider::default());
    let users = Arc::new(MemoryUsers::default());
    let state = AppState {
        pending: Arc::new(PendingExchangeStore::new(
            Duration::from_secs(config.pending_ttl_secs),
            config.pending_capacity,
        )),
        config,
        provider: provider.clone(),
        users: users.clone(),
    };

    (state, provider, users)
}
