use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Application-level user record, owned by the user service.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct User {
    pub id: String,
    pub name: String,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}

/// Lookup and persistence of user records.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Returns `None` when the service has no record for `id`.
    async fn get_user(&self, id: &str) -> Result<Option<User>, AppError>;

    async fn save_user(&self, user: &User) -> Result<(), AppError>;
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ApiHeader {
    status: String,
    message: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct DaoUser {
    header: ApiHeader,
    response: User,
}

impl DaoUser {
    fn is_success_for(&self, id: &str) -> bool {
        self.header.status == "success" && self.response.id == id
    }
}

/// [`UserDirectory`] backed by the user service's `/users/` resource.
pub struct HttpUserDirectory {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpUserDirectory {
    pub fn new(client: reqwest::Client, endpoint: String) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }

    async fn read_envelope(response: reqwest::Response) -> Result<DaoUser, AppError> {
        response.json::<DaoUser>().await.map_err(|e| {
            tracing::error!(error = %e, "Could not decode user service response");
            AppError::Transport(format!("Could not decode user service response: {e}"))
        })
    }
}

#[async_trait]
impl UserDirectory for HttpUserDirectory {
    async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        let url = format!("{}/users/{}", self.endpoint, id);
        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| AppError::Transport(format!("User service request failed: {e}")))?;

        let dao = Self::read_envelope(response).await?;
        if dao.is_success_for(id) {
            Ok(Some(dao.response))
        } else {
            Ok(None)
        }
    }

    async fn save_user(&self, user: &User) -> Result<(), AppError> {
        let url = format!("{}/users/", self.endpoint);
        let response = self
            .client
            .post(&url)
            .header(ACCEPT, "application/json")
            .json(user)
            .send()
            .await
            .map_err(|e| AppError::Transport(format!("User service request failed: {e}")))?;

        let dao = Self::read_envelope(response).await?;
        if dao.is_success_for(&user.id) {
            Ok(())
        } else {
            Err(AppError::Transport(dao.header.message))
        }
    }
}
