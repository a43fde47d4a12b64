use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::oauth1::ProviderError;

/// Errors surfaced by the HTTP endpoints.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Network or status failure talking to the provider or the user service.
    #[error("{0}")]
    Transport(String),

    /// Malformed callback parameters or a token that does not match the
    /// pending handshake.
    #[error("{0}")]
    Protocol(String),

    /// Temporary session with no matching pending handshake.
    #[error("Invalid session")]
    Session,

    /// The JSON envelope could not be produced.
    #[error("Envelope serialization failed: {0}")]
    Envelope(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Session => StatusCode::BAD_REQUEST,
            Self::Transport(_) | Self::Protocol(_) | Self::Envelope(_) | Self::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::warn!(error = %self, "Request rejected");
        }
        (status, self.to_string()).into_response()
    }
}

impl From<ProviderError> for AppError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Malformed(_) => Self::Protocol(e.to_string()),
            ProviderError::Http(_) | ProviderError::Status { .. } => Self::Transport(e.to_string()),
        }
    }
}

impl From<figment::Error> for AppError {
    fn from(e: figment::Error) -> Self {
        Self::Config(e.to_string())
    }
}
