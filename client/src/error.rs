//! Unified error handling for the client.

use crate::config::ConfigError;
use serde::Deserialize;
use tether_engine::BackendError;

/// Client error type.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// The server answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("Authentication failed: {0}")]
    Auth(String),
}

/// Error body returned by the API.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
}

impl ClientError {
    /// Build an API error from a status and raw response body.
    pub fn from_response(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<ApiErrorBody>(body)
            .map(|b| b.message)
            .ok()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| body.to_string());
        ClientError::Api { status, message }
    }
}

impl From<ClientError> for BackendError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Api {
                status: 404,
                message,
            } => BackendError::NotFound(message),
            ClientError::Api { status, message } => BackendError::Status { status, message },
            ClientError::Auth(message) => BackendError::Status {
                status: 401,
                message,
            },
            ClientError::Decode(message) => BackendError::Decode(message),
            ClientError::Http(e) if e.is_decode() => BackendError::Decode(e.to_string()),
            ClientError::Http(e) => BackendError::Transport(e.to_string()),
            ClientError::Config(e) => BackendError::Transport(e.to_string()),
        }
    }
}

/// Result type alias for client calls.
pub type Result<T> = std::result::Result<T, ClientError>;
