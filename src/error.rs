//! Error types and their HTTP mapping.
//!
//! Clients get a status code and a generic plain-text message. The cause only
//! goes to the log.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{error, warn};

/// Anything that went wrong talking to the reading store.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Bad configuration detected at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors surfaced by the HTTP handlers.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Malformed client input. 400, the message is the response body.
    #[error("{0}")]
    Validation(String),

    /// Storage failed. 500, with `message` as the body.
    #[error("{message}: {source}")]
    Storage {
        message: &'static str,
        #[source]
        source: StorageError,
    },

    /// Response encoding failed. 500.
    #[error("error encoding response: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ApiError {
    pub fn storage(message: &'static str, source: StorageError) -> Self {
        Self::Storage { message, source }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Storage { .. } | ApiError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match &self {
            ApiError::Validation(message) => {
                warn!("Rejected request: {}", message);
                message.as_str()
            }
            ApiError::Storage { message, source } => {
                error!("{}: {}", message, source);
                *message
            }
            ApiError::Serialization(e) => {
                error!("Error encoding response: {}", e);
                "Error encoding response"
            }
        };
        (self.status(), body.to_string()).into_response()
    }
}
