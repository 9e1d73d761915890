//! Unified error types for the signal hub.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum HubError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("store unavailable: {0}")]
    Connection(String),

    #[error("database error: {0}")]
    Persistence(#[source] sqlx::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

pub type Result<T> = std::result::Result<T, HubError>;

impl From<sqlx::Error> for HubError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                HubError::Connection(e.to_string())
            }
            other => HubError::Persistence(other),
        }
    }
}

impl HubError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            HubError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            HubError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Text safe to show a caller. Server-side details stay in the log.
    pub fn public_message(&self) -> String {
        match self {
            HubError::InvalidInput(_) | HubError::NotFound(_) => self.to_string(),
            HubError::Connection(_) => "store unavailable".into(),
            _ => "internal server error".into(),
        }
    }
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}
