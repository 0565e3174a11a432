//! Error taxonomy surfaced to HTTP callers.
//!
//! Only request-fatal failures live here. Delivery-phase failures (live
//! fan-out, push dispatch) are logged where they happen and never become a
//! `ChatError`.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    /// Referenced user or message does not exist. No state was mutated.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Request is missing a field its message type requires.
    #[error("{0}")]
    Validation(String),

    /// Persistence layer unavailable. Safe to retry.
    #[error("storage unavailable: {0}")]
    Storage(String),

    #[error("could not issue access token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

impl ChatError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Token(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<rusqlite::Error> for ChatError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ChatError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Storage(format!("database task failed: {}", err))
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::Storage(reason) => {
                tracing::error!(error = %reason, "storage failure while handling request")
            }
            Self::Token(e) => tracing::error!(error = %e, "failed to sign access token"),
            _ => {}
        }

        let body = Json(json!({
            "status": false,
            "message": self.to_string(),
        }));

        if status == StatusCode::SERVICE_UNAVAILABLE {
            (status, [(header::RETRY_AFTER, "1")], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}
