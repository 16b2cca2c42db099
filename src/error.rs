use axum::{http::StatusCode, Json};
use thiserror::Error;

use crate::models::{ConnectionId, ErrorResponse};

/// Failures of the project store collaborator
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("project store request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("project store answered with status {0}")]
    Status(u16),

    #[error("invalid project store url: {0}")]
    Url(String),

    #[error("failed to sign service token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

/// Errors surfaced by the session registry, relay and execution gateway
#[derive(Debug, Error)]
pub enum CollabError {
    #[error("project '{0}' is unknown or not accessible")]
    RoomUnavailable(String),

    #[error("connection {0} is no longer registered")]
    StaleConnection(ConnectionId),

    #[error("execution queue is full ({queued}/{limit} queued), retry later")]
    Overloaded { queued: usize, limit: usize },

    #[error("execution request '{0}' is unknown")]
    UnknownRequest(String),

    #[error("execution request id '{0}' is already used by another submission")]
    RequestConflict(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CollabError {
    /// Short machine readable code sent in socket `error` frames
    pub fn code(&self) -> &'static str {
        match self {
            CollabError::RoomUnavailable(_) => "roomUnavailable",
            CollabError::StaleConnection(_) => "staleConnection",
            CollabError::Overloaded { .. } => "overloaded",
            CollabError::UnknownRequest(_) => "unknownRequest",
            CollabError::RequestConflict(_) => "requestConflict",
            CollabError::Store(_) => "storeError",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            CollabError::RoomUnavailable(_) => StatusCode::NOT_FOUND,
            CollabError::StaleConnection(_) => StatusCode::GONE,
            CollabError::Overloaded { .. } => StatusCode::TOO_MANY_REQUESTS,
            CollabError::UnknownRequest(_) => StatusCode::NOT_FOUND,
            CollabError::RequestConflict(_) => StatusCode::CONFLICT,
            CollabError::Store(_) => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn to_response(&self) -> (StatusCode, Json<ErrorResponse>) {
        error_response(self.status_code(), self.to_string())
    }
}

pub fn error_response(status: StatusCode, error: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (status, Json(ErrorResponse {
        code: status.as_u16(),
        status: status.to_string(),
        error: error.into(),
    }))
}
