//! Error types for the witness service

use thiserror::Error;
use warp::http::StatusCode;

/// Coarse failure class reported to clients alongside the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Duplicate,
    Fetch,
    Verification,
    Extraction,
    Persistence,
    Dispatch,
    NotFound,
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("proof request already exists, try getting status, reqId: {id}")]
    Duplicate { id: String },

    #[error("failed to fetch signed exchange: {0}")]
    Fetch(String),

    #[error("GET {url} responded with unexpected content type {content_type:?}")]
    UnexpectedContentType { url: String, content_type: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("signed exchange verification failed: {0}")]
    Verification(String),

    #[error("{0}")]
    Extraction(String),

    #[error("failed to persist {artifact}: {source}")]
    Persistence {
        artifact: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to start prover: {0}")]
    Dispatch(String),

    #[error("{0} not found")]
    NotFound(String),
}

impl ServiceError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ServiceError::Validation(_) => ErrorCategory::Validation,
            ServiceError::Duplicate { .. } => ErrorCategory::Duplicate,
            ServiceError::Fetch(_)
            | ServiceError::UnexpectedContentType { .. }
            | ServiceError::Network(_) => ErrorCategory::Fetch,
            ServiceError::Verification(_) => ErrorCategory::Verification,
            ServiceError::Extraction(_) => ErrorCategory::Extraction,
            ServiceError::Persistence { .. } | ServiceError::Serialization(_) => {
                ErrorCategory::Persistence
            }
            ServiceError::Dispatch(_) => ErrorCategory::Dispatch,
            ServiceError::NotFound(_) => ErrorCategory::NotFound,
        }
    }

    /// HTTP status used when the error is surfaced by the API
    pub fn status_code(&self) -> StatusCode {
        match self.category() {
            ErrorCategory::Validation => StatusCode::BAD_REQUEST,
            ErrorCategory::Duplicate => StatusCode::CONFLICT,
            ErrorCategory::Fetch => StatusCode::BAD_GATEWAY,
            ErrorCategory::Verification | ErrorCategory::Extraction => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ErrorCategory::Persistence | ErrorCategory::Dispatch => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ErrorCategory::NotFound => StatusCode::NOT_FOUND,
        }
    }

    pub(crate) fn persistence(artifact: impl Into<String>, source: std::io::Error) -> Self {
        ServiceError::Persistence {
            artifact: artifact.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
