use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::StorageError;
use serde::Serialize;
use store::StoreError;
use thiserror::Error;

use crate::source_host::SourceHostError;
use crate::workspace::WorkspaceError;

/// Reason code attached to tracking lookups that miss the user row.
pub const USER_NOT_FOUND_REASON: &str = "USER_NOT_FOUND_REASON";
/// Reason code attached to tracking lookups that miss the repository.
pub const REPO_NOT_FOUND_REASON: &str = "REPO_NOT_FOUND_REASON";

/// Service-level error union shared by the editor and tracking cores.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("user not found")]
    UserNotFound,

    #[error("token not found")]
    TokenNotFound,

    #[error("session not found")]
    SessionNotFound,

    #[error("repository not found")]
    RepoNotFound,

    #[error("invalid token")]
    InvalidToken,

    #[error("file exceeds size limit")]
    SizeLimitExceeded,

    #[error("upstream unavailable: {0}")]
    Upstream(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UserNotFound => Self::UserNotFound,
            StoreError::TokenNotFound => Self::TokenNotFound,
            StoreError::SessionNotFound => Self::SessionNotFound,
            StoreError::RepoNotFound => Self::RepoNotFound,
            StoreError::InvalidArgument(msg) => Self::InvalidRequest(msg),
            StoreError::Db(err) => Self::Internal(err.to_string()),
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::EmptyKey => Self::InvalidRequest("storage key is empty".into()),
            StorageError::NotFound(key) => Self::InvalidRequest(format!("blob not found: {key}")),
            StorageError::SizeLimitExceeded { .. } => Self::SizeLimitExceeded,
            StorageError::Io(err) if common::storage::is_size_limit(&err) => {
                Self::SizeLimitExceeded
            }
            StorageError::Io(err) => Self::Upstream(err.to_string()),
            StorageError::Upstream(msg) => Self::Upstream(msg),
        }
    }
}

impl From<WorkspaceError> for ServiceError {
    fn from(err: WorkspaceError) -> Self {
        Self::Upstream(err.to_string())
    }
}

impl From<SourceHostError> for ServiceError {
    fn from(err: SourceHostError) -> Self {
        match err {
            SourceHostError::InvalidToken => Self::InvalidToken,
            SourceHostError::InvalidLink(msg) => Self::InvalidRequest(msg),
            SourceHostError::Http(msg) => Self::Upstream(msg),
        }
    }
}

/// Structured error response body.
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    /// Machine-readable reason code.
    #[schema(example = "USER_NOT_FOUND_REASON")]
    pub code: &'static str,
    /// Human-readable detail.
    pub message: String,
}

/// RPC-edge error type. Canonical statuses ride HTTP: invalid argument is
/// 400, permission denied 403, not found 404, everything else 500.
#[derive(Debug)]
pub enum AppError {
    Validation(String),
    NotFound { code: &'static str, message: String },
    PermissionDenied(String),
    Internal(String),
}

impl AppError {
    fn status_and_body(self) -> (StatusCode, ErrorBody) {
        match self {
            AppError::Validation(message) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    code: "INVALID_ARGUMENT",
                    message,
                },
            ),
            AppError::NotFound { code, message } => {
                (StatusCode::NOT_FOUND, ErrorBody { code, message })
            }
            AppError::PermissionDenied(message) => (
                StatusCode::FORBIDDEN,
                ErrorBody {
                    code: "PERMISSION_DENIED",
                    message,
                },
            ),
            AppError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        code: "INTERNAL_ERROR",
                        message: "An unexpected error occurred".into(),
                    },
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        (status, Json(body)).into_response()
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidRequest(msg) => AppError::Validation(msg),
            ServiceError::SizeLimitExceeded => {
                AppError::Validation("file exceeds size limit".into())
            }
            ServiceError::UserNotFound => AppError::NotFound {
                code: USER_NOT_FOUND_REASON,
                message: "user not found".into(),
            },
            ServiceError::RepoNotFound => AppError::NotFound {
                code: REPO_NOT_FOUND_REASON,
                message: "repository not found".into(),
            },
            ServiceError::SessionNotFound => AppError::NotFound {
                code: "SESSION_NOT_FOUND",
                message: "session not found".into(),
            },
            ServiceError::TokenNotFound => AppError::PermissionDenied("token not found".into()),
            ServiceError::InvalidToken => AppError::PermissionDenied("invalid token".into()),
            ServiceError::Upstream(detail) | ServiceError::Internal(detail) => {
                AppError::Internal(detail)
            }
        }
    }
}
