use thiserror::Error;

/// Store-level error kinds. Record misses are distinct from connectivity
/// failures so callers can map them to their own not-found semantics.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user not found")]
    UserNotFound,

    #[error("token not found")]
    TokenNotFound,

    #[error("session not found")]
    SessionNotFound,

    #[error("repository not found")]
    RepoNotFound,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("database error: {0}")]
    Db(#[from] sea_orm::DbErr),
}
