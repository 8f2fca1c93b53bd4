use std::fmt;

/// Errors that can occur during blob storage operations.
#[derive(Debug)]
pub enum StorageError {
    /// The storage key is empty or whitespace-only.
    EmptyKey,
    /// The requested blob was not found.
    NotFound(String),
    /// The blob exceeds the configured size ceiling.
    SizeLimitExceeded { limit: u64 },
    /// An I/O error occurred while streaming.
    Io(std::io::Error),
    /// The storage backend rejected the request.
    Upstream(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyKey => write!(f, "storage key is empty"),
            Self::NotFound(key) => write!(f, "blob not found: {key}"),
            Self::SizeLimitExceeded { limit } => {
                write!(f, "blob exceeds size limit ({limit} bytes)")
            }
            Self::Io(err) => write!(f, "storage IO error: {err}"),
            Self::Upstream(msg) => write!(f, "storage backend error: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}
