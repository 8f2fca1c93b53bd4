use async_trait::async_trait;
use tokio::io::AsyncRead;

use super::error::StorageError;

/// Type alias for a boxed async reader.
pub type BoxReader = Box<dyn AsyncRead + Unpin + Send>;

/// Streaming blob storage keyed by an opaque string.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store the reader's bytes under `key`.
    ///
    /// `size` is the producer's hint: when known and above the configured
    /// ceiling the upload is rejected before any transfer; when unknown the
    /// stream fails mid-transfer once the ceiling is crossed.
    async fn save(
        &self,
        key: &str,
        content: BoxReader,
        size: Option<u64>,
    ) -> Result<(), StorageError>;

    /// Open a blob for reading. Returns the reader and the size when the
    /// backend reports one; unknown-size bodies are ceiling-limited.
    async fn download(&self, key: &str) -> Result<(BoxReader, Option<u64>), StorageError>;
}
