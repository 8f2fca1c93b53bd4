mod error;
mod limit;
mod traits;

pub mod s3;

pub use error::StorageError;
pub use limit::{LimitedReader, is_size_limit};
pub use traits::{BlobStore, BoxReader};
