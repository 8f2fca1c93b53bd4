use std::sync::Arc;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use tokio::io::AsyncReadExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;

use super::error::StorageError;
use super::limit::LimitedReader;
use super::traits::{BlobStore, BoxReader};

/// S3 requires every part except the last to be at least 5 MiB.
const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Connection settings for the S3-compatible backend.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// Custom endpoint for S3-compatible stores; forces path-style access.
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub force_path_style: bool,
    /// Upload/download ceiling. Default: 1 GiB.
    pub max_size_bytes: u64,
    /// Multipart chunk size. Default: 8 MiB, clamped to the S3 minimum.
    pub part_size_bytes: u64,
    /// Concurrent in-flight parts per upload. Default: 4.
    pub upload_concurrency: usize,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: "us-east-1".into(),
            bucket: String::new(),
            access_key: None,
            secret_key: None,
            force_path_style: false,
            max_size_bytes: 1 << 30,
            part_size_bytes: 8 * 1024 * 1024,
            upload_concurrency: 4,
        }
    }
}

/// Blob store backed by an S3-compatible object service.
pub struct S3BlobStore {
    client: Client,
    bucket: String,
    max_size: u64,
    part_size: u64,
    concurrency: usize,
}

impl S3BlobStore {
    pub async fn new(cfg: S3Config) -> Result<Self, StorageError> {
        let bucket = cfg.bucket.trim().to_string();
        if bucket.is_empty() {
            return Err(StorageError::Upstream("bucket name is required".into()));
        }

        let region = if cfg.region.trim().is_empty() {
            "us-east-1".to_string()
        } else {
            cfg.region.trim().to_string()
        };

        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region));
        if let (Some(access_key), Some(secret_key)) = (&cfg.access_key, &cfg.secret_key) {
            loader = loader.credentials_provider(Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                None,
                None,
                "static",
            ));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(cfg.force_path_style || cfg.endpoint.is_some());
        if let Some(endpoint) = &cfg.endpoint {
            builder = builder.endpoint_url(endpoint.clone());
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket,
            max_size: if cfg.max_size_bytes == 0 {
                1 << 30
            } else {
                cfg.max_size_bytes
            },
            part_size: cfg.part_size_bytes.max(MIN_PART_SIZE),
            concurrency: cfg.upload_concurrency.max(1),
        })
    }

    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        first: Vec<u8>,
        mut content: BoxReader,
    ) -> Result<Vec<CompletedPart>, StorageError> {
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut in_flight: JoinSet<Result<CompletedPart, StorageError>> = JoinSet::new();

        let mut part_number = 1i32;
        let mut total = first.len() as u64;
        let mut chunk = first;

        while !chunk.is_empty() {
            let permit = permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| StorageError::Upstream("upload semaphore closed".into()))?;
            let client = self.client.clone();
            let bucket = self.bucket.clone();
            let key = key.to_string();
            let upload_id = upload_id.to_string();
            let number = part_number;
            let body = chunk;

            in_flight.spawn(async move {
                let _permit = permit;
                let out = client
                    .upload_part()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(upload_id)
                    .part_number(number)
                    .body(ByteStream::from(body))
                    .send()
                    .await
                    .map_err(|e| StorageError::Upstream(e.to_string()))?;
                Ok(CompletedPart::builder()
                    .set_e_tag(out.e_tag().map(str::to_string))
                    .part_number(number)
                    .build())
            });

            part_number += 1;
            chunk = read_part(&mut content, self.part_size).await?;
            total += chunk.len() as u64;
            if total > self.max_size {
                in_flight.abort_all();
                return Err(StorageError::SizeLimitExceeded {
                    limit: self.max_size,
                });
            }
        }

        let mut parts = Vec::with_capacity(part_number as usize - 1);
        while let Some(joined) = in_flight.join_next().await {
            let part =
                joined.map_err(|e| StorageError::Upstream(format!("upload task failed: {e}")))??;
            parts.push(part);
        }
        parts.sort_by_key(|p| p.part_number().unwrap_or(0));
        Ok(parts)
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn save(
        &self,
        key: &str,
        mut content: BoxReader,
        size: Option<u64>,
    ) -> Result<(), StorageError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(StorageError::EmptyKey);
        }
        if let Some(size) = size
            && size > self.max_size
        {
            return Err(StorageError::SizeLimitExceeded {
                limit: self.max_size,
            });
        }

        let first = read_part(&mut content, self.part_size).await?;
        if first.len() as u64 > self.max_size {
            return Err(StorageError::SizeLimitExceeded {
                limit: self.max_size,
            });
        }

        // A stream that ends within the first part goes up in one request.
        if (first.len() as u64) < self.part_size {
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .body(ByteStream::from(first))
                .send()
                .await
                .map_err(|e| StorageError::Upstream(e.to_string()))?;
            return Ok(());
        }

        let upload = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::Upstream(e.to_string()))?;
        let upload_id = upload
            .upload_id()
            .ok_or_else(|| StorageError::Upstream("multipart upload id missing".into()))?
            .to_string();

        match self.upload_parts(key, &upload_id, first, content).await {
            Ok(parts) => {
                self.client
                    .complete_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .multipart_upload(
                        CompletedMultipartUpload::builder()
                            .set_parts(Some(parts))
                            .build(),
                    )
                    .send()
                    .await
                    .map_err(|e| StorageError::Upstream(e.to_string()))?;
                Ok(())
            }
            Err(err) => {
                if let Err(abort_err) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    warn!(key, error = %abort_err, "failed to abort multipart upload");
                }
                Err(err)
            }
        }
    }

    async fn download(&self, key: &str) -> Result<(BoxReader, Option<u64>), StorageError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(StorageError::EmptyKey);
        }

        let out = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    StorageError::NotFound(key.to_string())
                } else {
                    StorageError::Upstream(e.to_string())
                }
            })?;

        let size = out.content_length().filter(|s| *s > 0).map(|s| s as u64);
        if let Some(size) = size
            && size > self.max_size
        {
            return Err(StorageError::SizeLimitExceeded {
                limit: self.max_size,
            });
        }

        let body = out.body.into_async_read();
        let reader: BoxReader = match size {
            Some(_) => Box::new(body),
            None => Box::new(LimitedReader::new(body, self.max_size)),
        };
        Ok((reader, size))
    }
}

/// Read up to `part_size` bytes, short only at end of stream.
async fn read_part(reader: &mut BoxReader, part_size: u64) -> Result<Vec<u8>, StorageError> {
    let mut buf = vec![0u8; part_size as usize];
    let mut filled = 0usize;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await.map_err(StorageError::Io)?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}
