use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification endpoint is empty")]
    EmptyEndpoint,

    #[error("notification request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("notification request failed with status {0}")]
    Status(u16),
}

/// Downstream signal that an edited file reached durable storage.
#[async_trait]
pub trait FileEditNotifier: Send + Sync {
    async fn notify_file_edited(
        &self,
        file_id: i32,
        saved_at: DateTime<Utc>,
    ) -> Result<(), NotifyError>;
}

#[derive(Serialize)]
struct FileSavePayload {
    file_id: i32,
    saved_at: DateTime<Utc>,
}

/// Posts the file-edited payload as JSON to a fixed endpoint.
pub struct WebhookNotifier {
    endpoint: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, NotifyError> {
        let endpoint = endpoint.trim().to_string();
        if endpoint.is_empty() {
            return Err(NotifyError::EmptyEndpoint);
        }
        let timeout = if timeout.is_zero() {
            Duration::from_secs(5)
        } else {
            timeout
        };
        Ok(Self {
            endpoint,
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }
}

#[async_trait]
impl FileEditNotifier for WebhookNotifier {
    async fn notify_file_edited(
        &self,
        file_id: i32,
        saved_at: DateTime<Utc>,
    ) -> Result<(), NotifyError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&FileSavePayload { file_id, saved_at })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status.as_u16()));
        }
        Ok(())
    }
}
