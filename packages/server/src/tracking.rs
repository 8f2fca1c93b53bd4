use std::sync::Arc;

use store::{Store, StoreError};
use tracing::{info, warn};

use crate::error::ServiceError;
use crate::source_host::{SourceHost, SourceHostError};

/// Admin surface for `(user, repo)` tracking records (C9).
#[derive(Clone)]
pub struct TrackingService {
    store: Arc<dyn Store>,
    source_host: Arc<dyn SourceHost>,
}

impl TrackingService {
    pub fn new(store: Arc<dyn Store>, source_host: Arc<dyn SourceHost>) -> Self {
        Self { store, source_host }
    }

    /// Validate the repository against the source host, then upsert the
    /// tracking record to enabled.
    pub async fn add(&self, chat_id: &str, link: &str) -> Result<(), ServiceError> {
        // A missing token row is an internal failure here, not a permission
        // problem; only the source host's rejection of the credential maps
        // to permission denied.
        let token = self
            .store
            .get_user_token(chat_id)
            .await
            .map_err(|e| match e {
                StoreError::UserNotFound => ServiceError::UserNotFound,
                other => ServiceError::Internal(other.to_string()),
            })?;

        let exists = self
            .source_host
            .repo_exists(&token, link)
            .await
            .map_err(|e| match e {
                SourceHostError::InvalidToken => ServiceError::InvalidToken,
                other => ServiceError::from(other),
            })?;
        if !exists {
            warn!(chat_id, link, "repository not found on source host");
            return Err(ServiceError::RepoNotFound);
        }

        self.store.add_tracking(chat_id, link).await?;
        info!(chat_id, link, "tracking added");
        Ok(())
    }

    pub async fn remove(&self, chat_id: &str, link: &str) -> Result<(), ServiceError> {
        self.store.remove_tracking(chat_id, link).await?;
        info!(chat_id, link, "tracking removed");
        Ok(())
    }
}
