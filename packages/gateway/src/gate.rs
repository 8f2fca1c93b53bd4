use async_trait::async_trait;
use chrono::{DateTime, Utc};
use store::{SeaStore, SessionRecord, Store, StoreError};

/// The narrow store view the gateway needs: token lookup and the
/// best-effort set-once consume.
#[async_trait]
pub trait SessionGate: Send + Sync {
    async fn get_session_by_token(&self, token: &str) -> Result<SessionRecord, StoreError>;
    async fn mark_session_consumed(&self, id: i64, at: DateTime<Utc>) -> Result<(), StoreError>;
}

#[async_trait]
impl SessionGate for SeaStore {
    async fn get_session_by_token(&self, token: &str) -> Result<SessionRecord, StoreError> {
        Store::get_session_by_token(self, token).await
    }

    async fn mark_session_consumed(&self, id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        Store::mark_session_consumed(self, id, at).await
    }
}
