use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BusError;

/// Author login stamped on records the system emits about itself
/// (tracking disabled, repository lost).
pub const SYSTEM_AUTHOR: &str = "system";

/// Change record delivered to a recipient's topic partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangingRecord {
    pub link: String,
    pub author: String,
    pub title: String,
    pub updated_at: DateTime<Utc>,
}

impl ChangingRecord {
    /// Record for a system notice rather than an upstream commit.
    pub fn system(link: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            link: link.into(),
            author: SYSTEM_AUTHOR.into(),
            title: title.into(),
            updated_at: Utc::now(),
        }
    }
}

/// At-least-once publisher of change records keyed by recipient chat id.
#[async_trait]
pub trait ChangeBus: Send + Sync {
    async fn publish(&self, chat_id: &str, record: &ChangingRecord) -> Result<(), BusError>;
}

/// Rewrite an API-shaped commit link into its web form.
///
/// `api.github.com/repos/` becomes `github.com/` and `/commits/` becomes
/// `/commit/`, each applied exactly once.
pub fn normalize_source_link(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    trimmed
        .replacen("api.github.com/repos/", "github.com/", 1)
        .replacen("/commits/", "/commit/", 1)
}
