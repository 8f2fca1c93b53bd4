use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Upstream commit discovered by the poller. `created_at` carries the
/// committer timestamp and doubles as the tracking cursor position.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "commit")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub repo_id: i32,
    pub branch: Option<String>,

    /// Unique within a repository; enforced by the insert path.
    pub commit_hash: String,

    pub author_id: Option<i32>,

    #[sea_orm(column_type = "Text", nullable)]
    pub message: Option<String>,

    pub pushing: Option<bool>,

    #[sea_orm(belongs_to, from = "repo_id", to = "id")]
    pub repo: HasOne<super::repo::Entity>,

    #[sea_orm(belongs_to, from = "author_id", to = "id")]
    pub author: Option<super::user::Entity>,

    #[sea_orm(has_many)]
    pub notifications: HasMany<super::notification::Entity>,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
