use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Tracking record: one `(user, repo)` pair with an enablement flag and a
/// cursor into already-seen history. Disabled rows are kept for audit and
/// skipped by the poller.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notification")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub user_id: i32,
    pub repo_id: i32,
    pub last_commit: Option<i64>,
    pub enabled: bool,

    #[sea_orm(belongs_to, from = "user_id", to = "id")]
    pub user: HasOne<super::user::Entity>,

    #[sea_orm(belongs_to, from = "repo_id", to = "id")]
    pub repo: HasOne<super::repo::Entity>,

    #[sea_orm(belongs_to, from = "last_commit", to = "id")]
    pub cursor_commit: Option<super::commit::Entity>,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
