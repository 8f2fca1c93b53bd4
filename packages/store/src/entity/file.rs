use sea_orm::entity::prelude::*;
use sea_orm::prelude::StringLen;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a tracked file relative to its repository.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    sea_orm::DeriveActiveEnum,
    sea_orm::EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileState {
    #[sea_orm(string_value = "ADDED")]
    Added,
    #[sea_orm(string_value = "MODIFIED")]
    Modified,
    #[sea_orm(string_value = "DELETED")]
    Deleted,
}

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "file")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// One row per `(repo_id, path)`; the store resolves-or-inserts inside
    /// the session-creating transaction.
    pub repo_id: i32,
    pub path: String,
    pub state: FileState,

    /// Blob key of the last persisted edit; reused on subsequent saves.
    pub storage_key: Option<String>,

    #[sea_orm(belongs_to, from = "repo_id", to = "id")]
    pub repo: HasOne<super::repo::Entity>,

    #[sea_orm(has_many)]
    pub editor_sessions: HasMany<super::editor_session::Entity>,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
