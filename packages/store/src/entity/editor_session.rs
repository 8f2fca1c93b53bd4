use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One single-use authorization to edit one file in an ephemeral workspace.
///
/// State progression is `created -> (consumed?) -> saved -> expired`;
/// `consumed_at` and `saved_at` are set-once. A session may be saved
/// without ever being consumed, and consumed without being saved yet.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "editor_session")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub file_id: i32,
    pub workspace_id: String,
    pub session_url: String,

    #[sea_orm(unique)]
    pub one_time_token: Option<String>,

    pub for_user: Option<i32>,
    pub branch: Option<String>,

    #[sea_orm(belongs_to, from = "file_id", to = "id")]
    pub file: HasOne<super::file::Entity>,

    #[sea_orm(belongs_to, from = "for_user", to = "id")]
    pub user: Option<super::user::Entity>,

    pub created_at: DateTimeUtc,
    pub expires_at: Option<DateTimeUtc>,
    pub consumed_at: Option<DateTimeUtc>,
    pub saved_at: Option<DateTimeUtc>,
}

impl ActiveModelBehavior for ActiveModel {}
