use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// External chat identity the RPC surface addresses users by.
    #[sea_orm(unique)]
    pub chat_id: String,
    pub username: Option<String>,

    #[sea_orm(has_many)]
    pub tokens: HasMany<super::token::Entity>,

    #[sea_orm(has_many)]
    pub notifications: HasMany<super::notification::Entity>,

    #[sea_orm(has_many)]
    pub editor_sessions: HasMany<super::editor_session::Entity>,

    #[sea_orm(has_many)]
    pub commits: HasMany<super::commit::Entity>,

    #[sea_orm(has_many, via = "user_repo")]
    pub repos: HasMany<super::repo::Entity>,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
