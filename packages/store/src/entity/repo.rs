use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "repo")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Canonical URL; lookups tolerate a trailing `.git`.
    #[sea_orm(unique)]
    pub url: String,
    pub owner: Option<String>,
    pub name: Option<String>,

    #[sea_orm(has_many)]
    pub files: HasMany<super::file::Entity>,

    #[sea_orm(has_many)]
    pub commits: HasMany<super::commit::Entity>,

    #[sea_orm(has_many)]
    pub notifications: HasMany<super::notification::Entity>,

    #[sea_orm(has_many, via = "user_repo")]
    pub users: HasMany<super::user::Entity>,

    pub added_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
