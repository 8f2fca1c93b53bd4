use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Visibility link between a user and a repository. Tracking enablement
/// lives on `notification`, not here.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user_repo")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: i32,

    #[sea_orm(primary_key, auto_increment = false)]
    pub repo_id: i32,

    #[sea_orm(belongs_to, from = "user_id", to = "id")]
    pub user: HasOne<super::user::Entity>,

    #[sea_orm(belongs_to, from = "repo_id", to = "id")]
    pub repo: HasOne<super::repo::Entity>,

    pub added_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
