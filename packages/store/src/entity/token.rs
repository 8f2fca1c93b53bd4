use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Personal access credential for the source host. A user may hold many
/// rows; the current token is the most recently created one.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "token")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub user_id: i32,

    #[sea_orm(unique)]
    pub secret: String,

    pub created_at: DateTimeUtc,
    pub last_validated_at: Option<DateTimeUtc>,

    #[sea_orm(belongs_to, from = "user_id", to = "id")]
    pub user: HasOne<super::user::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
