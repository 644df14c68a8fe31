use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Uploaded attachment. `path` is relative to the owner's upload root;
/// rows written by older releases may still carry an `/uploads/` prefix.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "files")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: String,
    pub filename: String,
    pub path: String,
    pub mimetype: String,
    #[serde(default)]
    pub metadata: Option<Json>,
    pub is_reviewed: bool,
    pub is_splitted: bool,
    #[serde(default)]
    pub cached_parse_result: Option<Json>,
    pub created_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id"
    )]
    Users,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Users.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
