use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Per-tenant transaction field definition. Standard fields map onto
/// transaction columns; fields flagged `is_extra` live in the transaction's
/// `extra` bag under their code.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "fields")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub code: String,
    /// Display name, used as the CSV header
    pub name: String,
    /// string, number or date
    #[sea_orm(column_name = "type")]
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub llm_prompt: Option<String>,
    #[serde(default)]
    pub options: Option<Json>,
    pub position: i32,
    pub is_visible_in_list: bool,
    pub is_visible_in_analysis: bool,
    pub is_required: bool,
    pub is_extra: bool,
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
