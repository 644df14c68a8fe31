use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub merchant: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    /// Text recognised from the attached documents
    #[serde(default)]
    pub text: Option<String>,
    /// expense or income
    #[sea_orm(column_name = "type")]
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    /// Amount in minor currency units
    #[serde(default)]
    pub total: Option<i64>,
    #[serde(default)]
    pub currency_code: Option<String>,
    #[serde(default)]
    pub converted_total: Option<i64>,
    #[serde(default)]
    pub converted_currency_code: Option<String>,
    #[serde(default)]
    pub issued_at: Option<ChronoDateTimeUtc>,
    #[serde(default)]
    pub category_code: Option<String>,
    #[serde(default)]
    pub project_code: Option<String>,
    /// JSON array of attached file ids
    pub files: Json,
    /// Values of extra fields keyed by field code
    #[serde(default)]
    pub extra: Option<Json>,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

impl Model {
    pub fn file_ids(&self) -> Vec<String> {
        match &self.files {
            Value::Array(items) => items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn extra_value(&self, code: &str) -> Option<&Value> {
        self.extra.as_ref().and_then(|extra| extra.get(code))
    }
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
