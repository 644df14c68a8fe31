use std::collections::HashSet;

use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set};
use tracing::info;

use crate::database::entities::fields;
use crate::errors::{CoreError, CoreResult};

struct DefaultField {
    code: &'static str,
    name: &'static str,
    kind: &'static str,
    visible_in_list: bool,
    visible_in_analysis: bool,
    required: bool,
}

const fn default_field(
    code: &'static str,
    name: &'static str,
    kind: &'static str,
    visible_in_list: bool,
    visible_in_analysis: bool,
    required: bool,
) -> DefaultField {
    DefaultField {
        code,
        name,
        kind,
        visible_in_list,
        visible_in_analysis,
        required,
    }
}

// code, display name, type, visible in list, visible in analysis, required
const DEFAULT_FIELDS: &[DefaultField] = &[
    default_field("name", "Name", "string", true, true, true),
    default_field("merchant", "Merchant", "string", true, true, false),
    default_field("description", "Description", "string", false, true, false),
    default_field("note", "Note", "string", false, false, false),
    default_field("text", "Recognized Text", "string", false, false, false),
    default_field("type", "Type", "string", false, true, false),
    default_field("total", "Total", "number", true, true, false),
    default_field("currencyCode", "Currency", "string", false, true, false),
    default_field("convertedTotal", "Converted Total", "number", false, false, false),
    default_field("convertedCurrencyCode", "Converted Currency", "string", false, false, false),
    default_field("issuedAt", "Issued At", "date", true, true, false),
    default_field("categoryCode", "Category", "string", true, true, false),
    default_field("projectCode", "Project", "string", true, true, false),
];

/// Display name of a standard transaction field.
pub fn default_field_name(code: &str) -> Option<&'static str> {
    DEFAULT_FIELDS
        .iter()
        .find(|field| field.code == code)
        .map(|field| field.name)
}

/// Transaction field definitions of a tenant.
#[derive(Clone)]
pub struct FieldService {
    db: DatabaseConnection,
}

impl FieldService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Inserts the standard transaction fields. Fields the tenant already
    /// has are left as they are. Returns the number of fields inserted.
    pub async fn seed_default_fields(&self, tenant_id: &str) -> CoreResult<u64> {
        let existing: HashSet<String> = self
            .list_fields(tenant_id)
            .await?
            .into_iter()
            .map(|field| field.code)
            .collect();

        let now = Utc::now();
        let missing: Vec<fields::ActiveModel> = DEFAULT_FIELDS
            .iter()
            .enumerate()
            .filter(|(_, field)| !existing.contains(field.code))
            .map(|(position, field)| fields::ActiveModel {
                user_id: Set(tenant_id.to_string()),
                code: Set(field.code.to_string()),
                name: Set(field.name.to_string()),
                kind: Set(field.kind.to_string()),
                llm_prompt: Set(None),
                options: Set(None),
                position: Set(position as i32),
                is_visible_in_list: Set(field.visible_in_list),
                is_visible_in_analysis: Set(field.visible_in_analysis),
                is_required: Set(field.required),
                is_extra: Set(false),
                created_at: Set(now),
            })
            .collect();

        let inserted = missing.len() as u64;
        if missing.is_empty() {
            return Ok(0);
        }

        fields::Entity::insert_many(missing)
            .on_conflict(
                OnConflict::columns([fields::Column::UserId, fields::Column::Code])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await
            .map_err(|e| CoreError::internal("Failed to seed default fields").with_source(e))?;

        info!("Seeded {} default fields for {}", inserted, tenant_id);
        Ok(inserted)
    }

    /// Fields ordered by position, then code.
    pub async fn list_fields(&self, tenant_id: &str) -> CoreResult<Vec<fields::Model>> {
        fields::Entity::find()
            .filter(fields::Column::UserId.eq(tenant_id))
            .order_by_asc(fields::Column::Position)
            .order_by_asc(fields::Column::Code)
            .all(&self.db)
            .await
            .map_err(|e| CoreError::internal("Failed to load fields").with_source(e))
    }

    /// Codes allowed as keys of a transaction's `extra` bag.
    pub async fn extra_field_codes(&self, tenant_id: &str) -> CoreResult<HashSet<String>> {
        let codes = fields::Entity::find()
            .filter(fields::Column::UserId.eq(tenant_id))
            .filter(fields::Column::IsExtra.eq(true))
            .all(&self.db)
            .await
            .map_err(|e| CoreError::internal("Failed to load extra fields").with_source(e))?
            .into_iter()
            .map(|field| field.code)
            .collect();
        Ok(codes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_utils::{create_test_user, setup_test_db};
    use sea_orm::ActiveModelTrait;

    #[tokio::test]
    async fn seeding_is_idempotent_and_keeps_custom_names() {
        let db = setup_test_db().await.unwrap();
        create_test_user(&db, "u1").await.unwrap();
        let service = FieldService::new(db.clone());

        assert_eq!(service.seed_default_fields("u1").await.unwrap(), 13);
        assert_eq!(service.seed_default_fields("u1").await.unwrap(), 0);

        let mut total: fields::ActiveModel =
            fields::Entity::find_by_id(("u1".to_string(), "total".to_string()))
                .one(&db)
                .await
                .unwrap()
                .unwrap()
                .into();
        total.name = Set("Amount".to_string());
        total.update(&db).await.unwrap();
        service.seed_default_fields("u1").await.unwrap();

        let listed = service.list_fields("u1").await.unwrap();
        assert_eq!(listed.len(), 13);
        assert_eq!(listed[0].code, "name");
        assert_eq!(listed[2].name, "Description");
        let total = listed.iter().find(|f| f.code == "total").unwrap();
        assert_eq!(total.name, "Amount");
        assert!(service.extra_field_codes("u1").await.unwrap().is_empty());
    }

    #[test]
    fn standard_fields_have_display_names() {
        assert_eq!(default_field_name("text"), Some("Recognized Text"));
        assert_eq!(default_field_name("currencyCode"), Some("Currency"));
        assert_eq!(default_field_name("vat"), None);
    }

    #[tokio::test]
    async fn extra_codes_only_include_extra_fields() {
        let db = setup_test_db().await.unwrap();
        create_test_user(&db, "u1").await.unwrap();
        let service = FieldService::new(db.clone());
        service.seed_default_fields("u1").await.unwrap();

        fields::ActiveModel {
            user_id: Set("u1".to_string()),
            code: Set("vat".to_string()),
            name: Set("VAT".to_string()),
            kind: Set("number".to_string()),
            llm_prompt: Set(None),
            options: Set(None),
            position: Set(20),
            is_visible_in_list: Set(false),
            is_visible_in_analysis: Set(false),
            is_required: Set(false),
            is_extra: Set(true),
            created_at: Set(Utc::now()),
        }
        .insert(&db)
        .await
        .unwrap();

        let codes = service.extra_field_codes("u1").await.unwrap();
        assert_eq!(codes.len(), 1);
        assert!(codes.contains("vat"));
    }
}
