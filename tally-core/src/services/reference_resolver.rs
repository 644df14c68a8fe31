use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use tracing::{debug, warn};

use crate::database::entities::{categories, projects};
use crate::errors::{CoreError, CoreResult};

const PALETTE: [&str; 8] = [
    "#4f46e5", "#0891b2", "#059669", "#ca8a04", "#ea580c", "#dc2626", "#db2777", "#7c3aed",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    Category,
    Project,
}

impl ReferenceKind {
    fn label(&self) -> &'static str {
        match self {
            ReferenceKind::Category => "category",
            ReferenceKind::Project => "project",
        }
    }
}

/// Lowercases the name and collapses every run of whitespace or
/// punctuation into a single `_`.
pub fn code_from_name(name: &str) -> String {
    let mut code = String::with_capacity(name.len());
    let mut pending_separator = false;
    for c in name.trim().chars() {
        if c.is_alphanumeric() {
            if pending_separator && !code.is_empty() {
                code.push('_');
            }
            pending_separator = false;
            code.extend(c.to_lowercase());
        } else {
            pending_separator = true;
        }
    }
    code
}

fn color_for(code: &str) -> String {
    let index = code.bytes().map(usize::from).sum::<usize>() % PALETTE.len();
    PALETTE[index].to_string()
}

/// Finds or creates categories and projects by their human-readable name
/// during CSV import. Resolved codes are cached for the lifetime of the
/// resolver, which is one import call.
pub struct ReferenceResolver {
    db: DatabaseConnection,
    cache: HashMap<(String, ReferenceKind, String), String>,
}

impl ReferenceResolver {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            cache: HashMap::new(),
        }
    }

    /// Returns the code of the matching row, creating the row when no
    /// existing code or name matches. Blank names resolve to `None`.
    pub async fn resolve_or_create(
        &mut self,
        tenant_id: &str,
        kind: ReferenceKind,
        name: &str,
    ) -> CoreResult<Option<String>> {
        let name = name.trim();
        let code = code_from_name(name);
        if code.is_empty() {
            if !name.is_empty() {
                warn!("Cannot derive a {} code from '{}'", kind.label(), name);
            }
            return Ok(None);
        }

        let cache_key = (tenant_id.to_string(), kind, name.to_string());
        if let Some(code) = self.cache.get(&cache_key) {
            return Ok(Some(code.clone()));
        }

        let resolved = match self.find_existing(tenant_id, kind, &code, name).await? {
            Some(existing) => existing,
            None => {
                self.create(tenant_id, kind, &code, name).await?;
                debug!("Created {} '{}' with code '{}'", kind.label(), name, code);
                code
            }
        };

        self.cache.insert(cache_key, resolved.clone());
        Ok(Some(resolved))
    }

    async fn find_existing(
        &self,
        tenant_id: &str,
        kind: ReferenceKind,
        code: &str,
        name: &str,
    ) -> CoreResult<Option<String>> {
        let found = match kind {
            ReferenceKind::Category => categories::Entity::find()
                .filter(categories::Column::UserId.eq(tenant_id))
                .filter(
                    Condition::any()
                        .add(categories::Column::Code.eq(code))
                        .add(categories::Column::Name.eq(name)),
                )
                .one(&self.db)
                .await
                .map_err(|e| CoreError::internal("Failed to look up category").with_source(e))?
                .map(|row| row.code),
            ReferenceKind::Project => projects::Entity::find()
                .filter(projects::Column::UserId.eq(tenant_id))
                .filter(
                    Condition::any()
                        .add(projects::Column::Code.eq(code))
                        .add(projects::Column::Name.eq(name)),
                )
                .one(&self.db)
                .await
                .map_err(|e| CoreError::internal("Failed to look up project").with_source(e))?
                .map(|row| row.code),
        };
        Ok(found)
    }

    async fn create(
        &self,
        tenant_id: &str,
        kind: ReferenceKind,
        code: &str,
        name: &str,
    ) -> CoreResult<()> {
        let now = Utc::now();
        match kind {
            ReferenceKind::Category => {
                categories::ActiveModel {
                    user_id: Set(tenant_id.to_string()),
                    code: Set(code.to_string()),
                    name: Set(name.to_string()),
                    color: Set(color_for(code)),
                    llm_prompt: Set(None),
                    created_at: Set(now),
                }
                .insert(&self.db)
                .await
                .map_err(|e| CoreError::internal("Failed to create category").with_source(e))?;
            }
            ReferenceKind::Project => {
                projects::ActiveModel {
                    user_id: Set(tenant_id.to_string()),
                    code: Set(code.to_string()),
                    name: Set(name.to_string()),
                    color: Set(color_for(code)),
                    llm_prompt: Set(None),
                    created_at: Set(now),
                }
                .insert(&self.db)
                .await
                .map_err(|e| CoreError::internal("Failed to create project").with_source(e))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_utils::{create_test_user, setup_test_db};
    use sea_orm::PaginatorTrait;

    #[test]
    fn test_code_from_name() {
        assert_eq!(code_from_name("Office Supplies"), "office_supplies");
        assert_eq!(code_from_name("  Travel -- & Food!! "), "travel_food");
        assert_eq!(code_from_name("Café 2024"), "café_2024");
        assert_eq!(code_from_name("***"), "");
    }

    #[tokio::test]
    async fn resolving_twice_creates_one_row() {
        let db = setup_test_db().await.unwrap();
        create_test_user(&db, "u1").await.unwrap();

        let mut resolver = ReferenceResolver::new(db.clone());
        let first = resolver
            .resolve_or_create("u1", ReferenceKind::Category, "Office Supplies")
            .await
            .unwrap();
        // A fresh resolver has no cache, so this goes back to the database
        let mut other = ReferenceResolver::new(db.clone());
        let second = other
            .resolve_or_create("u1", ReferenceKind::Category, "Office Supplies")
            .await
            .unwrap();

        assert_eq!(first, Some("office_supplies".to_string()));
        assert_eq!(first, second);
        let count = categories::Entity::find()
            .filter(categories::Column::UserId.eq("u1"))
            .count(&db)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn legacy_rows_match_by_exact_name() {
        let db = setup_test_db().await.unwrap();
        create_test_user(&db, "u1").await.unwrap();
        projects::ActiveModel {
            user_id: Set("u1".to_string()),
            code: Set("p-001".to_string()),
            name: Set("Kitchen Remodel".to_string()),
            color: Set("#000000".to_string()),
            llm_prompt: Set(None),
            created_at: Set(Utc::now()),
        }
        .insert(&db)
        .await
        .unwrap();

        let mut resolver = ReferenceResolver::new(db.clone());
        let code = resolver
            .resolve_or_create("u1", ReferenceKind::Project, "Kitchen Remodel")
            .await
            .unwrap();
        assert_eq!(code, Some("p-001".to_string()));
        assert_eq!(
            resolver
                .resolve_or_create("u1", ReferenceKind::Project, "   ")
                .await
                .unwrap(),
            None
        );
    }
}
