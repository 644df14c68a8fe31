//! Model Registry: which entities make up a backup, under which file name,
//! keyed by which identity field, in foreign-key dependency order.

use std::io::Write;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, ColumnTrait, ColumnType, DatabaseConnection,
    EntityTrait, IdenStatic, IntoActiveModel, Iterable, PaginatorTrait, PrimaryKeyToColumn,
    QueryFilter, QueryOrder,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

use crate::database::entities::{
    categories, currencies, fields, files, projects, settings, transactions,
};
use crate::errors::{ImportExportError, ImportExportResult};

/// An entity that can be dumped to and restored from a backup container.
pub trait PortableEntity: EntityTrait {
    type Active: ActiveModelTrait<Entity = Self> + ActiveModelBehavior + From<Self::Model> + Send;

    /// Dump file name under `data/`
    const FILENAME: &'static str;
    /// Unique per row within one tenant; the upsert key on restore
    const IDENTITY_FIELD: &'static str;
    /// Column holding an open map keyed by extra-field codes
    const EXTRA_BAG_FIELD: Option<&'static str> = None;

    fn tenant_column() -> Self::Column;
}

/// Object-safe view over one portable entity, used by the backup and
/// restore pipelines.
#[async_trait]
pub trait ModelDescriptor: Send + Sync {
    fn filename(&self) -> &'static str;

    fn identity_field(&self) -> &'static str;

    fn extra_bag_field(&self) -> Option<&'static str> {
        None
    }

    /// Columns stored as text, whose dumped values are taken verbatim
    fn text_fields(&self) -> Vec<String> {
        Vec::new()
    }

    /// Writes every row of the tenant as a JSON array, fetching `page_size`
    /// rows at a time. Returns the number of rows written.
    async fn write_dump(
        &self,
        db: &DatabaseConnection,
        tenant_id: &str,
        page_size: u64,
        out: &mut Vec<u8>,
    ) -> ImportExportResult<u64>;

    async fn delete_rows(&self, db: &DatabaseConnection, tenant_id: &str)
        -> ImportExportResult<u64>;

    /// Inserts the row, or overwrites the tenant's existing row with the
    /// same key. The row is always re-scoped to `tenant_id`, and every
    /// primary key includes the tenant column, so rows of other tenants
    /// are never touched.
    async fn upsert_row(
        &self,
        db: &DatabaseConnection,
        tenant_id: &str,
        row: Map<String, Value>,
    ) -> ImportExportResult<()>;
}

pub struct EntityDescriptor<E> {
    _entity: PhantomData<fn() -> E>,
}

impl<E> EntityDescriptor<E> {
    pub fn new() -> Self {
        Self {
            _entity: PhantomData,
        }
    }
}

impl<E> Default for EntityDescriptor<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<E> ModelDescriptor for EntityDescriptor<E>
where
    E: PortableEntity,
    E::Model: Serialize + DeserializeOwned + IntoActiveModel<E::Active> + Sync,
{
    fn filename(&self) -> &'static str {
        E::FILENAME
    }

    fn identity_field(&self) -> &'static str {
        E::IDENTITY_FIELD
    }

    fn extra_bag_field(&self) -> Option<&'static str> {
        E::EXTRA_BAG_FIELD
    }

    fn text_fields(&self) -> Vec<String> {
        E::Column::iter()
            .filter(|column| {
                matches!(
                    column.def().get_column_type(),
                    ColumnType::String(_) | ColumnType::Text | ColumnType::Char(_)
                )
            })
            .map(|column| column.as_str().to_string())
            .collect()
    }

    async fn write_dump(
        &self,
        db: &DatabaseConnection,
        tenant_id: &str,
        page_size: u64,
        out: &mut Vec<u8>,
    ) -> ImportExportResult<u64> {
        let mut query = E::find().filter(E::tenant_column().eq(tenant_id));
        for key in E::PrimaryKey::iter() {
            query = query.order_by_asc(key.into_column());
        }
        let mut paginator = query.paginate(db, page_size.max(1));

        let mut written = 0u64;
        out.push(b'[');
        while let Some(models) = paginator.fetch_and_next().await? {
            for model in models {
                if written > 0 {
                    out.push(b',');
                }
                out.write_all(b"\n  ")?;
                serde_json::to_writer(&mut *out, &model)?;
                written += 1;
            }
        }
        let closing: &[u8] = if written > 0 { b"\n]" } else { b"]" };
        out.write_all(closing)?;

        Ok(written)
    }

    async fn delete_rows(
        &self,
        db: &DatabaseConnection,
        tenant_id: &str,
    ) -> ImportExportResult<u64> {
        let result = E::delete_many()
            .filter(E::tenant_column().eq(tenant_id))
            .exec(db)
            .await?;
        Ok(result.rows_affected)
    }

    async fn upsert_row(
        &self,
        db: &DatabaseConnection,
        tenant_id: &str,
        mut row: Map<String, Value>,
    ) -> ImportExportResult<()> {
        if !row.contains_key(E::IDENTITY_FIELD) {
            return Err(ImportExportError::MissingData(E::IDENTITY_FIELD.to_string()));
        }
        row.insert(
            E::tenant_column().as_str().to_string(),
            Value::String(tenant_id.to_string()),
        );

        let model: E::Model = serde_json::from_value(Value::Object(row))?;
        let mut active: E::Active = model.into();
        // Mark every column as set so the insert carries the full row
        for column in E::Column::iter() {
            if let Some(value) = active.get(column).into_value() {
                active.set(column, value);
            }
        }

        let key_columns: Vec<E::Column> = E::PrimaryKey::iter()
            .map(|key| key.into_column())
            .collect();
        let update_columns: Vec<E::Column> = E::Column::iter()
            .filter(|column| {
                !key_columns
                    .iter()
                    .any(|key| key.as_str() == column.as_str())
            })
            .collect();

        let mut on_conflict = OnConflict::columns(key_columns);
        on_conflict.update_columns(update_columns);

        E::insert(active)
            .on_conflict(on_conflict)
            .exec_without_returning(db)
            .await?;
        Ok(())
    }
}

impl PortableEntity for settings::Entity {
    type Active = settings::ActiveModel;
    const FILENAME: &'static str = "settings.json";
    const IDENTITY_FIELD: &'static str = "code";

    fn tenant_column() -> Self::Column {
        settings::Column::UserId
    }
}

impl PortableEntity for currencies::Entity {
    type Active = currencies::ActiveModel;
    const FILENAME: &'static str = "currencies.json";
    const IDENTITY_FIELD: &'static str = "code";

    fn tenant_column() -> Self::Column {
        currencies::Column::UserId
    }
}

impl PortableEntity for categories::Entity {
    type Active = categories::ActiveModel;
    const FILENAME: &'static str = "categories.json";
    const IDENTITY_FIELD: &'static str = "code";

    fn tenant_column() -> Self::Column {
        categories::Column::UserId
    }
}

impl PortableEntity for projects::Entity {
    type Active = projects::ActiveModel;
    const FILENAME: &'static str = "projects.json";
    const IDENTITY_FIELD: &'static str = "code";

    fn tenant_column() -> Self::Column {
        projects::Column::UserId
    }
}

impl PortableEntity for fields::Entity {
    type Active = fields::ActiveModel;
    const FILENAME: &'static str = "fields.json";
    const IDENTITY_FIELD: &'static str = "code";

    fn tenant_column() -> Self::Column {
        fields::Column::UserId
    }
}

impl PortableEntity for files::Entity {
    type Active = files::ActiveModel;
    const FILENAME: &'static str = "files.json";
    const IDENTITY_FIELD: &'static str = "id";

    fn tenant_column() -> Self::Column {
        files::Column::UserId
    }
}

impl PortableEntity for transactions::Entity {
    type Active = transactions::ActiveModel;
    const FILENAME: &'static str = "transactions.json";
    const IDENTITY_FIELD: &'static str = "id";
    const EXTRA_BAG_FIELD: Option<&'static str> = Some("extra");

    fn tenant_column() -> Self::Column {
        transactions::Column::UserId
    }
}

/// Ordered set of model descriptors. Declaration order is dependency order:
/// a model may only reference models declared before it.
#[derive(Clone)]
pub struct ModelRegistry {
    descriptors: Vec<Arc<dyn ModelDescriptor>>,
}

impl ModelRegistry {
    pub fn new(descriptors: Vec<Arc<dyn ModelDescriptor>>) -> Self {
        Self { descriptors }
    }

    /// Every portable entity of the application.
    pub fn standard() -> Self {
        Self::new(vec![
            Arc::new(EntityDescriptor::<settings::Entity>::new()),
            Arc::new(EntityDescriptor::<currencies::Entity>::new()),
            Arc::new(EntityDescriptor::<categories::Entity>::new()),
            Arc::new(EntityDescriptor::<projects::Entity>::new()),
            Arc::new(EntityDescriptor::<fields::Entity>::new()),
            Arc::new(EntityDescriptor::<files::Entity>::new()),
            Arc::new(EntityDescriptor::<transactions::Entity>::new()),
        ])
    }

    pub fn descriptors(&self) -> &[Arc<dyn ModelDescriptor>] {
        &self.descriptors
    }

    /// Descriptors in the order rows must be deleted.
    pub fn purge_order(&self) -> impl Iterator<Item = &Arc<dyn ModelDescriptor>> {
        self.descriptors.iter().rev()
    }

    pub fn get(&self, filename: &str) -> Option<&Arc<dyn ModelDescriptor>> {
        self.descriptors
            .iter()
            .find(|descriptor| descriptor.filename() == filename)
    }

    pub fn filenames(&self) -> Vec<String> {
        self.descriptors
            .iter()
            .map(|descriptor| descriptor.filename().to_string())
            .collect()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
