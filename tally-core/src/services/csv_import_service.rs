use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use chrono::Utc;
use csv::ReaderBuilder;
use sea_orm::{ActiveModelTrait, DatabaseConnection, TransactionTrait};
use serde_json::{Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::coercion::CoercedValue;
use crate::database::entities::transactions;
use crate::errors::{CoreError, CoreResult};
use crate::field_transforms::{
    coerce_cell, parse_date, parse_minor_units, transaction_field, FieldValueType,
    ImportTransform,
};
use crate::services::field_service::FieldService;
use crate::services::reference_resolver::{ReferenceKind, ReferenceResolver};

/// Field code to zero-based column index.
pub type ColumnMapping = BTreeMap<String, usize>;

/// Builds a mapping from a per-column list of field codes, as sent by the
/// column picker. Columns set to `skip` or left blank are not imported.
pub fn mapping_from_columns(columns: &[String]) -> ColumnMapping {
    columns
        .iter()
        .enumerate()
        .filter(|(_, code)| {
            let code = code.trim();
            !code.is_empty() && code != "skip"
        })
        .map(|(index, code)| (code.trim().to_string(), index))
        .collect()
}

/// Reads an uploaded CSV into a matrix of cells. No header row is assumed
/// and rows may differ in length.
pub fn parse_csv(filename: &str, bytes: &[u8]) -> CoreResult<Vec<Vec<String>>> {
    let is_csv = Path::new(filename)
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);
    if !is_csv {
        return Err(CoreError::validation(format!(
            "'{}' is not a CSV file",
            filename
        )));
    }
    if bytes.is_empty() {
        return Err(CoreError::validation("No file provided"));
    }

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| {
            CoreError::validation(format!("Failed to parse CSV: {}", e)).with_source(e)
        })?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

#[derive(Clone)]
pub struct CsvImportService {
    db: DatabaseConnection,
}

impl CsvImportService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Creates one transaction per data row. Existing transactions are
    /// never updated.
    ///
    /// The mapping is checked and every row is converted before the first
    /// transaction is written; the rows are then inserted in a single
    /// database transaction.
    pub async fn save(
        &self,
        tenant_id: &str,
        rows: &[Vec<String>],
        mapping: &ColumnMapping,
        skip_header: bool,
    ) -> CoreResult<u64> {
        if mapping.is_empty() {
            return Err(CoreError::validation(
                "Please map at least one column to a field",
            ));
        }
        let extra_types = self.extra_field_types(tenant_id, mapping).await?;

        let mut resolver = ReferenceResolver::new(self.db.clone());
        let data_rows = rows.iter().skip(usize::from(skip_header));
        let mut pending = Vec::new();
        for (index, row) in data_rows.enumerate() {
            let line = index + 1 + usize::from(skip_header);
            match self
                .build_row(tenant_id, row, mapping, &extra_types, &mut resolver)
                .await?
            {
                Some(json) => {
                    let active = transactions::ActiveModel::from_json(json).map_err(|e| {
                        CoreError::validation(format!("Row {} is invalid: {}", line, e))
                            .with_source(e)
                    })?;
                    pending.push(active);
                }
                None => warn!("Skipping empty CSV row {}", line),
            }
        }

        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| CoreError::internal("Failed to start import").with_source(e))?;
        let created = pending.len() as u64;
        for active in pending {
            active
                .insert(&txn)
                .await
                .map_err(|e| CoreError::internal("Failed to save transaction").with_source(e))?;
        }
        txn.commit()
            .await
            .map_err(|e| CoreError::internal("Failed to commit import").with_source(e))?;

        info!("Imported {} transactions for {}", created, tenant_id);
        Ok(created)
    }

    /// Declared types of the mapped extra fields. Codes that are neither a
    /// standard field nor an extra field of the tenant are rejected.
    async fn extra_field_types(
        &self,
        tenant_id: &str,
        mapping: &ColumnMapping,
    ) -> CoreResult<HashMap<String, FieldValueType>> {
        let defined = FieldService::new(self.db.clone())
            .list_fields(tenant_id)
            .await?;
        let mut types = HashMap::new();

        for code in mapping.keys() {
            if transaction_field(code).is_some() {
                continue;
            }
            match defined.iter().find(|field| &field.code == code && field.is_extra) {
                Some(field) => {
                    types.insert(code.clone(), FieldValueType::from_kind(&field.kind));
                }
                None => {
                    return Err(CoreError::validation(format!("Unknown field '{}'", code)));
                }
            }
        }
        Ok(types)
    }

    /// JSON form of a new transaction, or `None` when no mapped cell has a
    /// value.
    async fn build_row(
        &self,
        tenant_id: &str,
        row: &[String],
        mapping: &ColumnMapping,
        extra_types: &HashMap<String, FieldValueType>,
        resolver: &mut ReferenceResolver,
    ) -> CoreResult<Option<Value>> {
        let mut record = Map::new();
        let mut extra = Map::new();

        for (code, column) in mapping {
            let cell = match row.get(*column).map(|cell| cell.trim()) {
                Some(cell) if !cell.is_empty() => cell,
                _ => continue,
            };

            if let Some(descriptor) = transaction_field(code) {
                let value = match descriptor.import {
                    Some(transform) => {
                        apply_import(transform, code, cell, tenant_id, resolver).await?
                    }
                    None => coerce_cell(code, cell, descriptor.value_type),
                };
                record.insert(descriptor.column.to_string(), value);
            } else if let Some(value_type) = extra_types.get(code) {
                extra.insert(code.clone(), coerce_cell(code, cell, *value_type));
            }
        }

        if record.values().all(Value::is_null) && extra.is_empty() {
            return Ok(None);
        }

        let now = serde_json::to_value(Utc::now())
            .map_err(|e| CoreError::internal("Failed to encode timestamp").with_source(e))?;
        record.insert("id".into(), Value::String(Uuid::new_v4().to_string()));
        record.insert("user_id".into(), Value::String(tenant_id.to_string()));
        record.insert("files".into(), Value::Array(Vec::new()));
        record.insert(
            "extra".into(),
            if extra.is_empty() {
                Value::Null
            } else {
                Value::Object(extra)
            },
        );
        record.insert("created_at".into(), now.clone());
        record.insert("updated_at".into(), now);
        Ok(Some(Value::Object(record)))
    }
}

async fn apply_import(
    transform: ImportTransform,
    code: &str,
    cell: &str,
    tenant_id: &str,
    resolver: &mut ReferenceResolver,
) -> CoreResult<Value> {
    let value = match transform {
        ImportTransform::MinorUnits => match parse_minor_units(cell) {
            Some(minor) => Value::from(minor),
            None => {
                warn!("Ignoring {} '{}': not an amount", code, cell);
                Value::Null
            }
        },
        ImportTransform::Date => match parse_date(cell) {
            Some(date) => CoercedValue::Date(date).into_json(),
            None => {
                warn!("Ignoring {} '{}': not a date", code, cell);
                Value::Null
            }
        },
        ImportTransform::Lowercase => Value::String(cell.to_lowercase()),
        ImportTransform::Uppercase => Value::String(cell.to_uppercase()),
        ImportTransform::CategoryReference => resolver
            .resolve_or_create(tenant_id, ReferenceKind::Category, cell)
            .await?
            .map(Value::String)
            .unwrap_or(Value::Null),
        ImportTransform::ProjectReference => resolver
            .resolve_or_create(tenant_id, ReferenceKind::Project, cell)
            .await?
            .map(Value::String)
            .unwrap_or(Value::Null),
    };
    Ok(value)
}
