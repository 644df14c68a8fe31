use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Seek, Write};
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use csv::Writer;
use sea_orm::sea_query::Order;
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Select,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::archive::ArchiveWriter;
use crate::config::PortabilityConfig;
use crate::database::entities::{categories, fields, files, projects, transactions};
use crate::errors::{CoreError, CoreResult};
use crate::field_transforms::{cell_text, parse_date, transaction_field, ExportLookups};
use crate::services::field_service::{default_field_name, FieldService};
use crate::services::progress_service::{ProgressHandle, ProgressReporter};
use crate::storage::{normalize_record_path, AttachmentStorage};

pub const CSV_ENTRY_NAME: &str = "transactions.csv";
pub const ATTACHMENTS_DIR: &str = "attachments";
pub const DEFAULT_ORDERING: &str = "-issuedAt";

/// Row selection for transaction exports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransactionFilters {
    /// Matched against name, merchant, description, note and recognised text
    pub search: Option<String>,
    pub date_from: Option<String>,
    /// Inclusive; a bare date covers the whole day
    pub date_to: Option<String>,
    /// Field code, `-` prefix for descending
    pub ordering: Option<String>,
    pub category_code: Option<String>,
    pub project_code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CsvExportReport {
    pub rows: u64,
    pub files_included: u64,
    pub files_skipped: u64,
}

/// Column of the exported CSV
#[derive(Debug, Clone)]
struct ExportColumn {
    code: String,
    header: String,
}

#[derive(Clone)]
pub struct CsvExportService {
    db: DatabaseConnection,
    storage: AttachmentStorage,
    config: PortabilityConfig,
    progress: Arc<dyn ProgressReporter>,
}

impl CsvExportService {
    pub fn new(
        db: DatabaseConnection,
        storage: AttachmentStorage,
        config: PortabilityConfig,
        progress: Arc<dyn ProgressReporter>,
    ) -> Self {
        Self {
            db,
            storage,
            config,
            progress,
        }
    }

    /// Writes the matching transactions as CSV. `field_codes` selects and
    /// orders the columns; when empty, the fields visible in the list are
    /// exported.
    pub async fn export_csv<W>(
        &self,
        tenant_id: &str,
        filters: &TransactionFilters,
        field_codes: &[String],
        out: W,
        progress_id: Option<&str>,
    ) -> CoreResult<(W, u64)>
    where
        W: Write + Send,
    {
        let columns = self.resolve_columns(tenant_id, field_codes).await?;
        let lookups = self.load_lookups(tenant_id).await?;
        let query = build_query(tenant_id, filters)?;
        let progress = ProgressHandle::new(self.progress.as_ref(), progress_id);

        let mut writer = Writer::from_writer(out);
        writer
            .write_record(columns.iter().map(|column| column.header.as_str()))
            .map_err(csv_error)?;

        let mut pages = query.paginate(&self.db, self.config.csv_row_batch_size.max(1));
        let total = pages
            .num_items()
            .await
            .map_err(|e| CoreError::internal("Failed to count transactions").with_source(e))?;
        progress.set_total(total).await;

        let mut rows = 0u64;
        while let Some(batch) = pages
            .fetch_and_next()
            .await
            .map_err(|e| CoreError::internal("Failed to load transactions").with_source(e))?
        {
            for transaction in &batch {
                let record = export_record(transaction, &columns, &lookups)?;
                writer.write_record(&record).map_err(csv_error)?;
                rows += 1;
            }
            debug!("Exported {}/{} transactions", rows, total);
            progress.set_current(rows).await;
        }

        writer.flush().map_err(|e| CoreError::internal("Failed to write CSV").with_source(e))?;
        let out = writer
            .into_inner()
            .map_err(|e| CoreError::internal(format!("Failed to finish CSV: {}", e)))?;
        Ok((out, rows))
    }

    pub async fn export_csv_to_vec(
        &self,
        tenant_id: &str,
        filters: &TransactionFilters,
        field_codes: &[String],
        progress_id: Option<&str>,
    ) -> CoreResult<(Vec<u8>, u64)> {
        self.export_csv(tenant_id, filters, field_codes, Vec::new(), progress_id)
            .await
    }

    /// Writes a zip container holding `transactions.csv` and the attached
    /// files of every exported transaction under `attachments/YYYY/MM/`.
    pub async fn export_with_attachments<W>(
        &self,
        tenant_id: &str,
        filters: &TransactionFilters,
        field_codes: &[String],
        out: W,
        progress_id: Option<&str>,
    ) -> CoreResult<(W, CsvExportReport)>
    where
        W: Write + Seek + Send,
    {
        let (csv, rows) = self
            .export_csv_to_vec(tenant_id, filters, field_codes, None)
            .await?;

        let mut archive = ArchiveWriter::new(out, self.config.compression_level);
        archive
            .add_bytes(CSV_ENTRY_NAME, &csv)
            .map_err(|e| CoreError::internal("Failed to write CSV to export").with_source(e))?;

        let mut report = CsvExportReport {
            rows,
            ..Default::default()
        };
        let progress = ProgressHandle::new(self.progress.as_ref(), progress_id);
        progress.set_total(rows).await;

        let query = build_query(tenant_id, filters)?;
        let mut pages = query.paginate(&self.db, self.config.csv_attachment_batch_size.max(1));
        let mut processed = 0u64;
        let mut entry_names = HashSet::new();
        while let Some(batch) = pages
            .fetch_and_next()
            .await
            .map_err(|e| CoreError::internal("Failed to load transactions").with_source(e))?
        {
            for transaction in &batch {
                self.add_attachments(
                    tenant_id,
                    transaction,
                    &mut archive,
                    &mut entry_names,
                    &mut report,
                )
                .await?;
            }
            processed += batch.len() as u64;
            progress.set_current(processed).await;
        }

        let out = archive
            .finish()
            .map_err(|e| CoreError::internal("Failed to finalize export").with_source(e))?;
        info!(
            "Exported {} transactions with {} attachments for {} ({} skipped)",
            report.rows, report.files_included, tenant_id, report.files_skipped
        );
        Ok((out, report))
    }

    pub async fn export_with_attachments_to_vec(
        &self,
        tenant_id: &str,
        filters: &TransactionFilters,
        field_codes: &[String],
        progress_id: Option<&str>,
    ) -> CoreResult<(Vec<u8>, CsvExportReport)> {
        let (cursor, report) = self
            .export_with_attachments(
                tenant_id,
                filters,
                field_codes,
                Cursor::new(Vec::new()),
                progress_id,
            )
            .await?;
        Ok((cursor.into_inner(), report))
    }

    async fn add_attachments<W>(
        &self,
        tenant_id: &str,
        transaction: &transactions::Model,
        archive: &mut ArchiveWriter<W>,
        entry_names: &mut HashSet<String>,
        report: &mut CsvExportReport,
    ) -> CoreResult<()>
    where
        W: Write + Seek + Send,
    {
        let file_ids = transaction.file_ids();
        if file_ids.is_empty() {
            return Ok(());
        }

        let records = files::Entity::find()
            .filter(files::Column::UserId.eq(tenant_id))
            .filter(files::Column::Id.is_in(file_ids.clone()))
            .all(&self.db)
            .await
            .map_err(|e| CoreError::internal("Failed to load attachments").with_source(e))?;
        // Keep the order the transaction lists its files in
        let by_id: HashMap<&str, &files::Model> =
            records.iter().map(|record| (record.id.as_str(), record)).collect();
        let ordered: Vec<&files::Model> = file_ids
            .iter()
            .filter_map(|id| by_id.get(id.as_str()).copied())
            .collect();

        for (index, record) in ordered.iter().enumerate() {
            let relative = normalize_record_path(&record.path);
            let mut handle = match self.storage.open(tenant_id, &relative).await {
                Ok(handle) => handle,
                Err(e) => {
                    warn!("Skipping attachment {} of {}: {}", record.id, transaction.id, e);
                    report.files_skipped += 1;
                    continue;
                }
            };
            let size = handle.metadata().await.map(|m| m.len()).unwrap_or(0);
            if size > self.config.max_backup_file_size {
                warn!(
                    "Skipping attachment {}: {} bytes exceeds the {} byte limit",
                    record.id, size, self.config.max_backup_file_size
                );
                report.files_skipped += 1;
                continue;
            }
            let entry = claim_entry_name(
                entry_names,
                attachment_entry_path(transaction, record, index, ordered.len()),
            );
            match archive.add_file(&entry, &mut handle, size).await {
                Ok(_) => report.files_included += 1,
                Err(e) => {
                    warn!("Failed to add attachment {} to export: {}", record.id, e);
                    report.files_skipped += 1;
                }
            }
        }
        Ok(())
    }

    async fn resolve_columns(
        &self,
        tenant_id: &str,
        field_codes: &[String],
    ) -> CoreResult<Vec<ExportColumn>> {
        let field_service = FieldService::new(self.db.clone());
        let mut defined = field_service.list_fields(tenant_id).await?;
        if defined.is_empty() {
            field_service.seed_default_fields(tenant_id).await?;
            defined = field_service.list_fields(tenant_id).await?;
        }

        if field_codes.is_empty() {
            return Ok(defined
                .iter()
                .filter(|field| field.is_visible_in_list)
                .map(column_for)
                .collect());
        }

        let by_code: HashMap<&str, &fields::Model> =
            defined.iter().map(|field| (field.code.as_str(), field)).collect();
        field_codes
            .iter()
            .map(|code| match by_code.get(code.as_str()) {
                Some(field) => Ok(column_for(field)),
                None if transaction_field(code).is_some() => Ok(ExportColumn {
                    code: code.clone(),
                    header: default_field_name(code).unwrap_or(code).to_string(),
                }),
                None => Err(CoreError::validation(format!("Unknown field '{}'", code))),
            })
            .collect()
    }

    async fn load_lookups(&self, tenant_id: &str) -> CoreResult<ExportLookups> {
        let categories = categories::Entity::find()
            .filter(categories::Column::UserId.eq(tenant_id))
            .all(&self.db)
            .await
            .map_err(|e| CoreError::internal("Failed to load categories").with_source(e))?
            .into_iter()
            .map(|row| (row.code, row.name))
            .collect();
        let projects = projects::Entity::find()
            .filter(projects::Column::UserId.eq(tenant_id))
            .all(&self.db)
            .await
            .map_err(|e| CoreError::internal("Failed to load projects").with_source(e))?
            .into_iter()
            .map(|row| (row.code, row.name))
            .collect();
        Ok(ExportLookups {
            categories,
            projects,
        })
    }
}

fn column_for(field: &fields::Model) -> ExportColumn {
    ExportColumn {
        code: field.code.clone(),
        header: field.name.clone(),
    }
}

fn csv_error(e: csv::Error) -> CoreError {
    CoreError::internal("Failed to write CSV").with_source(e)
}

fn export_record(
    transaction: &transactions::Model,
    columns: &[ExportColumn],
    lookups: &ExportLookups,
) -> CoreResult<Vec<String>> {
    let row = serde_json::to_value(transaction)
        .map_err(|e| CoreError::internal("Failed to serialize transaction").with_source(e))?;

    Ok(columns
        .iter()
        .map(|column| match transaction_field(&column.code) {
            Some(descriptor) => {
                let raw = row.get(descriptor.column).cloned().unwrap_or(Value::Null);
                match descriptor.export {
                    Some(transform) => cell_text(&transform.apply(&raw, lookups)),
                    None => cell_text(&raw),
                }
            }
            None => transaction
                .extra_value(&column.code)
                .map(cell_text)
                .unwrap_or_default(),
        })
        .collect())
}

fn build_query(
    tenant_id: &str,
    filters: &TransactionFilters,
) -> CoreResult<Select<transactions::Entity>> {
    let mut query =
        transactions::Entity::find().filter(transactions::Column::UserId.eq(tenant_id));

    if let Some(search) = non_empty(&filters.search) {
        query = query.filter(
            Condition::any()
                .add(transactions::Column::Name.contains(search))
                .add(transactions::Column::Merchant.contains(search))
                .add(transactions::Column::Description.contains(search))
                .add(transactions::Column::Note.contains(search))
                .add(transactions::Column::Text.contains(search)),
        );
    }
    if let Some(raw) = non_empty(&filters.date_from) {
        let from = parse_filter_date(raw)?;
        query = query.filter(transactions::Column::IssuedAt.gte(from));
    }
    if let Some(raw) = non_empty(&filters.date_to) {
        let to = parse_filter_date(raw)?;
        query = if is_bare_date(raw) {
            query.filter(transactions::Column::IssuedAt.lt(to + Duration::days(1)))
        } else {
            query.filter(transactions::Column::IssuedAt.lte(to))
        };
    }
    if let Some(code) = non_empty(&filters.category_code) {
        query = query.filter(transactions::Column::CategoryCode.eq(code));
    }
    if let Some(code) = non_empty(&filters.project_code) {
        query = query.filter(transactions::Column::ProjectCode.eq(code));
    }

    let ordering = non_empty(&filters.ordering).unwrap_or(DEFAULT_ORDERING);
    let (column, order) = ordering_column(ordering)?;
    Ok(query
        .order_by(column, order)
        .order_by_asc(transactions::Column::Id))
}

fn ordering_column(ordering: &str) -> CoreResult<(transactions::Column, Order)> {
    let (code, order) = match ordering.strip_prefix('-') {
        Some(code) => (code, Order::Desc),
        None => (ordering, Order::Asc),
    };
    let column = match code {
        "issuedAt" => transactions::Column::IssuedAt,
        "total" => transactions::Column::Total,
        "name" => transactions::Column::Name,
        "merchant" => transactions::Column::Merchant,
        "createdAt" => transactions::Column::CreatedAt,
        other => {
            return Err(CoreError::validation(format!(
                "Cannot order transactions by '{}'",
                other
            )))
        }
    };
    Ok((column, order))
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn is_bare_date(raw: &str) -> bool {
    raw.trim().len() == 10
}

fn parse_filter_date(raw: &str) -> CoreResult<DateTime<Utc>> {
    parse_date(raw).ok_or_else(|| CoreError::validation(format!("Invalid date '{}'", raw)))
}

/// Lowercase ASCII words joined by `-`, at most 50 characters.
pub fn slugify(value: &str) -> String {
    let mut slug = String::new();
    for c in value.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let mut slug: String = slug.trim_end_matches('-').chars().take(50).collect();
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// `attachments/YYYY/MM/[<date>-<name>/]<date>-<name>[-n]<ext>`. Transactions
/// with several files get their own folder and numbered file names.
fn attachment_entry_path(
    transaction: &transactions::Model,
    record: &files::Model,
    index: usize,
    count: usize,
) -> String {
    let date = transaction.issued_at.unwrap_or(transaction.created_at);
    let day = date.format("%Y-%m-%d").to_string();
    let label = transaction
        .name
        .as_deref()
        .map(slugify)
        .filter(|slug| !slug.is_empty())
        .unwrap_or_else(|| slugify(&transaction.id));
    let base = format!("{}-{}", day, label);
    let extension = Path::new(&record.filename)
        .extension()
        .or_else(|| Path::new(&record.path).extension())
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();

    let folder = format!("{}/{}", ATTACHMENTS_DIR, date.format("%Y/%m"));
    if count > 1 {
        format!("{}/{}/{}-{}{}", folder, base, base, index + 1, extension)
    } else {
        format!("{}/{}{}", folder, base, extension)
    }
}

/// Returns `entry`, or the first of `<stem>-2<ext>`, `<stem>-3<ext>`, ...
/// not handed out yet.
fn claim_entry_name(used: &mut HashSet<String>, entry: String) -> String {
    if used.insert(entry.clone()) {
        return entry;
    }
    let name_start = entry.rfind('/').map_or(0, |slash| slash + 1);
    let split = entry[name_start..]
        .rfind('.')
        .filter(|&dot| dot > 0)
        .map_or(entry.len(), |dot| name_start + dot);
    let (stem, extension) = entry.split_at(split);
    let mut suffix = 2;
    loop {
        let candidate = format!("{}-{}{}", stem, suffix, extension);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        suffix += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn transaction(name: Option<&str>) -> transactions::Model {
        let issued = Utc.with_ymd_and_hms(2024, 3, 7, 12, 0, 0).unwrap();
        transactions::Model {
            id: "tx-1".to_string(),
            user_id: "u1".to_string(),
            name: name.map(str::to_string),
            description: None,
            merchant: None,
            note: None,
            text: None,
            kind: None,
            total: Some(550),
            currency_code: Some("EUR".to_string()),
            converted_total: None,
            converted_currency_code: None,
            issued_at: Some(issued),
            category_code: Some("food".to_string()),
            project_code: None,
            files: json!([]),
            extra: Some(json!({"vat": 19})),
            created_at: issued,
            updated_at: issued,
        }
    }

    fn file(filename: &str) -> files::Model {
        files::Model {
            id: "f1".to_string(),
            user_id: "u1".to_string(),
            filename: filename.to_string(),
            path: "/uploads/2024/receipt".to_string(),
            mimetype: "application/pdf".to_string(),
            metadata: None,
            is_reviewed: false,
            is_splitted: false,
            cached_parse_result: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Coffee at Joe's!"), "coffee-at-joe-s");
        assert_eq!(slugify("---"), "");
        assert_eq!(slugify(&"a".repeat(80)).len(), 50);
    }

    #[test]
    fn attachment_paths_follow_transaction_date() {
        let tx = transaction(Some("Coffee Beans"));
        assert_eq!(
            attachment_entry_path(&tx, &file("r.pdf"), 0, 1),
            "attachments/2024/03/2024-03-07-coffee-beans.pdf"
        );
        assert_eq!(
            attachment_entry_path(&tx, &file("r.PNG"), 1, 2),
            "attachments/2024/03/2024-03-07-coffee-beans/2024-03-07-coffee-beans-2.PNG"
        );
        assert_eq!(
            attachment_entry_path(&transaction(None), &file("scan"), 0, 1),
            "attachments/2024/03/2024-03-07-tx-1"
        );
    }

    #[test]
    fn entry_names_are_handed_out_once() {
        let mut used = HashSet::new();
        let entry = "attachments/2024/01/2024-01-05-coffee.pdf";
        assert_eq!(claim_entry_name(&mut used, entry.to_string()), entry);
        assert_eq!(
            claim_entry_name(&mut used, entry.to_string()),
            "attachments/2024/01/2024-01-05-coffee-2.pdf"
        );
        assert_eq!(
            claim_entry_name(&mut used, entry.to_string()),
            "attachments/2024/01/2024-01-05-coffee-3.pdf"
        );
        let bare = "attachments/2024.01/scan";
        assert_eq!(claim_entry_name(&mut used, bare.to_string()), bare);
        assert_eq!(
            claim_entry_name(&mut used, bare.to_string()),
            "attachments/2024.01/scan-2"
        );
    }

    #[test]
    fn records_apply_export_transforms() {
        let mut lookups = ExportLookups::default();
        lookups
            .categories
            .insert("food".to_string(), "Food".to_string());
        let columns: Vec<ExportColumn> = ["name", "total", "issuedAt", "categoryCode", "vat"]
            .iter()
            .map(|code| ExportColumn {
                code: code.to_string(),
                header: code.to_string(),
            })
            .collect();

        let record = export_record(&transaction(Some("Coffee")), &columns, &lookups).unwrap();
        assert_eq!(record, vec!["Coffee", "5.5", "2024-03-07", "Food", "19"]);
    }

    #[test]
    fn test_ordering_column() {
        let (column, order) = ordering_column("-issuedAt").unwrap();
        assert!(matches!(column, transactions::Column::IssuedAt));
        assert!(matches!(order, Order::Desc));
        let (column, order) = ordering_column("total").unwrap();
        assert!(matches!(column, transactions::Column::Total));
        assert!(matches!(order, Order::Asc));
        assert!(ordering_column("password").is_err());
    }

    #[test]
    fn invalid_filter_dates_are_rejected() {
        let filters = TransactionFilters {
            date_from: Some("not a date".to_string()),
            ..Default::default()
        };
        assert!(build_query("u1", &filters).is_err());
    }
}
