use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::info;

use super::AppContext;
use crate::errors::{CoreError, CoreResult};
use crate::services::{parse_csv, ColumnMapping, CsvExportReport, TransactionFilters};

pub fn transactions_export_filename(include_attachments: bool) -> &'static str {
    if include_attachments {
        "transactions.zip"
    } else {
        "transactions.csv"
    }
}

impl AppContext {
    /// Writes the filtered transactions to `path`, as plain CSV or, with
    /// attachments, as a zip container.
    pub async fn export_transactions_to_path(
        &self,
        tenant_id: &str,
        filters: &TransactionFilters,
        field_codes: &[String],
        include_attachments: bool,
        path: &Path,
        progress_id: Option<&str>,
    ) -> CoreResult<CsvExportReport> {
        let file = File::create(path).map_err(|e| {
            CoreError::internal(format!("Failed to create {}", path.display())).with_source(e)
        })?;
        let service = self.csv_export_service();

        let report = if include_attachments {
            let (file, report) = service
                .export_with_attachments(tenant_id, filters, field_codes, file, progress_id)
                .await?;
            file.sync_all().map_err(|e| {
                CoreError::internal(format!("Failed to flush {}", path.display())).with_source(e)
            })?;
            report
        } else {
            let (mut out, rows) = service
                .export_csv(
                    tenant_id,
                    filters,
                    field_codes,
                    BufWriter::new(file),
                    progress_id,
                )
                .await?;
            out.flush().map_err(|e| {
                CoreError::internal(format!("Failed to flush {}", path.display())).with_source(e)
            })?;
            CsvExportReport {
                rows,
                ..Default::default()
            }
        };

        info!(
            "Exported {} transactions of {} to {}",
            report.rows,
            tenant_id,
            path.display()
        );
        Ok(report)
    }

    /// Parses an uploaded CSV and saves its rows in one call.
    pub async fn import_transactions_csv(
        &self,
        tenant_id: &str,
        filename: &str,
        bytes: &[u8],
        mapping: &ColumnMapping,
        skip_header: bool,
    ) -> CoreResult<u64> {
        let rows = parse_csv(filename, bytes)?;
        self.csv_import_service()
            .save(tenant_id, &rows, mapping, skip_header)
            .await
    }
}
