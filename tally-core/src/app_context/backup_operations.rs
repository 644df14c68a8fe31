use std::fs::File;
use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::info;

use super::AppContext;
use crate::errors::{CoreError, CoreResult};
use crate::services::{ExportReport, RestoreReport};

/// Download name of a backup taken at `at`.
pub fn backup_filename(at: DateTime<Utc>) -> String {
    format!("tally-backup-{}.zip", at.format("%Y-%m-%d"))
}

impl AppContext {
    /// Writes a full backup of the tenant to `path`.
    pub async fn export_backup_to_path(
        &self,
        tenant_id: &str,
        path: &Path,
        progress_id: Option<&str>,
    ) -> CoreResult<ExportReport> {
        let file = File::create(path).map_err(|e| {
            CoreError::internal(format!("Failed to create {}", path.display())).with_source(e)
        })?;
        let (file, report) = self
            .backup_service()
            .export(tenant_id, file, progress_id)
            .await?;
        file.sync_all().map_err(|e| {
            CoreError::internal(format!("Failed to flush {}", path.display())).with_source(e)
        })?;
        info!("Backup of {} written to {}", tenant_id, path.display());
        Ok(report)
    }

    /// Restores a backup container read from `path`. Entries are read from
    /// disk one at a time.
    pub async fn restore_backup_from_path(
        &self,
        tenant_id: &str,
        path: &Path,
        purge_existing: bool,
        progress_id: Option<&str>,
    ) -> CoreResult<RestoreReport> {
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CoreError::validation(format!("No backup file at {}", path.display()))
            } else {
                CoreError::internal(format!("Failed to open {}", path.display())).with_source(e)
            }
        })?;
        self.restore_service()
            .restore(tenant_id, file, purge_existing, progress_id)
            .await
    }
}
