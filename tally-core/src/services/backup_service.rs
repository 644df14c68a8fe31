use std::collections::BTreeMap;
use std::io::{Cursor, Seek, Write};
use std::sync::Arc;

use sea_orm::DatabaseConnection;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::archive::{
    model_entry_path, upload_entry_path, ArchiveMetadata, ArchiveWriter, METADATA_PATH,
};
use crate::config::PortabilityConfig;
use crate::errors::{CoreError, CoreResult};
use crate::registry::ModelRegistry;
use crate::services::progress_service::{ProgressHandle, ProgressReporter};
use crate::storage::AttachmentStorage;

const EMPTY_DUMP: &[u8] = b"[]";
const DUMP_PAGE_SIZE: u64 = 500;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportReport {
    /// Rows written per dump file
    pub models: BTreeMap<String, u64>,
    /// Dump files written empty because reading the model failed
    pub failed_models: Vec<String>,
    pub files_included: u64,
    pub files_skipped: u64,
}

/// Writes a tenant's full account into a backup container.
#[derive(Clone)]
pub struct BackupService {
    db: DatabaseConnection,
    storage: AttachmentStorage,
    registry: ModelRegistry,
    config: PortabilityConfig,
    progress: Arc<dyn ProgressReporter>,
}

impl BackupService {
    pub fn new(
        db: DatabaseConnection,
        storage: AttachmentStorage,
        registry: ModelRegistry,
        config: PortabilityConfig,
        progress: Arc<dyn ProgressReporter>,
    ) -> Self {
        Self {
            db,
            storage,
            registry,
            config,
            progress,
        }
    }

    /// Writes the container into `out` and hands `out` back once the
    /// container is complete. Source data is only read.
    ///
    /// A model that cannot be read is written as an empty dump and an
    /// attachment that is too large or unreadable is left out; both are
    /// logged and counted in the report. Only failures of the container
    /// itself abort the export.
    pub async fn export<W>(
        &self,
        tenant_id: &str,
        out: W,
        progress_id: Option<&str>,
    ) -> CoreResult<(W, ExportReport)>
    where
        W: Write + Seek + Send,
    {
        let progress = ProgressHandle::new(self.progress.as_ref(), progress_id);
        let mut writer = ArchiveWriter::new(out, self.config.compression_level);
        let mut report = ExportReport::default();

        let metadata = ArchiveMetadata::current(self.registry.filenames());
        writer
            .add_json(METADATA_PATH, &metadata)
            .map_err(|e| CoreError::internal("Failed to write backup metadata").with_source(e))?;

        for descriptor in self.registry.descriptors() {
            let filename = descriptor.filename();
            let mut dump = Vec::new();
            let rows = match descriptor
                .write_dump(&self.db, tenant_id, DUMP_PAGE_SIZE, &mut dump)
                .await
            {
                Ok(rows) => rows,
                Err(e) => {
                    warn!("Failed to export {}: {}", filename, e);
                    report.failed_models.push(filename.to_string());
                    dump = EMPTY_DUMP.to_vec();
                    0
                }
            };

            writer
                .add_bytes(&model_entry_path(filename), &dump)
                .map_err(|e| {
                    CoreError::internal(format!("Failed to write {} to backup", filename))
                        .with_source(e)
                })?;
            debug!("Exported {} rows of {}", rows, filename);
            report.models.insert(filename.to_string(), rows);
        }

        let files = self.storage.list_files(tenant_id).await.map_err(|e| {
            CoreError::internal("Failed to list attachment files").with_source(e)
        })?;
        progress.set_total(files.len() as u64).await;

        let batch_size = self.config.backup_file_batch_size.max(1);
        for (index, file) in files.iter().enumerate() {
            if file.size > self.config.max_backup_file_size {
                warn!(
                    "Skipping {} from backup: {} bytes exceeds the {} byte limit",
                    file.relative_path, file.size, self.config.max_backup_file_size
                );
                report.files_skipped += 1;
            } else {
                match self.storage.open(tenant_id, &file.relative_path).await {
                    Ok(mut handle) => {
                        let entry = upload_entry_path(&file.relative_path);
                        match writer.add_file(&entry, &mut handle, file.size).await {
                            Ok(_) => report.files_included += 1,
                            Err(e) => {
                                warn!("Failed to add {} to backup: {}", file.relative_path, e);
                                report.files_skipped += 1;
                            }
                        }
                    }
                    Err(e) => {
                        warn!("Failed to open {} for backup: {}", file.relative_path, e);
                        report.files_skipped += 1;
                    }
                }
            }

            let processed = index + 1;
            if processed % batch_size == 0 || processed == files.len() {
                debug!("Backed up {}/{} files", processed, files.len());
                progress.set_current(processed as u64).await;
            }
        }

        let out = writer
            .finish()
            .map_err(|e| CoreError::internal("Failed to finalize backup").with_source(e))?;

        info!(
            "Exported backup for {}: {} models, {} files included, {} skipped",
            tenant_id,
            report.models.len(),
            report.files_included,
            report.files_skipped
        );
        Ok((out, report))
    }

    pub async fn export_to_vec(
        &self,
        tenant_id: &str,
        progress_id: Option<&str>,
    ) -> CoreResult<(Vec<u8>, ExportReport)> {
        let (cursor, report) = self
            .export(tenant_id, Cursor::new(Vec::new()), progress_id)
            .await?;
        Ok((cursor.into_inner(), report))
    }
}
