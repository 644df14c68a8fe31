use std::collections::{BTreeMap, HashSet};
use std::io::{Cursor, Read, Seek};
use std::sync::Arc;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::archive::{
    check_version, model_entry_path, upload_entry_path, ArchiveReader, METADATA_PATH,
};
use crate::coercion::coerce_row;
use crate::database::entities::{files, users};
use crate::errors::{CoreError, CoreResult, ImportExportError};
use crate::registry::{ModelDescriptor, ModelRegistry};
use crate::services::field_service::FieldService;
use crate::services::progress_service::{ProgressHandle, ProgressReporter};
use crate::storage::{normalize_record_path, sanitize_relative_path, AttachmentStorage};

const FILE_PAGE_SIZE: u64 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ModelCounts {
    pub restored: u64,
    /// Rows without an identity value
    pub skipped: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FileCounts {
    pub restored: u64,
    /// Attachment records whose file is not in the container
    pub skipped: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    pub models: BTreeMap<String, ModelCounts>,
    pub files: FileCounts,
    /// The container had no metadata and was restored as a legacy backup
    pub legacy: bool,
}

impl RestoreReport {
    pub fn restored_rows(&self) -> u64 {
        self.models.values().map(|counts| counts.restored).sum()
    }
}

/// Restores a backup container into a tenant.
#[derive(Clone)]
pub struct RestoreService {
    db: DatabaseConnection,
    storage: AttachmentStorage,
    registry: ModelRegistry,
    progress: Arc<dyn ProgressReporter>,
}

impl RestoreService {
    pub fn new(
        db: DatabaseConnection,
        storage: AttachmentStorage,
        registry: ModelRegistry,
        progress: Arc<dyn ProgressReporter>,
    ) -> Self {
        Self {
            db,
            storage,
            registry,
            progress,
        }
    }

    pub async fn restore_bytes(
        &self,
        tenant_id: &str,
        container: Vec<u8>,
        purge_existing: bool,
        progress_id: Option<&str>,
    ) -> CoreResult<RestoreReport> {
        self.restore(tenant_id, Cursor::new(container), purge_existing, progress_id)
            .await
    }

    /// Restores every model dump and attachment found in the container.
    ///
    /// An unreadable container, an unsupported version or an unknown tenant
    /// fail before anything is changed. After that the restore is best
    /// effort: rows and files that cannot be restored are logged and counted
    /// in the report.
    pub async fn restore<R>(
        &self,
        tenant_id: &str,
        container: R,
        purge_existing: bool,
        progress_id: Option<&str>,
    ) -> CoreResult<RestoreReport>
    where
        R: Read + Seek + Send,
    {
        let mut reader = ArchiveReader::open(container)?;
        let mut report = RestoreReport::default();

        match reader.read_json(METADATA_PATH) {
            Ok(Some(metadata)) => check_version(&metadata)?,
            Ok(None) => {
                warn!("Backup has no {}, restoring it as a legacy backup", METADATA_PATH);
                report.legacy = true;
            }
            Err(e) => {
                return Err(CoreError::validation("Backup metadata is unreadable").with_source(e))
            }
        }

        let tenant = users::Entity::find_by_id(tenant_id.to_string())
            .one(&self.db)
            .await
            .map_err(|e| CoreError::internal("Failed to load user").with_source(e))?;
        if tenant.is_none() {
            return Err(CoreError::not_found("User", tenant_id));
        }

        if purge_existing {
            self.purge(tenant_id).await;
        }

        let progress = ProgressHandle::new(self.progress.as_ref(), progress_id);
        progress
            .set_total(self.registry.descriptors().len() as u64)
            .await;

        let fields = FieldService::new(self.db.clone());
        for (index, descriptor) in self.registry.descriptors().iter().enumerate() {
            let filename = descriptor.filename();
            let rows = match reader.read_json(&model_entry_path(filename)) {
                Ok(Some(Value::Array(rows))) => rows,
                Ok(Some(_)) => {
                    warn!("{} is not a JSON array, skipping it", filename);
                    continue;
                }
                Ok(None) => {
                    debug!("Backup has no {}", filename);
                    continue;
                }
                Err(e) => {
                    warn!("Failed to read {} from backup: {}", filename, e);
                    continue;
                }
            };

            // Extra fields are known once fields.json has been restored
            let extra_codes = match descriptor.extra_bag_field() {
                Some(_) => match fields.extra_field_codes(tenant_id).await {
                    Ok(codes) => Some(codes),
                    Err(e) => {
                        warn!("Keeping extra fields of {} unchecked: {}", filename, e);
                        None
                    }
                },
                None => None,
            };

            let counts = self
                .restore_rows(tenant_id, descriptor.as_ref(), rows, extra_codes.as_ref())
                .await;
            info!(
                "Restored {}: {} rows, {} skipped, {} failed",
                filename, counts.restored, counts.skipped, counts.failed
            );
            report.models.insert(filename.to_string(), counts);
            progress.set_current(index as u64 + 1).await;
        }

        report.files = self.restore_files(tenant_id, &mut reader).await?;

        info!(
            "Restored backup for {}: {} rows, {} files restored, {} skipped, {} failed",
            tenant_id,
            report.restored_rows(),
            report.files.restored,
            report.files.skipped,
            report.files.failed
        );
        Ok(report)
    }

    /// Deletes the tenant's rows, dependents first, and its attachment
    /// directory. Failures are logged and the purge moves on.
    async fn purge(&self, tenant_id: &str) {
        for descriptor in self.registry.purge_order() {
            match descriptor.delete_rows(&self.db, tenant_id).await {
                Ok(deleted) => debug!("Purged {} rows of {}", deleted, descriptor.filename()),
                Err(e) => warn!("Failed to purge {}: {}", descriptor.filename(), e),
            }
        }
        if let Err(e) = self.storage.remove_tenant_root(tenant_id).await {
            warn!("Failed to remove attachment directory of {}: {}", tenant_id, e);
        }
    }

    async fn restore_rows(
        &self,
        tenant_id: &str,
        descriptor: &dyn ModelDescriptor,
        rows: Vec<Value>,
        extra_codes: Option<&HashSet<String>>,
    ) -> ModelCounts {
        let filename = descriptor.filename();
        let identity = descriptor.identity_field();
        let text_fields = descriptor.text_fields();
        let mut counts = ModelCounts::default();

        for (position, row) in rows.into_iter().enumerate() {
            let mut raw = match row {
                Value::Object(raw) => raw,
                _ => {
                    warn!("{} row {} is not an object, skipping it", filename, position);
                    counts.skipped += 1;
                    continue;
                }
            };
            if raw.get(identity).map_or(true, Value::is_null) {
                warn!("{} row {} has no {}, skipping it", filename, position, identity);
                counts.skipped += 1;
                continue;
            }

            if let (Some(bag), Some(allowed)) = (descriptor.extra_bag_field(), extra_codes) {
                drop_unknown_extra_keys(&mut raw, bag, allowed, filename);
            }

            // Rows written by this application decode as they are. Older
            // dumps may carry numbers or dates as strings; those get coerced.
            let result = match descriptor.upsert_row(&self.db, tenant_id, raw.clone()).await {
                Err(ImportExportError::SerializationError(_)) => {
                    let mut coerced = coerce_row(&raw, identity);
                    for field in &text_fields {
                        if let Some(value) = raw.get(field) {
                            coerced.insert(field.clone(), value.clone());
                        }
                    }
                    descriptor.upsert_row(&self.db, tenant_id, coerced).await
                }
                other => other,
            };

            match result {
                Ok(()) => counts.restored += 1,
                Err(e) => {
                    warn!("Failed to restore {} row {}: {}", filename, position, e);
                    counts.failed += 1;
                }
            }
        }

        counts
    }

    async fn restore_files<R>(
        &self,
        tenant_id: &str,
        reader: &mut ArchiveReader<R>,
    ) -> CoreResult<FileCounts>
    where
        R: Read + Seek + Send,
    {
        let mut counts = FileCounts::default();
        let mut pages = files::Entity::find()
            .filter(files::Column::UserId.eq(tenant_id))
            .order_by_asc(files::Column::Id)
            .paginate(&self.db, FILE_PAGE_SIZE);

        while let Some(records) = pages
            .fetch_and_next()
            .await
            .map_err(|e| CoreError::internal("Failed to load file records").with_source(e))?
        {
            for record in records {
                let relative = normalize_record_path(&record.path);
                if let Err(e) = sanitize_relative_path(&relative) {
                    warn!("File {} has an unusable path: {}", record.id, e);
                    counts.failed += 1;
                    continue;
                }

                let bytes = match reader.read_entry(&upload_entry_path(&relative)) {
                    Ok(Some(bytes)) => bytes,
                    Ok(None) => {
                        warn!(
                            "File {} ({}) is not in the backup, skipping it",
                            record.id, relative
                        );
                        counts.skipped += 1;
                        continue;
                    }
                    Err(e) => {
                        warn!("Failed to read {} from backup: {}", relative, e);
                        counts.failed += 1;
                        continue;
                    }
                };

                if let Err(e) = self.storage.write(tenant_id, &relative, &bytes).await {
                    warn!("Failed to write {}: {}", relative, e);
                    counts.failed += 1;
                    continue;
                }

                if record.path != relative {
                    let update = files::ActiveModel {
                        id: Set(record.id.clone()),
                        user_id: Set(record.user_id.clone()),
                        path: Set(relative.clone()),
                        ..Default::default()
                    };
                    if let Err(e) = update.update(&self.db).await {
                        warn!("Failed to update path of file {}: {}", record.id, e);
                        counts.failed += 1;
                        continue;
                    }
                }
                counts.restored += 1;
            }
        }

        Ok(counts)
    }
}

fn drop_unknown_extra_keys(
    row: &mut Map<String, Value>,
    bag: &str,
    allowed: &HashSet<String>,
    filename: &str,
) {
    if let Some(Value::Object(extra)) = row.get_mut(bag) {
        extra.retain(|code, _| {
            let known = allowed.contains(code);
            if !known {
                warn!("Dropping unknown extra field '{}' from {}", code, filename);
            }
            known
        });
    }
}
