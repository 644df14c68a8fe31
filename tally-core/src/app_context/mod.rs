use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::config::PortabilityConfig;
use crate::registry::ModelRegistry;
use crate::services::{
    BackupService, CsvExportService, CsvImportService, DatabaseProgress, FieldService,
    ProgressReporter, RestoreService,
};
use crate::storage::AttachmentStorage;

mod backup_operations;
mod csv_operations;

pub use backup_operations::backup_filename;
pub use csv_operations::transactions_export_filename;

/// Shared application context exposing the portability services to the CLI
/// and HTTP layers.
#[derive(Clone)]
pub struct AppContext {
    db: DatabaseConnection,
    config: PortabilityConfig,
    storage: AttachmentStorage,
    progress: Arc<DatabaseProgress>,
    field_service: Arc<FieldService>,
    backup_service: Arc<BackupService>,
    restore_service: Arc<RestoreService>,
    csv_export_service: Arc<CsvExportService>,
    csv_import_service: Arc<CsvImportService>,
}

impl AppContext {
    pub fn new(db: DatabaseConnection, config: PortabilityConfig) -> Self {
        Self::with_registry(db, config, ModelRegistry::standard())
    }

    pub fn with_registry(
        db: DatabaseConnection,
        config: PortabilityConfig,
        registry: ModelRegistry,
    ) -> Self {
        let storage = AttachmentStorage::new(config.uploads_root.clone());
        let progress = Arc::new(DatabaseProgress::new(db.clone()));
        let reporter: Arc<dyn ProgressReporter> = progress.clone();

        let field_service = Arc::new(FieldService::new(db.clone()));
        let backup_service = Arc::new(BackupService::new(
            db.clone(),
            storage.clone(),
            registry.clone(),
            config.clone(),
            reporter.clone(),
        ));
        let restore_service = Arc::new(RestoreService::new(
            db.clone(),
            storage.clone(),
            registry,
            reporter.clone(),
        ));
        let csv_export_service = Arc::new(CsvExportService::new(
            db.clone(),
            storage.clone(),
            config.clone(),
            reporter,
        ));
        let csv_import_service = Arc::new(CsvImportService::new(db.clone()));

        Self {
            db,
            config,
            storage,
            progress,
            field_service,
            backup_service,
            restore_service,
            csv_export_service,
            csv_import_service,
        }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn config(&self) -> &PortabilityConfig {
        &self.config
    }

    pub fn storage(&self) -> &AttachmentStorage {
        &self.storage
    }

    pub fn progress(&self) -> &Arc<DatabaseProgress> {
        &self.progress
    }

    pub fn field_service(&self) -> &Arc<FieldService> {
        &self.field_service
    }

    pub fn backup_service(&self) -> &Arc<BackupService> {
        &self.backup_service
    }

    pub fn restore_service(&self) -> &Arc<RestoreService> {
        &self.restore_service
    }

    pub fn csv_export_service(&self) -> &Arc<CsvExportService> {
        &self.csv_export_service
    }

    pub fn csv_import_service(&self) -> &Arc<CsvImportService> {
        &self.csv_import_service
    }
}
