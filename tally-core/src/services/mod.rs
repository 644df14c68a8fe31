pub mod backup_service;
pub mod csv_export_service;
pub mod csv_import_service;
pub mod field_service;
pub mod progress_service;
pub mod reference_resolver;
pub mod restore_service;

pub use backup_service::{BackupService, ExportReport};
pub use csv_export_service::{CsvExportReport, CsvExportService, TransactionFilters};
pub use csv_import_service::{mapping_from_columns, parse_csv, ColumnMapping, CsvImportService};
pub use field_service::FieldService;
pub use progress_service::{DatabaseProgress, NoopProgress, ProgressReporter};
pub use reference_resolver::{code_from_name, ReferenceKind, ReferenceResolver};
pub use restore_service::{FileCounts, ModelCounts, RestoreReport, RestoreService};
