//! Error types for tally-core
//!
//! - **CoreError**: the structured failure result every public operation
//!   returns (kind, user-facing message, optional fields and source).
//! - **ImportExportError**: per-item failures inside the backup, restore and
//!   CSV pipelines. These are logged and counted where they happen and only
//!   cross the public boundary when they are fatal.

pub mod core_error;
pub mod import_export;

pub use core_error::{CoreError, CoreErrorKind, CoreResult};
pub use import_export::ImportExportError;

/// Result type alias for import/export operations
pub type ImportExportResult<T> = Result<T, ImportExportError>;
