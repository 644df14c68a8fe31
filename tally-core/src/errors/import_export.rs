//! Import and export error types
//!
//! Per-item errors raised inside the backup, restore and CSV pipelines. They
//! are logged and counted at the item boundary; only the pipeline entry
//! points convert them into [`CoreError`](super::CoreError).
//!
//! # Examples
//!
//! ```rust
//! use tally::errors::ImportExportError;
//!
//! let err = ImportExportError::MissingData("id".to_string());
//! assert!(err.is_client_error());
//!
//! let err = ImportExportError::ExportFailed("disk full".to_string());
//! assert!(!err.is_client_error());
//! ```

use thiserror::Error;

/// Import and export operation errors
#[derive(Error, Debug)]
pub enum ImportExportError {
    /// Export operation failed
    #[error("Export failed: {0}")]
    ExportFailed(String),

    /// A dumped row does not decode into its model
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Zip container error
    #[error("Archive error: {0}")]
    ArchiveError(#[from] zip::result::ZipError),

    /// Missing required data
    #[error("Missing required data: {0}")]
    MissingData(String),

    /// Path escapes the storage root
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

impl ImportExportError {
    /// Check if this is a client error (400-series)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ImportExportError::MissingData(_) | ImportExportError::InvalidPath(_)
        )
    }
}
