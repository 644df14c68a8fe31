//! Layout of the backup container.
//!
//! ```text
//! data/metadata.json   { "version": "1.0", "timestamp": ..., "models": [...] }
//! data/<model>.json    JSON array of rows, one file per registered model
//! data/uploads/<path>  mirror of the tenant's attachment storage
//! ```

pub mod reader;
pub mod writer;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{CoreError, CoreResult};

pub use reader::ArchiveReader;
pub use writer::ArchiveWriter;

pub const DATA_DIR: &str = "data";
pub const METADATA_PATH: &str = "data/metadata.json";
pub const UPLOADS_DIR: &str = "data/uploads";

pub const CURRENT_VERSION: &str = "1.0";
pub const SUPPORTED_VERSIONS: &[&str] = &[CURRENT_VERSION];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveMetadata {
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub models: Vec<String>,
}

impl ArchiveMetadata {
    pub fn current(models: Vec<String>) -> Self {
        Self {
            version: CURRENT_VERSION.to_string(),
            timestamp: Utc::now(),
            models,
        }
    }
}

pub fn model_entry_path(filename: &str) -> String {
    format!("{}/{}", DATA_DIR, filename)
}

pub fn upload_entry_path(relative_path: &str) -> String {
    format!("{}/{}", UPLOADS_DIR, relative_path.trim_start_matches('/'))
}

/// Checks a raw `metadata.json` document against the supported versions.
/// The version must be a string; anything else is reported as incompatible.
pub fn check_version(metadata: &Value) -> CoreResult<()> {
    match metadata.get("version") {
        Some(Value::String(version)) if SUPPORTED_VERSIONS.contains(&version.as_str()) => Ok(()),
        Some(Value::String(version)) => Err(CoreError::incompatible_version(
            version.as_str(),
            SUPPORTED_VERSIONS,
        )),
        Some(other) => Err(CoreError::incompatible_version(
            other.to_string(),
            SUPPORTED_VERSIONS,
        )),
        None => Err(CoreError::incompatible_version("<missing>", SUPPORTED_VERSIONS)),
    }
}
