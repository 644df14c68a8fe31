use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_BACKUP_FILE_SIZE: u64 = 64 * 1024 * 1024;
pub const DEFAULT_BACKUP_FILE_BATCH_SIZE: usize = 10;
pub const DEFAULT_CSV_ROW_BATCH_SIZE: u64 = 300;
pub const DEFAULT_CSV_ATTACHMENT_BATCH_SIZE: u64 = 50;
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 6;
pub const DEFAULT_MAX_UPLOAD_SIZE: usize = 512 * 1024 * 1024;

/// Knobs for the backup and CSV pipelines. Batch sizes bound how many rows
/// or files are held in memory at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortabilityConfig {
    /// Directory holding one upload folder per user.
    pub uploads_root: PathBuf,
    /// Attachments larger than this are left out of backups.
    pub max_backup_file_size: u64,
    /// Progress is reported after every batch of this many attachments.
    pub backup_file_batch_size: usize,
    pub csv_row_batch_size: u64,
    pub csv_attachment_batch_size: u64,
    /// Deflate level used for every container entry.
    pub compression_level: i32,
    /// Request body ceiling for uploaded backups and CSV files.
    pub max_upload_size: usize,
}

impl Default for PortabilityConfig {
    fn default() -> Self {
        Self {
            uploads_root: PathBuf::from("./uploads"),
            max_backup_file_size: DEFAULT_MAX_BACKUP_FILE_SIZE,
            backup_file_batch_size: DEFAULT_BACKUP_FILE_BATCH_SIZE,
            csv_row_batch_size: DEFAULT_CSV_ROW_BATCH_SIZE,
            csv_attachment_batch_size: DEFAULT_CSV_ATTACHMENT_BATCH_SIZE,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
        }
    }
}

impl PortabilityConfig {
    pub fn with_uploads_root(mut self, uploads_root: impl Into<PathBuf>) -> Self {
        self.uploads_root = uploads_root.into();
        self
    }

    /// Reads a TOML file; keys that are absent keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(raw).map_err(|e| anyhow!("Invalid portability config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by any `TALLY_*` variable that is set.
    pub fn from_env() -> Result<Self> {
        Self::default().apply_env()
    }

    pub fn apply_env(mut self) -> Result<Self> {
        if let Ok(root) = std::env::var("TALLY_UPLOADS_ROOT") {
            self.uploads_root = PathBuf::from(root);
        }
        if let Some(value) = env_number("TALLY_MAX_BACKUP_FILE_SIZE")? {
            self.max_backup_file_size = value;
        }
        if let Some(value) = env_number("TALLY_BACKUP_FILE_BATCH_SIZE")? {
            self.backup_file_batch_size = value;
        }
        if let Some(value) = env_number("TALLY_CSV_ROW_BATCH_SIZE")? {
            self.csv_row_batch_size = value;
        }
        if let Some(value) = env_number("TALLY_CSV_ATTACHMENT_BATCH_SIZE")? {
            self.csv_attachment_batch_size = value;
        }
        if let Some(value) = env_number("TALLY_COMPRESSION_LEVEL")? {
            self.compression_level = value;
        }
        if let Some(value) = env_number("TALLY_MAX_UPLOAD_SIZE")? {
            self.max_upload_size = value;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.backup_file_batch_size == 0
            || self.csv_row_batch_size == 0
            || self.csv_attachment_batch_size == 0
        {
            return Err(anyhow!("Batch sizes must be greater than zero"));
        }
        if !(0..=9).contains(&self.compression_level) {
            return Err(anyhow!(
                "Compression level must be between 0 and 9, got {}",
                self.compression_level
            ));
        }
        Ok(())
    }
}

fn env_number<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a number, got '{}'", key, raw)),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PortabilityConfig::default();
        assert_eq!(config.max_backup_file_size, 64 * 1024 * 1024);
        assert_eq!(config.backup_file_batch_size, 10);
        assert_eq!(config.csv_row_batch_size, 300);
        assert_eq!(config.csv_attachment_batch_size, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = PortabilityConfig::from_toml_str(
            r#"
uploads_root = "/srv/tally/uploads"
csv_row_batch_size = 100
"#,
        )
        .unwrap();
        assert_eq!(config.uploads_root, PathBuf::from("/srv/tally/uploads"));
        assert_eq!(config.csv_row_batch_size, 100);
        assert_eq!(config.backup_file_batch_size, 10);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(PortabilityConfig::from_toml_str("csv_row_batch_size = 0").is_err());
        assert!(PortabilityConfig::from_toml_str("compression_level = 12").is_err());
    }
}
