use std::io::{Read, Seek};

use serde_json::Value;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::errors::{CoreError, CoreResult, ImportExportResult};

pub struct ArchiveReader<R: Read + Seek> {
    archive: ZipArchive<R>,
}

impl<R: Read + Seek> ArchiveReader<R> {
    /// Opens the container. A reader that is not a readable zip archive is
    /// rejected here, before anything else looks at it.
    pub fn open(inner: R) -> CoreResult<Self> {
        let archive = ZipArchive::new(inner).map_err(|e| {
            CoreError::validation("Backup file is corrupted or is not a zip archive").with_source(e)
        })?;
        Ok(Self { archive })
    }

    /// Bytes of the entry, or `None` when the container has no such entry.
    pub fn read_entry(&mut self, path: &str) -> ImportExportResult<Option<Vec<u8>>> {
        match self.archive.by_name(path) {
            Ok(mut file) => {
                let mut buffer = Vec::with_capacity(file.size() as usize);
                file.read_to_end(&mut buffer)?;
                Ok(Some(buffer))
            }
            Err(ZipError::FileNotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn read_json(&mut self, path: &str) -> ImportExportResult<Option<Value>> {
        match self.read_entry(path)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}
