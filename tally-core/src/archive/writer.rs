use std::io::{Seek, Write};

use tokio::io::AsyncReadExt;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::errors::ImportExportResult;

const COPY_CHUNK_SIZE: usize = 64 * 1024;

/// Thin wrapper over a deflate [`ZipWriter`] with one compression level for
/// every entry.
pub struct ArchiveWriter<W: Write + Seek> {
    zip: ZipWriter<W>,
    compression_level: i32,
}

impl<W: Write + Seek> ArchiveWriter<W> {
    pub fn new(inner: W, compression_level: i32) -> Self {
        Self {
            zip: ZipWriter::new(inner),
            compression_level,
        }
    }

    fn options(&self, size_hint: u64) -> FileOptions {
        FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(self.compression_level))
            .large_file(size_hint >= u64::from(u32::MAX))
    }

    pub fn add_bytes(&mut self, path: &str, bytes: &[u8]) -> ImportExportResult<()> {
        let options = self.options(bytes.len() as u64);
        self.zip.start_file(path, options)?;
        self.zip.write_all(bytes)?;
        Ok(())
    }

    pub fn add_json<T: serde::Serialize>(
        &mut self,
        path: &str,
        value: &T,
    ) -> ImportExportResult<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.add_bytes(path, &bytes)
    }

    /// Copies an open file into a new entry in fixed-size chunks, so the
    /// whole file is never held in memory. Returns the bytes copied.
    pub async fn add_file(
        &mut self,
        path: &str,
        file: &mut tokio::fs::File,
        size_hint: u64,
    ) -> ImportExportResult<u64> {
        let options = self.options(size_hint);
        self.zip.start_file(path, options)?;

        let mut buffer = vec![0u8; COPY_CHUNK_SIZE];
        let mut copied = 0u64;
        loop {
            let read = file.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            self.zip.write_all(&buffer[..read])?;
            copied += read as u64;
        }
        Ok(copied)
    }

    pub fn finish(mut self) -> ImportExportResult<W> {
        Ok(self.zip.finish()?)
    }
}
