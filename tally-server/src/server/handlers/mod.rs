pub mod backups;
pub mod health;
pub mod progress;
pub mod transactions_csv;

use std::io::{Seek, SeekFrom};

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderValue};
use futures_util::stream;
use tokio::io::AsyncReadExt;

use tally::errors::CoreError;

use super::app::AppState;
use super::error::ApiError;

const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Binds the client-supplied progress id, if any, to the requesting tenant.
pub(crate) async fn claim_progress(
    state: &AppState,
    tenant_id: &str,
    progress_id: Option<&str>,
    kind: &str,
) -> Result<(), ApiError> {
    if let Some(id) = progress_id {
        state.ctx.progress().claim(id, tenant_id, kind).await?;
    }
    Ok(())
}

/// Download headers for an attachment response.
pub(crate) fn attachment_headers(
    content_type: &'static str,
    filename: &str,
) -> Result<HeaderMap, ApiError> {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename))
            .map_err(|e| ApiError(CoreError::internal("Invalid file name").with_source(e)))?,
    );
    Ok(headers)
}

/// Streams a spooled temporary file back to the client in fixed-size chunks.
pub(crate) fn spooled_body(mut file: std::fs::File) -> Result<Body, ApiError> {
    file.seek(SeekFrom::Start(0))
        .map_err(|e| ApiError(CoreError::internal("Failed to rewind export").with_source(e)))?;
    let file = tokio::fs::File::from_std(file);

    let chunks = stream::unfold(Some(file), |state| async move {
        let mut file = state?;
        let mut buffer = vec![0u8; STREAM_CHUNK_SIZE];
        match file.read(&mut buffer).await {
            Ok(0) => None,
            Ok(read) => {
                buffer.truncate(read);
                Some((Ok(Bytes::from(buffer)), Some(file)))
            }
            Err(e) => Some((Err::<Bytes, std::io::Error>(e), None)),
        }
    });
    Ok(Body::from_stream(chunks))
}

/// Anonymous temporary file for building containers that may not fit in
/// memory.
pub(crate) fn spool_file() -> Result<std::fs::File, ApiError> {
    tempfile::tempfile().map_err(|e| {
        ApiError(CoreError::unavailable("Failed to create a temporary file").with_source(e))
    })
}
