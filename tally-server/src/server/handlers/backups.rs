use std::io::Cursor;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use tally::app_context::backup_filename;
use tally::errors::CoreError;

use super::{attachment_headers, claim_progress, spool_file, spooled_body};
use crate::server::app::AppState;
use crate::server::error::ApiResult;
use crate::server::tenant::Tenant;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DownloadParams {
    pub progress_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RestoreParams {
    pub purge: bool,
    pub progress_id: Option<String>,
}

pub async fn download_backup(
    State(state): State<AppState>,
    Tenant(tenant_id): Tenant,
    Query(params): Query<DownloadParams>,
) -> ApiResult<impl IntoResponse> {
    let progress_id = params.progress_id.as_deref();
    claim_progress(&state, &tenant_id, progress_id, "backup").await?;
    let spool = spool_file()?;
    let (file, report) = state
        .ctx
        .backup_service()
        .export(&tenant_id, spool, progress_id)
        .await?;
    info!(
        "Backup of {} ready: {} files included, {} skipped",
        tenant_id, report.files_included, report.files_skipped
    );

    let headers = attachment_headers("application/octet-stream", &backup_filename(Utc::now()))?;
    Ok((headers, spooled_body(file)?))
}

pub async fn restore_backup(
    State(state): State<AppState>,
    Tenant(tenant_id): Tenant,
    Query(params): Query<RestoreParams>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    if body.is_empty() {
        return Err(CoreError::validation("No file provided").into());
    }
    let progress_id = params.progress_id.as_deref();
    claim_progress(&state, &tenant_id, progress_id, "restore").await?;

    let report = state
        .ctx
        .restore_service()
        .restore(&tenant_id, Cursor::new(body), params.purge, progress_id)
        .await?;

    Ok(Json(json!({
        "success": true,
        "legacy": report.legacy,
        "models": report.models,
        "files": report.files,
    })))
}
