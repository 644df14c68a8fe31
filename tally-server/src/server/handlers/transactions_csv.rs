use axum::body::{Body, Bytes};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use tally::app_context::transactions_export_filename;
use tally::errors::CoreError;
use tally::services::{parse_csv, ColumnMapping, TransactionFilters};

use super::{attachment_headers, claim_progress, spool_file, spooled_body};
use crate::server::app::AppState;
use crate::server::error::ApiResult;
use crate::server::tenant::Tenant;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportParams {
    pub search: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub ordering: Option<String>,
    pub category_code: Option<String>,
    pub project_code: Option<String>,
    /// Comma-separated field codes
    pub fields: Option<String>,
    pub include_attachments: bool,
    pub progress_id: Option<String>,
}

impl ExportParams {
    fn filters(&self) -> TransactionFilters {
        TransactionFilters {
            search: self.search.clone(),
            date_from: self.date_from.clone(),
            date_to: self.date_to.clone(),
            ordering: self.ordering.clone(),
            category_code: self.category_code.clone(),
            project_code: self.project_code.clone(),
        }
    }

    fn field_codes(&self) -> Vec<String> {
        self.fields
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(str::to_string)
            .collect()
    }
}

pub async fn export_transactions(
    State(state): State<AppState>,
    Tenant(tenant_id): Tenant,
    Query(params): Query<ExportParams>,
) -> ApiResult<impl IntoResponse> {
    let service = state.ctx.csv_export_service();
    let filters = params.filters();
    let field_codes = params.field_codes();
    let progress_id = params.progress_id.as_deref();
    claim_progress(&state, &tenant_id, progress_id, "transactions_export").await?;
    let filename = transactions_export_filename(params.include_attachments);

    if params.include_attachments {
        let spool = spool_file()?;
        let (file, _) = service
            .export_with_attachments(&tenant_id, &filters, &field_codes, spool, progress_id)
            .await?;
        let headers = attachment_headers("application/zip", filename)?;
        Ok((headers, spooled_body(file)?))
    } else {
        let (csv, _) = service
            .export_csv_to_vec(&tenant_id, &filters, &field_codes, progress_id)
            .await?;
        let headers = attachment_headers("text/csv; charset=utf-8", filename)?;
        Ok((headers, Body::from(csv)))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ParseParams {
    pub filename: String,
}

pub async fn parse_upload(
    Tenant(_tenant_id): Tenant,
    Query(params): Query<ParseParams>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let rows = parse_csv(&params.filename, &body)?;
    Ok(Json(json!({
        "success": true,
        "rows": rows,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRequest {
    pub rows: Vec<Vec<String>>,
    pub mapping: ColumnMapping,
    #[serde(default)]
    pub skip_header: bool,
}

pub async fn save_rows(
    State(state): State<AppState>,
    Tenant(tenant_id): Tenant,
    Json(request): Json<SaveRequest>,
) -> ApiResult<Json<Value>> {
    if request.rows.is_empty() {
        return Err(CoreError::validation("No rows to import").into());
    }
    let created = state
        .ctx
        .csv_import_service()
        .save(&tenant_id, &request.rows, &request.mapping, request.skip_header)
        .await?;

    Ok(Json(json!({
        "success": true,
        "created": created,
    })))
}
