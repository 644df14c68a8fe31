use axum::extract::{Path, State};
use axum::Json;

use tally::database::entities::progress;
use tally::errors::CoreError;

use crate::server::app::AppState;
use crate::server::error::ApiResult;
use crate::server::tenant::Tenant;

/// Progress of a running export or restore. Only the tenant that claimed the
/// id can see it; anything else is reported as missing.
pub async fn get_progress(
    State(state): State<AppState>,
    Tenant(tenant_id): Tenant,
    Path(id): Path<String>,
) -> ApiResult<Json<progress::Model>> {
    let record = state.ctx.progress().get(&id).await?;
    if record.user_id.as_deref() != Some(tenant_id.as_str()) {
        return Err(CoreError::not_found("Progress", id).into());
    }
    Ok(Json(record))
}
