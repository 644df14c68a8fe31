use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tracing::warn;

use crate::server::app::AppState;

#[derive(Debug, Serialize)]
pub struct HealthReport {
    status: &'static str,
    database: &'static str,
    version: &'static str,
}

/// Liveness plus a database round trip. Answers 503 while the database is
/// unreachable.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let (status, database) = match state.ctx.db().ping().await {
        Ok(()) => (StatusCode::OK, "up"),
        Err(e) => {
            warn!("Health check could not reach the database: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "down")
        }
    };
    let report = HealthReport {
        status: if status.is_success() { "healthy" } else { "degraded" },
        database,
        version: env!("CARGO_PKG_VERSION"),
    };
    (status, Json(report))
}
