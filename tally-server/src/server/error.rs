use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{error, warn};

use tally::errors::{CoreError, CoreErrorKind};

/// HTTP face of a [`CoreError`]: a status code and
/// `{ "success": false, "error": "<message>" }`.
#[derive(Debug)]
pub struct ApiError(pub CoreError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        status_for(self.0.kind())
    }
}

pub fn status_for(kind: CoreErrorKind) -> StatusCode {
    match kind {
        CoreErrorKind::NotFound => StatusCode::NOT_FOUND,
        CoreErrorKind::Validation => StatusCode::BAD_REQUEST,
        CoreErrorKind::IncompatibleVersion => StatusCode::UNPROCESSABLE_ENTITY,
        CoreErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        CoreErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let source = std::error::Error::source(&self.0)
            .map(|source| source.to_string())
            .unwrap_or_default();
        if status.is_server_error() {
            error!("{} ({})", self.0, source);
        } else {
            warn!("{}", self.0);
        }

        let body = Json(json!({
            "success": false,
            "error": self.0.message(),
        }));
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
