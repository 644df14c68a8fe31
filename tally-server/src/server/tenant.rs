use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use tally::errors::CoreError;

use super::error::ApiError;

pub const TENANT_HEADER: &str = "x-tenant-id";

/// The account every request acts on, taken from the `x-tenant-id` header.
#[derive(Debug, Clone)]
pub struct Tenant(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for Tenant
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(TENANT_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| Tenant(value.to_string()))
            .ok_or_else(|| {
                ApiError(CoreError::validation(format!(
                    "Missing {} header",
                    TENANT_HEADER
                )))
            })
    }
}
