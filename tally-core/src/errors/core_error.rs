use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt;

use super::ImportExportError;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CoreErrorKind {
    NotFound,
    Validation,
    IncompatibleVersion,
    Unavailable,
    Internal,
}

/// Structured failure returned by every public data-portability operation.
///
/// Carries a user-facing message; the underlying cause, when any, is kept as
/// the error source so it can be logged without leaking into responses.
#[derive(Debug)]
pub struct CoreError {
    kind: CoreErrorKind,
    message: String,
    fields: Option<BTreeMap<String, String>>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl CoreError {
    pub fn new(kind: CoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            fields: None,
            source: None,
        }
    }

    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("entity".to_string(), entity.into());
        fields.insert("id".to_string(), id.into());

        Self {
            kind: CoreErrorKind::NotFound,
            message: "Resource not found".to_string(),
            fields: Some(fields),
            source: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(CoreErrorKind::Validation, message)
    }

    pub fn incompatible_version(found: impl Into<String>, supported: &[&str]) -> Self {
        let found = found.into();
        let mut fields = BTreeMap::new();
        fields.insert("found".to_string(), found.clone());
        fields.insert("supported".to_string(), supported.join(","));

        Self {
            kind: CoreErrorKind::IncompatibleVersion,
            message: format!(
                "Incompatible backup version '{}'. Supported versions: {}",
                found,
                supported.join(", ")
            ),
            fields: Some(fields),
            source: None,
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(CoreErrorKind::Unavailable, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(CoreErrorKind::Internal, message)
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> CoreErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn fields(&self) -> Option<&BTreeMap<String, String>> {
        self.fields.as_ref()
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl StdError for CoreError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<anyhow::Error> for CoreError {
    fn from(err: anyhow::Error) -> Self {
        Self {
            kind: CoreErrorKind::Internal,
            message: err.to_string(),
            fields: None,
            source: Some(err.into()),
        }
    }
}

impl From<sea_orm::DbErr> for CoreError {
    fn from(err: sea_orm::DbErr) -> Self {
        CoreError::internal("Database operation failed").with_source(err)
    }
}

impl From<ImportExportError> for CoreError {
    fn from(err: ImportExportError) -> Self {
        let kind = if err.is_client_error() {
            CoreErrorKind::Validation
        } else {
            CoreErrorKind::Internal
        };
        CoreError::new(kind, err.to_string()).with_source(err)
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
