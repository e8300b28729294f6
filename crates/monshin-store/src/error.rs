use thiserror::Error;

/// Error taxonomy shared by every persistence adapter.
///
/// Reads of absent records return `Ok(None)` / empty collections; `NotFound`
/// is raised only where the target must exist (rename, user detail).
/// `Unavailable` means a configured external store could not be reached —
/// for session saves that is fatal and surfaced, never silently downgraded
/// to another backend. `NotImplemented` is distinct from "no data" so
/// callers can tell an unsupported operation from an empty result.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {what}")]
    NotFound { what: String },

    #[error("conflict: {what}")]
    Conflict { what: String },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("{backend} unavailable: {detail}")]
    Unavailable { backend: String, detail: String },

    #[error("{operation} is not implemented by the {backend} backend")]
    NotImplemented {
        backend: &'static str,
        operation: &'static str,
    },

    #[error(transparent)]
    Core(#[from] monshin_core::error::CoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("http error: {0}")]
    Http(String),
}

impl StoreError {
    pub fn not_found(what: impl Into<String>) -> Self {
        StoreError::NotFound { what: what.into() }
    }

    pub fn conflict(what: impl Into<String>) -> Self {
        StoreError::Conflict { what: what.into() }
    }

    pub fn unavailable(backend: impl Into<String>, detail: impl Into<String>) -> Self {
        StoreError::Unavailable {
            backend: backend.into(),
            detail: detail.into(),
        }
    }
}
