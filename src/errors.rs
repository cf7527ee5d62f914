//! Typed error hierarchy for the board service.
//!
//! `StoreError` covers everything the storage layer can report. Callers
//! branch on the variant, never on message text: conflict handling, the
//! empty-state paths, and the transient-retry policy all key off the type.

use thiserror::Error;

/// Errors from the storage layer and the operations built on it.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// A conditional update matched zero rows: the row was already claimed,
    /// already completed, or the caller is not the assignee.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Authentication required: {0}")]
    NotAuthenticated(String),

    #[error("Invalid {field}: {message}")]
    Invalid { field: &'static str, message: String },

    /// Database or runtime failure. `transient` marks errors a caller may
    /// retry once (lock contention, I/O hiccups); everything else is
    /// permanent and must surface.
    #[error("Backend error: {source}")]
    Backend {
        #[source]
        source: anyhow::Error,
        transient: bool,
    },
}

impl StoreError {
    pub fn backend(source: anyhow::Error) -> Self {
        Self::Backend {
            source,
            transient: false,
        }
    }

    pub fn transient(source: anyhow::Error) -> Self {
        Self::Backend {
            source,
            transient: true,
        }
    }

    /// Whether a single retry is permitted for this error.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Backend {
                transient: true,
                ..
            }
        )
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        // SQLITE_BUSY / SQLITE_LOCKED are contention, not corruption.
        let transient = matches!(
            &e,
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::DatabaseBusy
                    || err.code == rusqlite::ErrorCode::DatabaseLocked
        );
        Self::Backend {
            source: anyhow::Error::new(e),
            transient,
        }
    }
}

impl From<anyhow::Error> for StoreError {
    fn from(e: anyhow::Error) -> Self {
        Self::backend(e)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
