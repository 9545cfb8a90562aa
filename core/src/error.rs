use thiserror::Error;

use crate::models::{Field, Source};

/// Failures surfaced by a [`crate::store::LedgerStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("ledger store is busy: {0}")]
    Busy(String),
    #[error("ledger store rate limit hit")]
    RateLimited,
    #[error("ledger store unavailable: {0}")]
    Unavailable(String),
    #[error("ledger row {0} does not exist")]
    NoSuchRow(usize),
    #[error("ledger data is corrupt: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Backend(rusqlite::Error),
}

impl StoreError {
    /// Worth retrying after a pause.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Busy(_) | StoreError::RateLimited | StoreError::Unavailable(_)
        )
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
                StoreError::Busy(err.to_string())
            }
            Some(ErrorCode::CannotOpen) => StoreError::Unavailable(err.to_string()),
            _ => StoreError::Backend(err),
        }
    }
}

/// Outcome of a rejected or failed upsert.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("unknown source '{0}'")]
    UnknownSource(String),
    #[error("source '{source_name}' may not write {}", join_fields(.fields))]
    DisallowedFields {
        source_name: Source,
        fields: Vec<Field>,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LedgerError {
    /// Validation rejections never touched the store.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        !matches!(self, LedgerError::Store(_))
    }
}

fn join_fields(fields: &[Field]) -> String {
    fields
        .iter()
        .map(|f| f.header())
        .collect::<Vec<_>>()
        .join(", ")
}
