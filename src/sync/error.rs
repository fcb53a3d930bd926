use thiserror::Error;

use crate::api::ApiError;
use crate::storage::DatabaseError;

/// Failure kind the sync engines treat as recoverable.
pub type TransportError = ApiError;

/// Errors crossing the sync engines.
///
/// Only `Transport` is caught and turned into an `Error` envelope or a
/// mediator error result. Everything else ends the reconciliation.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Transport(#[from] ApiError),

    #[error(transparent)]
    Store(#[from] DatabaseError),

    /// Append was requested before any page of this query was stored
    #[error("No page cursor stored for search query {0:?}")]
    MissingCursor(String),
}

impl SyncError {
    pub fn is_transport(&self) -> bool {
        matches!(self, SyncError::Transport(_))
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        SyncError::Store(DatabaseError::from_sqlx(err))
    }
}
