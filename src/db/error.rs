//! Errors raised by document store backends

use thiserror::Error;

use super::Collection;

/// Failure of a document store operation
#[derive(Debug, Error)]
pub enum StoreError {
    /// An optimistic version check failed or the backend reported a write
    /// conflict. Nothing from the unit of work was applied.
    #[error("write conflict: {0}")]
    Conflict(String),

    /// The backend could not be reached in time (pool exhausted, busy timeout)
    #[error("document store unavailable: {0}")]
    Unavailable(String),

    /// A document targeted by an update does not exist
    #[error("{collection}/{id} does not exist")]
    Missing { collection: Collection, id: String },

    /// The unit of work was already committed or rolled back
    #[error("unit of work is already finished")]
    Finished,

    /// A fault injected by a test double
    #[error("injected fault while writing to {0}")]
    Fault(Collection),

    #[error("document {collection}/{id} is corrupt: {reason}")]
    Corrupt {
        collection: Collection,
        id: String,
        reason: String,
    },

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Backend(#[source] sqlx::Error),
}

impl StoreError {
    /// Whether retrying the whole unit of work may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Conflict(_) | StoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        // SQLITE_BUSY and SQLITE_LOCKED plus their extended codes
        let busy = match &err {
            sqlx::Error::Database(db_err) => matches!(
                db_err.code().as_deref(),
                Some("5" | "6" | "261" | "262" | "517" | "773")
            ),
            _ => false,
        };
        if busy {
            return StoreError::Conflict(err.to_string());
        }

        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                StoreError::Unavailable(err.to_string())
            }
            other => StoreError::Backend(other),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
