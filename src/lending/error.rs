//! Error taxonomy shared by the lending core and the service layer

use thiserror::Error;

use crate::db::StoreError;

/// Coarse classification used by callers deciding how to respond
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or insufficient credentials
    AccessDenied,
    /// A normal rejection by business rules
    BusinessRule,
    /// Safe to retry
    Transient,
    /// Unexpected failure below the business rules
    Internal,
}

#[derive(Debug, Error)]
pub enum LendingError {
    #[error("authentication required")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("book {0} is not available")]
    BookUnavailable(String),

    #[error("loan {0} has already been returned")]
    AlreadyReturned(String),

    /// A concurrent update won the race and retries were exhausted
    #[error("concurrent update conflict: {0}")]
    Conflict(String),

    #[error("operation deadline exceeded")]
    Timeout,

    #[error("document store unavailable: {0}")]
    Unavailable(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{0} is not supported yet")]
    Unsupported(&'static str),

    #[error("document store failure")]
    StoreFailure(#[source] StoreError),

    /// Credential hashing or token signing failed
    #[error("internal error: {0}")]
    Internal(String),
}

impl LendingError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        LendingError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        LendingError::InvalidInput(reason.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LendingError::Unauthorized | LendingError::Forbidden(_) => ErrorKind::AccessDenied,
            LendingError::NotFound { .. }
            | LendingError::BookUnavailable(_)
            | LendingError::AlreadyReturned(_)
            | LendingError::InvalidInput(_)
            | LendingError::Unsupported(_) => ErrorKind::BusinessRule,
            LendingError::Conflict(_) | LendingError::Timeout | LendingError::Unavailable(_) => {
                ErrorKind::Transient
            }
            LendingError::StoreFailure(_) | LendingError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            LendingError::Unauthorized => "UNAUTHORIZED",
            LendingError::Forbidden(_) => "FORBIDDEN",
            LendingError::NotFound { .. } => "NOT_FOUND",
            LendingError::BookUnavailable(_) => "BOOK_UNAVAILABLE",
            LendingError::AlreadyReturned(_) => "ALREADY_RETURNED",
            LendingError::Conflict(_) => "CONFLICT",
            LendingError::Timeout => "TIMEOUT",
            LendingError::Unavailable(_) => "UNAVAILABLE",
            LendingError::InvalidInput(_) => "INVALID_INPUT",
            LendingError::Unsupported(_) => "UNSUPPORTED",
            LendingError::StoreFailure(_) => "STORE_FAILURE",
            LendingError::Internal(_) => "INTERNAL",
        }
    }

    /// Whether the ledger may retry the unit of work that produced this
    pub fn is_retryable_conflict(&self) -> bool {
        matches!(self, LendingError::Conflict(_) | LendingError::Unavailable(_))
    }
}

impl From<StoreError> for LendingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(reason) => LendingError::Conflict(reason),
            StoreError::Unavailable(reason) => LendingError::Unavailable(reason),
            other => LendingError::StoreFailure(other),
        }
    }
}

pub type LendingResult<T> = Result<T, LendingError>;
