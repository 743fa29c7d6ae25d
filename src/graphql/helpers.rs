// Helper functions shared across GraphQL query/mutation modules.

use async_graphql::{ErrorExtensions, Result};
use tracing::{error, warn};

use crate::db::Stored;
use crate::graphql::types::Loan;
use crate::lending::{self, ErrorKind, LendingError, LendingResult, LoanLedger};

impl ErrorExtensions for LendingError {
    fn extend(&self) -> async_graphql::Error {
        let code = self.code();
        let retryable = self.kind() == ErrorKind::Transient;
        async_graphql::Error::new(self.to_string()).extend_with(move |_, e| {
            e.set("code", code);
            e.set("retryable", retryable);
        })
    }
}

/// Convert service results into GraphQL results carrying the error code
pub(crate) trait ServiceResultExt<T> {
    fn gql(self) -> Result<T>;
}

impl<T> ServiceResultExt<T> for LendingResult<T> {
    fn gql(self) -> Result<T> {
        self.map_err(|err| {
            match err.kind() {
                ErrorKind::Internal => error!(error = ?err, "Request failed"),
                ErrorKind::Transient => warn!(error = %err, "Request failed transiently"),
                ErrorKind::AccessDenied | ErrorKind::BusinessRule => {}
            }
            err.extend()
        })
    }
}

/// Convert a stored loan, computing `overdue` against the ledger's clock
pub(crate) fn loan_to_graphql(ledger: &LoanLedger, stored: Stored<lending::Loan>) -> Loan {
    let overdue = ledger.is_overdue(&stored.value);
    let l = stored.value;
    Loan {
        id: stored.id,
        book_id: l.book_id,
        user_id: l.user_id,
        borrowed_at: l.borrowed_at,
        due_at: l.due_at,
        returned_at: l.returned_at,
        status: l.status.into(),
        overdue,
    }
}

pub(crate) fn loans_to_graphql(ledger: &LoanLedger, loans: Vec<Stored<lending::Loan>>) -> Vec<Loan> {
    loans
        .into_iter()
        .map(|loan| loan_to_graphql(ledger, loan))
        .collect()
}

/// Convert a list of stored records with their `From` impl
pub(crate) fn convert_all<S, T: From<S>>(records: Vec<S>) -> Vec<T> {
    records.into_iter().map(T::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Collection, StoreError};

    fn extension(err: &async_graphql::Error, key: &str) -> Option<async_graphql::Value> {
        err.extensions.as_ref().and_then(|ext| ext.get(key).cloned())
    }

    #[test]
    fn test_error_codes_become_extensions() {
        let err: Result<()> = Err::<(), _>(LendingError::BookUnavailable("b1".into())).gql();
        let err = err.unwrap_err();
        assert_eq!(err.message, "book b1 is not available");
        assert_eq!(
            extension(&err, "code"),
            Some(async_graphql::Value::from("BOOK_UNAVAILABLE"))
        );
        assert_eq!(
            extension(&err, "retryable"),
            Some(async_graphql::Value::from(false))
        );
    }

    #[test]
    fn test_transient_errors_are_retryable() {
        let err: Result<()> = Err::<(), _>(LendingError::from(StoreError::Conflict("books/b1".into()))).gql();
        let err = err.unwrap_err();
        assert_eq!(extension(&err, "code"), Some(async_graphql::Value::from("CONFLICT")));
        assert_eq!(extension(&err, "retryable"), Some(async_graphql::Value::from(true)));

        let err: Result<()> = Err::<(), _>(LendingError::from(StoreError::Fault(Collection::Loans))).gql();
        assert_eq!(
            extension(&err.unwrap_err(), "code"),
            Some(async_graphql::Value::from("STORE_FAILURE"))
        );
    }
}
