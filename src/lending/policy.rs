use chrono::{DateTime, Duration, Utc};

use super::error::{LendingError, LendingResult};
use super::model::{Availability, Book, Loan, LoanStatus};

pub const DEFAULT_LOAN_PERIOD_DAYS: i64 = 14;

/// Longest loan period accepted from configuration
pub const MAX_LOAN_PERIOD_DAYS: i64 = 3650;

/// Rules for borrowing and lateness
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvailabilityPolicy {
    loan_period: Duration,
}

impl Default for AvailabilityPolicy {
    fn default() -> Self {
        Self::with_loan_days(DEFAULT_LOAN_PERIOD_DAYS)
    }
}

impl AvailabilityPolicy {
    pub fn new(loan_period: Duration) -> Self {
        Self { loan_period }
    }

    /// Clamped to `1..=MAX_LOAN_PERIOD_DAYS`
    pub fn with_loan_days(days: i64) -> Self {
        Self::new(Duration::days(days.clamp(1, MAX_LOAN_PERIOD_DAYS)))
    }

    pub fn loan_period(&self) -> Duration {
        self.loan_period
    }

    pub fn can_borrow(&self, book: &Book) -> bool {
        book.availability == Availability::Available
    }

    pub fn compute_due_date(&self, borrowed_at: DateTime<Utc>) -> LendingResult<DateTime<Utc>> {
        borrowed_at
            .checked_add_signed(self.loan_period)
            .ok_or_else(|| {
                LendingError::invalid(format!("due date out of range for loan starting {borrowed_at}"))
            })
    }

    /// Strictly after the due instant; a returned loan is never overdue
    pub fn is_overdue(&self, loan: &Loan, now: DateTime<Utc>) -> bool {
        loan.status == LoanStatus::Borrowed && now > loan.due_at
    }
}
