//! Lending core: loans, availability and who may do what

pub mod clock;
pub mod error;
pub mod gate;
pub mod identity;
pub mod ledger;
pub mod model;
pub mod policy;
mod queries;
pub mod retry;

#[cfg(test)]
pub(crate) mod testing;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{ErrorKind, LendingError, LendingResult};
pub use identity::{Identity, RequestContext};
pub use ledger::{LendingConfig, LoanLedger};
pub use model::{Author, Availability, Book, Loan, LoanStatus, Publisher, Review, Role, User};
pub use policy::{AvailabilityPolicy, DEFAULT_LOAN_PERIOD_DAYS, MAX_LOAN_PERIOD_DAYS};
pub use retry::RetryConfig;
