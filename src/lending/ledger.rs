//! Borrow and return state machine
//!
//! A loan moves once from `Borrowed` to `Returned`. Each transition touches
//! three documents (loan, book, user) inside one unit of work so the book's
//! availability and the user's active-loan set never disagree with the loans
//! collection. Conflicting units are retried with backoff; every operation is
//! bounded by the request deadline.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::db::{DocumentStore, Stored, UnitOfWork, UnitOfWorkExt, commit_or_rollback};

use super::clock::Clock;
use super::error::{LendingError, LendingResult};
use super::gate::{self, STAFF};
use super::identity::{Identity, RequestContext};
use super::model::{Availability, Book, Loan, LoanStatus, User};
use super::policy::{AvailabilityPolicy, DEFAULT_LOAN_PERIOD_DAYS};
use super::retry::{RetryConfig, retry_conflicts};

/// Tunables for the lending core
#[derive(Debug, Clone)]
pub struct LendingConfig {
    pub loan_period_days: i64,
    /// Deadline applied to each request
    pub request_timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for LendingConfig {
    fn default() -> Self {
        Self {
            loan_period_days: DEFAULT_LOAN_PERIOD_DAYS,
            request_timeout: Duration::from_secs(10),
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Clone)]
pub struct LoanLedger {
    pub(super) store: Arc<dyn DocumentStore>,
    pub(super) policy: AvailabilityPolicy,
    pub(super) clock: Arc<dyn Clock>,
    retry: RetryConfig,
}

impl LoanLedger {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        policy: AvailabilityPolicy,
        clock: Arc<dyn Clock>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            store,
            policy,
            clock,
            retry,
        }
    }

    pub fn from_config(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>, config: &LendingConfig) -> Self {
        Self::new(
            store,
            AvailabilityPolicy::with_loan_days(config.loan_period_days),
            clock,
            config.retry.clone(),
        )
    }

    pub fn policy(&self) -> &AvailabilityPolicy {
        &self.policy
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Whether `loan` is overdue right now
    pub fn is_overdue(&self, loan: &Loan) -> bool {
        self.policy.is_overdue(loan, self.clock.now())
    }

    /// Lend `book_id` to `user_id`.
    ///
    /// Readers may borrow only for themselves; staff may borrow on behalf of
    /// anyone. Of several concurrent borrows of one book exactly one
    /// succeeds and the rest fail with [LendingError::BookUnavailable].
    pub async fn borrow(
        &self,
        ctx: &RequestContext,
        book_id: &str,
        user_id: &str,
    ) -> LendingResult<Stored<Loan>> {
        let actor = gate::authorize_owner_or(ctx.identity(), user_id, STAFF)?;
        debug!(book_id = %book_id, user_id = %user_id, actor = %actor.user_id, "Borrow requested");

        let loan = ctx
            .within_deadline(
                "borrow",
                retry_conflicts(|| self.try_borrow(book_id, user_id), &self.retry, "borrow"),
            )
            .await?;

        info!(
            loan_id = %loan.id,
            book_id = %book_id,
            user_id = %user_id,
            actor = %actor.user_id,
            due_at = %loan.value.due_at,
            "Book borrowed"
        );
        Ok(loan)
    }

    /// Close an open loan. Returning twice fails with
    /// [LendingError::AlreadyReturned] and changes nothing.
    pub async fn return_loan(&self, ctx: &RequestContext, loan_id: &str) -> LendingResult<Stored<Loan>> {
        let loan = ctx
            .within_deadline(
                "return",
                retry_conflicts(
                    || self.try_return(ctx.identity(), loan_id),
                    &self.retry,
                    "return",
                ),
            )
            .await?;

        info!(
            loan_id = %loan.id,
            book_id = %loan.value.book_id,
            user_id = %loan.value.user_id,
            actor = %ctx.identity().map(|i| i.user_id.as_str()).unwrap_or_default(),
            "Book returned"
        );
        Ok(loan)
    }

    /// Move a loan to `status`. Only the `Returned` transition exists.
    pub async fn update_loan(
        &self,
        ctx: &RequestContext,
        loan_id: &str,
        status: LoanStatus,
    ) -> LendingResult<Stored<Loan>> {
        match status {
            LoanStatus::Returned => self.return_loan(ctx, loan_id).await,
            LoanStatus::Borrowed => Err(LendingError::Unsupported("reopening a loan")),
        }
    }

    async fn try_borrow(&self, book_id: &str, user_id: &str) -> LendingResult<Stored<Loan>> {
        let mut uow = self.store.begin().await?;
        let staged = self.stage_borrow(uow.as_mut(), book_id, user_id).await;
        commit_or_rollback(uow, staged).await
    }

    async fn stage_borrow(
        &self,
        uow: &mut dyn UnitOfWork,
        book_id: &str,
        user_id: &str,
    ) -> LendingResult<Stored<Loan>> {
        let mut book = uow
            .get::<Book>(book_id)
            .await?
            .ok_or_else(|| LendingError::not_found("book", book_id))?;
        if !self.policy.can_borrow(&book.value) {
            return Err(LendingError::BookUnavailable(book_id.to_string()));
        }

        let mut user = uow
            .get::<User>(user_id)
            .await?
            .ok_or_else(|| LendingError::not_found("user", user_id))?;

        let borrowed_at = self.clock.now();
        let due_at = self.policy.compute_due_date(borrowed_at)?;
        let loan = uow.create(Loan::open(book_id, user_id, borrowed_at, due_at)).await?;

        book.value.availability = Availability::CheckedOut;
        uow.save(&mut book).await?;

        user.value.active_loans.insert(loan.id.clone());
        uow.save(&mut user).await?;

        Ok(loan)
    }

    async fn try_return(&self, identity: Option<&Identity>, loan_id: &str) -> LendingResult<Stored<Loan>> {
        let mut uow = self.store.begin().await?;
        let staged = self.stage_return(uow.as_mut(), identity, loan_id).await;
        commit_or_rollback(uow, staged).await
    }

    async fn stage_return(
        &self,
        uow: &mut dyn UnitOfWork,
        identity: Option<&Identity>,
        loan_id: &str,
    ) -> LendingResult<Stored<Loan>> {
        let mut loan = uow
            .get::<Loan>(loan_id)
            .await?
            .ok_or_else(|| LendingError::not_found("loan", loan_id))?;
        if loan.value.status == LoanStatus::Returned {
            return Err(LendingError::AlreadyReturned(loan_id.to_string()));
        }
        gate::authorize_owner_or(identity, &loan.value.user_id, STAFF)?;

        loan.value.status = LoanStatus::Returned;
        loan.value.returned_at = Some(self.clock.now());
        uow.save(&mut loan).await?;

        let mut book = uow
            .get::<Book>(&loan.value.book_id)
            .await?
            .ok_or_else(|| LendingError::not_found("book", loan.value.book_id.as_str()))?;
        book.value.availability = Availability::Available;
        uow.save(&mut book).await?;

        let mut user = uow
            .get::<User>(&loan.value.user_id)
            .await?
            .ok_or_else(|| LendingError::not_found("user", loan.value.user_id.as_str()))?;
        user.value.active_loans.remove(loan_id);
        uow.save(&mut user).await?;

        Ok(loan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Collection, DocumentStoreExt, MemoryStore};
    use crate::lending::clock::FixedClock;
    use crate::lending::model::Role;
    use crate::lending::testing::{at, seed_book, seed_user};
    use assert_matches::assert_matches;
    use chrono::Duration as ChronoDuration;

    struct Fixture {
        store: MemoryStore,
        ledger: LoanLedger,
        clock: Arc<FixedClock>,
        book: String,
        reader: String,
        other_reader: String,
    }

    async fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let clock = Arc::new(FixedClock::new(at("2025-03-01T10:00:00Z")));
        let book = seed_book(&store, "Dune").await;
        let reader = seed_user(&store, "Ann", Role::Reader).await;
        let other_reader = seed_user(&store, "Bob", Role::Reader).await;
        let ledger = LoanLedger::from_config(
            Arc::new(store.clone()),
            clock.clone(),
            &LendingConfig::default(),
        );
        Fixture {
            store,
            ledger,
            clock,
            book,
            reader,
            other_reader,
        }
    }

    fn ctx(user_id: &str, role: Role) -> RequestContext {
        RequestContext::authenticated(Identity::new(user_id, role), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_borrow_updates_all_three_documents() {
        let f = fixture().await;

        let loan = f
            .ledger
            .borrow(&ctx(&f.reader, Role::Reader), &f.book, &f.reader)
            .await
            .unwrap();

        assert_eq!(loan.value.status, LoanStatus::Borrowed);
        assert_eq!(loan.value.borrowed_at, at("2025-03-01T10:00:00Z"));
        assert_eq!(loan.value.due_at, at("2025-03-15T10:00:00Z"));

        let book = f.store.get::<Book>(&f.book).await.unwrap().unwrap();
        assert_eq!(book.value.availability, Availability::CheckedOut);
        let user = f.store.get::<User>(&f.reader).await.unwrap().unwrap();
        assert!(user.value.active_loans.contains(&loan.id));
    }

    #[tokio::test]
    async fn test_second_borrow_is_unavailable() {
        let f = fixture().await;
        f.ledger
            .borrow(&ctx(&f.reader, Role::Reader), &f.book, &f.reader)
            .await
            .unwrap();

        let second = f
            .ledger
            .borrow(&ctx(&f.other_reader, Role::Reader), &f.book, &f.other_reader)
            .await;
        assert_matches!(second, Err(LendingError::BookUnavailable(id)) if id == f.book);
        assert_eq!(f.store.count(Collection::Loans), 1);
    }

    #[tokio::test]
    async fn test_borrow_missing_entities() {
        let f = fixture().await;
        let staff = ctx("staff", Role::Librarian);

        assert_matches!(
            f.ledger.borrow(&staff, "no-such-book", &f.reader).await,
            Err(LendingError::NotFound { entity: "book", .. })
        );
        assert_matches!(
            f.ledger.borrow(&staff, &f.book, "no-such-user").await,
            Err(LendingError::NotFound { entity: "user", .. })
        );

        let book = f.store.get::<Book>(&f.book).await.unwrap().unwrap();
        assert_eq!(book.value.availability, Availability::Available);
    }

    #[tokio::test]
    async fn test_reader_cannot_borrow_for_someone_else() {
        let f = fixture().await;

        assert_matches!(
            f.ledger
                .borrow(&ctx(&f.reader, Role::Reader), &f.book, &f.other_reader)
                .await,
            Err(LendingError::Forbidden(_))
        );
        assert_matches!(
            f.ledger
                .borrow(&RequestContext::anonymous(Duration::from_secs(1)), &f.book, &f.reader)
                .await,
            Err(LendingError::Unauthorized)
        );

        let loan = f
            .ledger
            .borrow(&ctx("desk", Role::Librarian), &f.book, &f.other_reader)
            .await
            .unwrap();
        assert_eq!(loan.value.user_id, f.other_reader);
    }

    #[tokio::test]
    async fn test_return_restores_availability() {
        let f = fixture().await;
        let loan = f
            .ledger
            .borrow(&ctx(&f.reader, Role::Reader), &f.book, &f.reader)
            .await
            .unwrap();
        f.clock.advance(ChronoDuration::days(3));

        let returned = f
            .ledger
            .return_loan(&ctx(&f.reader, Role::Reader), &loan.id)
            .await
            .unwrap();
        assert_eq!(returned.value.status, LoanStatus::Returned);
        assert_eq!(returned.value.returned_at, Some(at("2025-03-04T10:00:00Z")));

        let book = f.store.get::<Book>(&f.book).await.unwrap().unwrap();
        assert_eq!(book.value.availability, Availability::Available);
        let user = f.store.get::<User>(&f.reader).await.unwrap().unwrap();
        assert!(user.value.active_loans.is_empty());
    }

    #[tokio::test]
    async fn test_second_return_changes_nothing() {
        let f = fixture().await;
        let reader = ctx(&f.reader, Role::Reader);
        let loan = f.ledger.borrow(&reader, &f.book, &f.reader).await.unwrap();
        let returned = f.ledger.return_loan(&reader, &loan.id).await.unwrap();

        assert_matches!(
            f.ledger.return_loan(&reader, &loan.id).await,
            Err(LendingError::AlreadyReturned(_))
        );
        let stored = f.store.get::<Loan>(&loan.id).await.unwrap().unwrap();
        assert_eq!(stored.version, returned.version);
    }

    #[tokio::test]
    async fn test_return_authorization() {
        let f = fixture().await;
        let loan = f
            .ledger
            .borrow(&ctx(&f.reader, Role::Reader), &f.book, &f.reader)
            .await
            .unwrap();

        assert_matches!(
            f.ledger
                .return_loan(&ctx(&f.other_reader, Role::Reader), &loan.id)
                .await,
            Err(LendingError::Forbidden(_))
        );
        assert_matches!(
            f.ledger
                .return_loan(&ctx(&f.reader, Role::Reader), "missing")
                .await,
            Err(LendingError::NotFound { entity: "loan", .. })
        );
        f.ledger
            .return_loan(&ctx("root", Role::Admin), &loan.id)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_update_loan() {
        let f = fixture().await;
        let staff = ctx("desk", Role::Librarian);
        let loan = f.ledger.borrow(&staff, &f.book, &f.reader).await.unwrap();

        assert_matches!(
            f.ledger.update_loan(&staff, &loan.id, LoanStatus::Borrowed).await,
            Err(LendingError::Unsupported(_))
        );
        let updated = f
            .ledger
            .update_loan(&staff, &loan.id, LoanStatus::Returned)
            .await
            .unwrap();
        assert_eq!(updated.value.status, LoanStatus::Returned);
    }

    #[tokio::test]
    async fn test_fault_mid_unit_leaves_no_trace() {
        let f = fixture().await;
        f.store.fail_next_write(Collection::Books);

        let result = f
            .ledger
            .borrow(&ctx(&f.reader, Role::Reader), &f.book, &f.reader)
            .await;
        assert_matches!(result, Err(LendingError::StoreFailure(_)));

        assert_eq!(f.store.count(Collection::Loans), 0);
        let book = f.store.get::<Book>(&f.book).await.unwrap().unwrap();
        assert_eq!(book.version, 1);
        let user = f.store.get::<User>(&f.reader).await.unwrap().unwrap();
        assert!(user.value.active_loans.is_empty());
    }

    #[tokio::test]
    async fn test_due_date_overflow_is_rejected_without_writes() {
        let f = fixture().await;
        f.clock.set(chrono::DateTime::<chrono::Utc>::MAX_UTC);

        let result = f
            .ledger
            .borrow(&ctx(&f.reader, Role::Reader), &f.book, &f.reader)
            .await;
        assert_matches!(result, Err(LendingError::InvalidInput(_)));
        assert_eq!(f.store.count(Collection::Loans), 0);
        let book = f.store.get::<Book>(&f.book).await.unwrap().unwrap();
        assert_eq!(book.value.availability, Availability::Available);
    }
}
