//! Read-only loan projections

use crate::db::{DocumentStoreExt, Filter, Stored};

use super::error::LendingResult;
use super::gate::{self, STAFF};
use super::identity::RequestContext;
use super::ledger::LoanLedger;
use super::model::{Loan, LoanStatus};

impl LoanLedger {
    /// Every loan, open or closed, held by `user_id`. Unordered.
    pub async fn loans_for_user(&self, ctx: &RequestContext, user_id: &str) -> LendingResult<Vec<Stored<Loan>>> {
        gate::authorize_owner_or(ctx.identity(), user_id, STAFF)?;

        ctx.within_deadline("loans_for_user", async {
            let loans = self.store.list::<Loan>(&Filter::eq("userId", user_id)).await?;
            Ok(loans)
        })
        .await
    }

    /// Open loans past their due date, evaluated now
    pub async fn overdue_loans(&self, ctx: &RequestContext) -> LendingResult<Vec<Stored<Loan>>> {
        gate::authorize(ctx.identity(), STAFF)?;

        ctx.within_deadline("overdue_loans", async {
            let now = self.clock.now();
            let open = self
                .store
                .list::<Loan>(&Filter::eq("status", LoanStatus::Borrowed.as_str()))
                .await?;
            Ok(open
                .into_iter()
                .filter(|loan| self.policy.is_overdue(&loan.value, now))
                .collect())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use assert_matches::assert_matches;
    use chrono::Duration as ChronoDuration;

    use crate::db::MemoryStore;
    use crate::lending::clock::FixedClock;
    use crate::lending::testing::{at, seed_book, seed_user};
    use crate::lending::{Identity, LendingConfig, LendingError, LoanLedger, RequestContext, Role};

    fn ctx(user_id: &str, role: Role) -> RequestContext {
        RequestContext::authenticated(Identity::new(user_id, role), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_loans_for_user_includes_returned() {
        let store = MemoryStore::new();
        let clock = Arc::new(FixedClock::new(at("2025-03-01T10:00:00Z")));
        let ledger = LoanLedger::from_config(Arc::new(store.clone()), clock, &LendingConfig::default());
        let first = seed_book(&store, "Dune").await;
        let second = seed_book(&store, "Emma").await;
        let reader = seed_user(&store, "Ann", Role::Reader).await;
        let other = seed_user(&store, "Bob", Role::Reader).await;
        let me = ctx(&reader, Role::Reader);

        let loan = ledger.borrow(&me, &first, &reader).await.unwrap();
        ledger.return_loan(&me, &loan.id).await.unwrap();
        ledger.borrow(&me, &second, &reader).await.unwrap();

        let loans = ledger.loans_for_user(&me, &reader).await.unwrap();
        assert_eq!(loans.len(), 2);

        assert_matches!(
            ledger.loans_for_user(&ctx(&other, Role::Reader), &reader).await,
            Err(LendingError::Forbidden(_))
        );
        let seen_by_staff = ledger
            .loans_for_user(&ctx("desk", Role::Librarian), &reader)
            .await
            .unwrap();
        assert_eq!(seen_by_staff.len(), 2);
        assert!(
            ledger
                .loans_for_user(&ctx(&other, Role::Reader), &other)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_overdue_loans() {
        let store = MemoryStore::new();
        let clock = Arc::new(FixedClock::new(at("2025-03-01T10:00:00Z")));
        let ledger = LoanLedger::from_config(
            Arc::new(store.clone()),
            clock.clone(),
            &LendingConfig::default(),
        );
        let book = seed_book(&store, "Dune").await;
        let reader = seed_user(&store, "Ann", Role::Reader).await;
        let staff = ctx("desk", Role::Librarian);

        let loan = ledger
            .borrow(&ctx(&reader, Role::Reader), &book, &reader)
            .await
            .unwrap();
        assert!(ledger.overdue_loans(&staff).await.unwrap().is_empty());

        clock.advance(ChronoDuration::days(15));
        let overdue = ledger.overdue_loans(&staff).await.unwrap();
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].id, loan.id);
        assert!(ledger.is_overdue(&overdue[0].value));

        assert_matches!(
            ledger.overdue_loans(&ctx(&reader, Role::Reader)).await,
            Err(LendingError::Forbidden(_))
        );

        ledger.return_loan(&staff, &loan.id).await.unwrap();
        assert!(ledger.overdue_loans(&staff).await.unwrap().is_empty());
    }
}
