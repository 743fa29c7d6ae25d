//! End-to-end lending scenarios against both document store backends

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use tempfile::TempDir;

use shelfmark::db::{
    Collection, Document, DocumentStore, DocumentStoreExt, Filter, MemoryStore, SqliteStore,
    StoreResult, UnitOfWork,
};
use shelfmark::lending::{
    Availability, AvailabilityPolicy, Book, FixedClock, Identity, LendingError, Loan, LoanLedger,
    LoanStatus, RequestContext, RetryConfig, Role, SystemClock, User,
};

// ============================================================================
// Fixtures
// ============================================================================

fn at(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 5,
        initial_interval: Duration::from_millis(1),
        max_interval: Duration::from_millis(20),
        multiplier: 2.0,
    }
}

fn ledger_with_clock(store: Arc<dyn DocumentStore>, clock: Arc<FixedClock>) -> LoanLedger {
    LoanLedger::new(store, AvailabilityPolicy::default(), clock, fast_retry())
}

fn ledger(store: Arc<dyn DocumentStore>) -> LoanLedger {
    LoanLedger::new(store, AvailabilityPolicy::default(), Arc::new(SystemClock), fast_retry())
}

fn as_user(user_id: &str, role: Role) -> RequestContext {
    RequestContext::authenticated(Identity::new(user_id, role), Duration::from_secs(30))
}

async fn add_book(store: &dyn DocumentStore, title: &str) -> String {
    let book = Book {
        title: title.to_string(),
        isbn: None,
        description: None,
        author_ids: vec![],
        publisher_id: None,
        published_year: None,
        page_count: None,
        language: None,
        category: None,
        tags: vec![],
        cover_image_url: None,
        availability: Availability::Available,
    };
    store.create(book).await.unwrap().id
}

async fn add_user(store: &dyn DocumentStore, name: &str, role: Role) -> String {
    let user = User {
        name: name.to_string(),
        email: format!("{}@example.org", name.to_lowercase()),
        password_hash: String::new(),
        role,
        favorite_genres: vec![],
        registered_at: at("2025-01-01T00:00:00Z"),
        active_loans: BTreeSet::new(),
    };
    store.create(user).await.unwrap().id
}

async fn open_sqlite() -> (TempDir, Arc<dyn DocumentStore>) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite:{}", dir.path().join("shelfmark.db").display());
    let store = SqliteStore::connect(&url, 8).await.unwrap();
    (dir, Arc::new(store))
}

/// Every book is checked out iff exactly one open loan references it, and
/// every user's active set equals their open loans.
async fn assert_consistent(store: &dyn DocumentStore) {
    let books = store.list::<Book>(&Filter::all()).await.unwrap();
    let users = store.list::<User>(&Filter::all()).await.unwrap();
    let loans = store.list::<Loan>(&Filter::all()).await.unwrap();

    let mut open_per_book: HashMap<&str, usize> = HashMap::new();
    let mut open_per_user: HashMap<&str, BTreeSet<String>> = HashMap::new();
    for loan in loans.iter().filter(|l| l.value.status == LoanStatus::Borrowed) {
        *open_per_book.entry(loan.value.book_id.as_str()).or_default() += 1;
        open_per_user
            .entry(loan.value.user_id.as_str())
            .or_default()
            .insert(loan.id.clone());
    }

    for book in &books {
        let open = open_per_book.get(book.id.as_str()).copied().unwrap_or(0);
        assert!(open <= 1, "book {} has {open} open loans", book.id);
        assert_eq!(
            book.value.availability == Availability::CheckedOut,
            open == 1,
            "book {} availability disagrees with its loans",
            book.id
        );
    }
    for user in &users {
        let expected = open_per_user.remove(user.id.as_str()).unwrap_or_default();
        assert_eq!(user.value.active_loans, expected, "user {}", user.id);
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_borrow_then_return_walkthrough() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let clock = Arc::new(FixedClock::new(at("2025-03-01T10:00:00Z")));
    let ledger = ledger_with_clock(store.clone(), clock);
    let b1 = add_book(store.as_ref(), "Dune").await;
    let u1 = add_user(store.as_ref(), "U1", Role::Reader).await;
    let u2 = add_user(store.as_ref(), "U2", Role::Reader).await;

    let l1 = ledger.borrow(&as_user(&u1, Role::Reader), &b1, &u1).await.unwrap();
    assert_eq!(l1.value.status, LoanStatus::Borrowed);
    assert_eq!(l1.value.due_at, at("2025-03-15T10:00:00Z"));
    let book = store.get::<Book>(&b1).await.unwrap().unwrap();
    assert_eq!(book.value.availability, Availability::CheckedOut);

    assert_matches!(
        ledger.borrow(&as_user(&u2, Role::Reader), &b1, &u2).await,
        Err(LendingError::BookUnavailable(_))
    );

    let returned = ledger.return_loan(&as_user(&u1, Role::Reader), &l1.id).await.unwrap();
    assert_eq!(returned.value.status, LoanStatus::Returned);
    let book = store.get::<Book>(&b1).await.unwrap().unwrap();
    assert_eq!(book.value.availability, Availability::Available);
    let user = store.get::<User>(&u1).await.unwrap().unwrap();
    assert!(!user.value.active_loans.contains(&l1.id));

    assert_consistent(store.as_ref()).await;
}

async fn race_for_one_book(store: Arc<dyn DocumentStore>, contenders: usize) {
    let ledger = ledger(store.clone());
    let book = add_book(store.as_ref(), "The Left Hand of Darkness").await;
    let mut users = Vec::new();
    for i in 0..contenders {
        users.push(add_user(store.as_ref(), &format!("Reader{i}"), Role::Reader).await);
    }

    let attempts = users.into_iter().map(|user| {
        let ledger = ledger.clone();
        let book = book.clone();
        tokio::spawn(async move {
            let ctx = as_user(&user, Role::Reader);
            ledger.borrow(&ctx, &book, &user).await
        })
    });
    let results: Vec<_> = futures::future::join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    for result in results.iter().filter(|r| r.is_err()) {
        assert_matches!(result, Err(LendingError::BookUnavailable(_)));
    }

    let loans = store.list::<Loan>(&Filter::all()).await.unwrap();
    assert_eq!(loans.len(), 1);
    assert_consistent(store.as_ref()).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_borrows_have_one_winner_in_memory() {
    race_for_one_book(Arc::new(MemoryStore::new()), 16).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_borrows_have_one_winner_on_sqlite() {
    let (_dir, store) = open_sqlite().await;
    race_for_one_book(store, 6).await;
}

#[tokio::test]
async fn test_random_sequences_keep_books_and_users_consistent() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let ledger = ledger(store.clone());
    let librarian = as_user("desk", Role::Librarian);

    let mut books = Vec::new();
    for i in 0..4 {
        books.push(add_book(store.as_ref(), &format!("Book {i}")).await);
    }
    let mut users = Vec::new();
    for i in 0..3 {
        users.push(add_user(store.as_ref(), &format!("User{i}"), Role::Reader).await);
    }

    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut open_loans: Vec<String> = Vec::new();
    for _ in 0..60 {
        if open_loans.is_empty() || rng.gen_bool(0.6) {
            let book = &books[rng.gen_range(0..books.len())];
            let user = &users[rng.gen_range(0..users.len())];
            match ledger.borrow(&librarian, book, user).await {
                Ok(loan) => open_loans.push(loan.id),
                Err(LendingError::BookUnavailable(_)) => {}
                Err(e) => panic!("unexpected borrow failure: {e}"),
            }
        } else {
            let loan = open_loans.swap_remove(rng.gen_range(0..open_loans.len()));
            ledger.return_loan(&librarian, &loan).await.unwrap();
            // A second return is always rejected
            assert_matches!(
                ledger.return_loan(&librarian, &loan).await,
                Err(LendingError::AlreadyReturned(_))
            );
        }
        assert_consistent(store.as_ref()).await;
    }
}

#[tokio::test]
async fn test_failed_unit_leaves_no_partial_writes() {
    let memory = MemoryStore::new();
    let store: Arc<dyn DocumentStore> = Arc::new(memory.clone());
    let ledger = ledger(store.clone());
    let book = add_book(store.as_ref(), "Dune").await;
    let user = add_user(store.as_ref(), "Ann", Role::Reader).await;

    // The loan is staged first, so the book update is the write that fails
    memory.fail_next_write(Collection::Books);
    assert_matches!(
        ledger.borrow(&as_user(&user, Role::Reader), &book, &user).await,
        Err(LendingError::StoreFailure(_))
    );

    assert_eq!(memory.count(Collection::Loans), 0);
    let stored = store.get::<Book>(&book).await.unwrap().unwrap();
    assert_eq!(stored.value.availability, Availability::Available);
    assert_eq!(stored.version, 1);
    let stored = store.get::<User>(&user).await.unwrap().unwrap();
    assert!(stored.value.active_loans.is_empty());

    // The fault was one-shot
    ledger.borrow(&as_user(&user, Role::Reader), &book, &user).await.unwrap();
    assert_consistent(store.as_ref()).await;
}

#[tokio::test]
async fn test_readers_act_only_for_themselves() {
    let (_dir, store) = open_sqlite().await;
    let ledger = ledger(store.clone());
    let book = add_book(store.as_ref(), "Dune").await;
    let ann = add_user(store.as_ref(), "Ann", Role::Reader).await;
    let bob = add_user(store.as_ref(), "Bob", Role::Reader).await;

    assert_matches!(
        ledger.borrow(&as_user(&bob, Role::Reader), &book, &ann).await,
        Err(LendingError::Forbidden(_))
    );

    let loan = ledger
        .borrow(&as_user("desk", Role::Librarian), &book, &ann)
        .await
        .unwrap();
    assert_matches!(
        ledger.return_loan(&as_user(&bob, Role::Reader), &loan.id).await,
        Err(LendingError::Forbidden(_))
    );
    assert_matches!(
        ledger.return_loan(&RequestContext::anonymous(Duration::from_secs(5)), &loan.id).await,
        Err(LendingError::Unauthorized)
    );

    ledger
        .return_loan(&as_user("root", Role::Admin), &loan.id)
        .await
        .unwrap();
    assert_consistent(store.as_ref()).await;
}

#[tokio::test]
async fn test_overdue_loans_follow_the_clock() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let clock = Arc::new(FixedClock::new(at("2025-03-01T10:00:00Z")));
    let ledger = ledger_with_clock(store.clone(), clock.clone());
    let desk = as_user("desk", Role::Librarian);
    let book = add_book(store.as_ref(), "Dune").await;
    let ann = add_user(store.as_ref(), "Ann", Role::Reader).await;

    let loan = ledger.borrow(&desk, &book, &ann).await.unwrap();
    assert!(ledger.overdue_loans(&desk).await.unwrap().is_empty());

    // Due exactly now is not yet overdue
    clock.set(loan.value.due_at);
    assert!(ledger.overdue_loans(&desk).await.unwrap().is_empty());

    clock.advance(chrono::Duration::days(1));
    let overdue = ledger.overdue_loans(&desk).await.unwrap();
    assert_eq!(overdue.len(), 1);
    assert_eq!(overdue[0].id, loan.id);
    assert_matches!(
        ledger.overdue_loans(&as_user(&ann, Role::Reader)).await,
        Err(LendingError::Forbidden(_))
    );

    ledger.return_loan(&desk, &loan.id).await.unwrap();
    assert!(ledger.overdue_loans(&desk).await.unwrap().is_empty());
}

// ============================================================================
// Deadlines
// ============================================================================

/// Store whose units of work stall before committing
struct SlowCommitStore {
    inner: MemoryStore,
    delay: Duration,
}

struct SlowUnit {
    inner: Box<dyn UnitOfWork>,
    delay: Duration,
}

#[async_trait]
impl DocumentStore for SlowCommitStore {
    fn backend(&self) -> &'static str {
        "slow-memory"
    }

    async fn find_by_id(&self, collection: Collection, id: &str) -> StoreResult<Option<Document>> {
        self.inner.find_by_id(collection, id).await
    }

    async fn find(&self, collection: Collection, filter: &Filter) -> StoreResult<Vec<Document>> {
        self.inner.find(collection, filter).await
    }

    async fn insert(&self, collection: Collection, body: Value) -> StoreResult<String> {
        self.inner.insert(collection, body).await
    }

    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        Ok(Box::new(SlowUnit {
            inner: self.inner.begin().await?,
            delay: self.delay,
        }))
    }
}

#[async_trait]
impl UnitOfWork for SlowUnit {
    async fn find_by_id(&mut self, collection: Collection, id: &str) -> StoreResult<Option<Document>> {
        self.inner.find_by_id(collection, id).await
    }

    async fn find(&mut self, collection: Collection, filter: &Filter) -> StoreResult<Vec<Document>> {
        self.inner.find(collection, filter).await
    }

    async fn insert(&mut self, collection: Collection, body: Value) -> StoreResult<String> {
        self.inner.insert(collection, body).await
    }

    async fn update(
        &mut self,
        collection: Collection,
        id: &str,
        expected_version: i64,
        body: Value,
    ) -> StoreResult<i64> {
        self.inner.update(collection, id, expected_version, body).await
    }

    async fn delete(&mut self, collection: Collection, id: &str, expected_version: i64) -> StoreResult<()> {
        self.inner.delete(collection, id, expected_version).await
    }

    async fn commit(&mut self) -> StoreResult<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.commit().await
    }

    async fn rollback(&mut self) -> StoreResult<()> {
        self.inner.rollback().await
    }
}

#[tokio::test]
async fn test_deadline_expiry_times_out_without_applying() {
    let memory = MemoryStore::new();
    let store: Arc<dyn DocumentStore> = Arc::new(SlowCommitStore {
        inner: memory.clone(),
        delay: Duration::from_millis(500),
    });
    let ledger = ledger(store.clone());
    let book = add_book(store.as_ref(), "Dune").await;
    let ann = add_user(store.as_ref(), "Ann", Role::Reader).await;

    let hurried = RequestContext::new(
        Some(Identity::new(ann.clone(), Role::Reader)),
        Duration::from_millis(50),
    );
    assert_matches!(
        ledger.borrow(&hurried, &book, &ann).await,
        Err(LendingError::Timeout)
    );

    assert_eq!(memory.count(Collection::Loans), 0);
    let stored = store.get::<Book>(&book).await.unwrap().unwrap();
    assert_eq!(stored.value.availability, Availability::Available);
    assert_consistent(store.as_ref()).await;
}
