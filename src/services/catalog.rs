//! Catalog maintenance: books, authors, publishers and reviews
//!
//! Every modification of an existing record runs in a unit of work with a
//! version check, so an edit can never overwrite availability flipped by a
//! concurrent borrow.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::db::{
    DocumentStore, DocumentStoreExt, Entity, Filter, Stored, UnitOfWork, UnitOfWorkExt,
    commit_or_rollback,
};
use crate::lending::gate::{self, ADMIN_ONLY, ANY_ROLE, STAFF};
use crate::lending::retry::{RetryConfig, retry_conflicts};
use crate::lending::{
    Author, Availability, Book, LendingError, LendingResult, Publisher, RequestContext, Review, Role,
};

// ============================================================================
// Inputs
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct BookInput {
    pub title: String,
    pub isbn: Option<String>,
    pub description: Option<String>,
    pub author_ids: Vec<String>,
    pub publisher_id: Option<String>,
    pub published_year: Option<i32>,
    pub page_count: Option<i32>,
    pub language: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub cover_image_url: Option<String>,
}

/// Fields left as `None` are unchanged
#[derive(Debug, Clone, Default)]
pub struct BookUpdate {
    pub title: Option<String>,
    pub isbn: Option<String>,
    pub description: Option<String>,
    pub author_ids: Option<Vec<String>>,
    pub publisher_id: Option<String>,
    pub published_year: Option<i32>,
    pub page_count: Option<i32>,
    pub language: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub cover_image_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AuthorInput {
    pub name: String,
    pub biography: Option<String>,
    pub birth_date: Option<String>,
    pub nationality: Option<String>,
    pub awards: Vec<String>,
    pub website_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AuthorUpdate {
    pub name: Option<String>,
    pub biography: Option<String>,
    pub birth_date: Option<String>,
    pub nationality: Option<String>,
    pub awards: Option<Vec<String>>,
    pub website_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PublisherInput {
    pub name: String,
    pub founded_year: Option<i32>,
    pub location: Option<String>,
    pub website_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PublisherUpdate {
    pub name: Option<String>,
    pub founded_year: Option<i32>,
    pub location: Option<String>,
    pub website_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ReviewInput {
    pub rating: i32,
    pub review_text: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ReviewUpdate {
    pub rating: Option<i32>,
    pub review_text: Option<String>,
}

fn require_name(field: &str, value: &str) -> LendingResult<()> {
    if value.trim().is_empty() {
        return Err(LendingError::invalid(format!("{field} must not be empty")));
    }
    Ok(())
}

fn validate_rating(rating: i32) -> LendingResult<()> {
    if !(1..=5).contains(&rating) {
        return Err(LendingError::invalid(format!(
            "rating must be between 1 and 5, got {rating}"
        )));
    }
    Ok(())
}

fn set<T>(target: &mut T, value: &Option<T>)
where
    T: Clone,
{
    if let Some(value) = value {
        *target = value.clone();
    }
}

/// Trimmed copy of an optional name edit
fn trimmed(value: &Option<String>) -> Option<String> {
    value.as_deref().map(|v| v.trim().to_string())
}

fn set_opt<T>(target: &mut Option<T>, value: &Option<T>)
where
    T: Clone,
{
    if value.is_some() {
        *target = value.clone();
    }
}

// ============================================================================
// Record Helpers
// ============================================================================

/// Version-checked read-modify-write and delete shared by the services
#[derive(Clone)]
pub(crate) struct Records {
    store: Arc<dyn DocumentStore>,
    retry: RetryConfig,
}

impl Records {
    pub(crate) fn new(store: Arc<dyn DocumentStore>, retry: RetryConfig) -> Self {
        Self { store, retry }
    }

    pub(crate) fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub(crate) fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    pub(crate) async fn fetch<T: Entity>(&self, entity: &'static str, id: &str) -> LendingResult<Stored<T>> {
        self.store
            .get::<T>(id)
            .await?
            .ok_or_else(|| LendingError::not_found(entity, id))
    }

    /// Apply `apply` to the current record and write it back
    pub(crate) async fn modify<T, F>(&self, entity: &'static str, id: &str, apply: F) -> LendingResult<Stored<T>>
    where
        T: Entity,
        F: Fn(&mut T) -> LendingResult<()> + Send + Sync,
    {
        retry_conflicts(
            || async {
                let mut uow = self.store.begin().await?;
                let staged: LendingResult<Stored<T>> = async {
                    let mut stored = uow
                        .get::<T>(id)
                        .await?
                        .ok_or_else(|| LendingError::not_found(entity, id))?;
                    apply(&mut stored.value)?;
                    uow.save(&mut stored).await?;
                    Ok(stored)
                }
                .await;
                commit_or_rollback(uow, staged).await
            },
            &self.retry,
            entity,
        )
        .await
    }

    /// Delete the record once `check` accepts its current state
    pub(crate) async fn remove<T, F>(&self, entity: &'static str, id: &str, check: F) -> LendingResult<Stored<T>>
    where
        T: Entity,
        F: Fn(&T) -> LendingResult<()> + Send + Sync,
    {
        retry_conflicts(
            || async {
                let mut uow = self.store.begin().await?;
                let staged: LendingResult<Stored<T>> = async {
                    let stored = uow
                        .get::<T>(id)
                        .await?
                        .ok_or_else(|| LendingError::not_found(entity, id))?;
                    check(&stored.value)?;
                    uow.remove(&stored).await?;
                    Ok(stored)
                }
                .await;
                commit_or_rollback(uow, staged).await
            },
            &self.retry,
            entity,
        )
        .await
    }
}

// ============================================================================
// Catalog Service
// ============================================================================

#[derive(Clone)]
pub struct CatalogService {
    records: Records,
}

impl CatalogService {
    pub fn new(store: Arc<dyn DocumentStore>, retry: RetryConfig) -> Self {
        Self {
            records: Records::new(store, retry),
        }
    }

    fn store(&self) -> &Arc<dyn DocumentStore> {
        self.records.store()
    }

    async fn try_add_book(&self, book: &Book) -> LendingResult<Stored<Book>> {
        let mut uow = self.store().begin().await?;
        let staged: LendingResult<Stored<Book>> = async {
            check_references(uow.as_mut(), &book.author_ids, book.publisher_id.as_deref()).await?;
            Ok(uow.create(book.clone()).await?)
        }
        .await;
        commit_or_rollback(uow, staged).await
    }

    async fn try_edit_book(&self, id: &str, update: &BookUpdate) -> LendingResult<Stored<Book>> {
        let mut uow = self.store().begin().await?;
        let staged = stage_edit_book(uow.as_mut(), id, update).await;
        commit_or_rollback(uow, staged).await
    }

    async fn try_delete_author(&self, id: &str) -> LendingResult<()> {
        let mut uow = self.store().begin().await?;
        let staged = stage_delete_author(uow.as_mut(), id).await;
        commit_or_rollback(uow, staged).await
    }

    async fn try_delete_publisher(&self, id: &str) -> LendingResult<()> {
        let mut uow = self.store().begin().await?;
        let staged = stage_delete_publisher(uow.as_mut(), id).await;
        commit_or_rollback(uow, staged).await
    }

    // ========================================================================
    // Books
    // ========================================================================

    pub async fn list_books(&self, ctx: &RequestContext) -> LendingResult<Vec<Stored<Book>>> {
        gate::authorize(ctx.identity(), ANY_ROLE)?;
        ctx.within_deadline("list_books", async {
            Ok(self.store().list::<Book>(&Filter::all()).await?)
        })
        .await
    }

    pub async fn book_details(&self, ctx: &RequestContext, id: &str) -> LendingResult<Stored<Book>> {
        gate::authorize(ctx.identity(), ANY_ROLE)?;
        ctx.within_deadline("book_details", self.records.fetch("book", id))
            .await
    }

    /// New books start out available
    pub async fn add_book(&self, ctx: &RequestContext, input: BookInput) -> LendingResult<Stored<Book>> {
        gate::authorize(ctx.identity(), ADMIN_ONLY)?;
        require_name("title", &input.title)?;

        let book = Book {
            title: input.title.trim().to_string(),
            isbn: input.isbn,
            description: input.description,
            author_ids: input.author_ids,
            publisher_id: input.publisher_id,
            published_year: input.published_year,
            page_count: input.page_count,
            language: input.language,
            category: input.category,
            tags: input.tags,
            cover_image_url: input.cover_image_url,
            availability: Availability::Available,
        };
        let book = ctx
            .within_deadline(
                "add_book",
                retry_conflicts(|| self.try_add_book(&book), self.records.retry(), "add_book"),
            )
            .await?;

        info!(book_id = %book.id, title = %book.value.title, "Book added");
        Ok(book)
    }

    pub async fn edit_book(&self, ctx: &RequestContext, id: &str, update: BookUpdate) -> LendingResult<Stored<Book>> {
        gate::authorize(ctx.identity(), ADMIN_ONLY)?;
        if let Some(title) = &update.title {
            require_name("title", title)?;
        }
        let update = BookUpdate {
            title: trimmed(&update.title),
            ..update
        };

        ctx.within_deadline(
            "edit_book",
            retry_conflicts(|| self.try_edit_book(id, &update), self.records.retry(), "edit_book"),
        )
        .await
    }

    /// A checked-out book cannot be removed
    pub async fn delete_book(&self, ctx: &RequestContext, id: &str) -> LendingResult<bool> {
        gate::authorize(ctx.identity(), ADMIN_ONLY)?;
        ctx.within_deadline("delete_book", async {
            self.records
                .remove::<Book, _>("book", id, |book| {
                    if book.availability == Availability::CheckedOut {
                        return Err(LendingError::BookUnavailable(id.to_string()));
                    }
                    Ok(())
                })
                .await
        })
        .await?;

        info!(book_id = %id, "Book deleted");
        Ok(true)
    }

    // ========================================================================
    // Authors
    // ========================================================================

    pub async fn list_authors(&self, ctx: &RequestContext) -> LendingResult<Vec<Stored<Author>>> {
        gate::authorize(ctx.identity(), ANY_ROLE)?;
        ctx.within_deadline("list_authors", async {
            Ok(self.store().list::<Author>(&Filter::all()).await?)
        })
        .await
    }

    pub async fn author(&self, ctx: &RequestContext, id: &str) -> LendingResult<Stored<Author>> {
        gate::authorize(ctx.identity(), ANY_ROLE)?;
        ctx.within_deadline("author", self.records.fetch("author", id))
            .await
    }

    pub async fn create_author(&self, ctx: &RequestContext, input: AuthorInput) -> LendingResult<Stored<Author>> {
        gate::authorize(ctx.identity(), STAFF)?;
        require_name("name", &input.name)?;

        let author = Author {
            name: input.name.trim().to_string(),
            biography: input.biography,
            birth_date: input.birth_date,
            nationality: input.nationality,
            awards: input.awards,
            website_url: input.website_url,
        };
        let author = ctx
            .within_deadline("create_author", async {
                Ok(self.store().create(author).await?)
            })
            .await?;
        info!(author_id = %author.id, "Author created");
        Ok(author)
    }

    pub async fn update_author(
        &self,
        ctx: &RequestContext,
        id: &str,
        update: AuthorUpdate,
    ) -> LendingResult<Stored<Author>> {
        gate::authorize(ctx.identity(), STAFF)?;
        if let Some(name) = &update.name {
            require_name("name", name)?;
        }

        ctx.within_deadline(
            "update_author",
            self.records.modify::<Author, _>("author", id, |author| {
                set(&mut author.name, &trimmed(&update.name));
                set_opt(&mut author.biography, &update.biography);
                set_opt(&mut author.birth_date, &update.birth_date);
                set_opt(&mut author.nationality, &update.nationality);
                set(&mut author.awards, &update.awards);
                set_opt(&mut author.website_url, &update.website_url);
                Ok(())
            }),
        )
        .await
    }

    /// Rejected while any book still credits the author
    pub async fn delete_author(&self, ctx: &RequestContext, id: &str) -> LendingResult<bool> {
        gate::authorize(ctx.identity(), STAFF)?;
        ctx.within_deadline(
            "delete_author",
            retry_conflicts(|| self.try_delete_author(id), self.records.retry(), "delete_author"),
        )
        .await?;

        info!(author_id = %id, "Author deleted");
        Ok(true)
    }

    // ========================================================================
    // Publishers
    // ========================================================================

    pub async fn list_publishers(&self, ctx: &RequestContext) -> LendingResult<Vec<Stored<Publisher>>> {
        gate::authorize(ctx.identity(), ANY_ROLE)?;
        ctx.within_deadline("list_publishers", async {
            Ok(self.store().list::<Publisher>(&Filter::all()).await?)
        })
        .await
    }

    pub async fn publisher(&self, ctx: &RequestContext, id: &str) -> LendingResult<Stored<Publisher>> {
        gate::authorize(ctx.identity(), ANY_ROLE)?;
        ctx.within_deadline("publisher", self.records.fetch("publisher", id))
            .await
    }

    pub async fn create_publisher(
        &self,
        ctx: &RequestContext,
        input: PublisherInput,
    ) -> LendingResult<Stored<Publisher>> {
        gate::authorize(ctx.identity(), STAFF)?;
        require_name("name", &input.name)?;

        let publisher = Publisher {
            name: input.name.trim().to_string(),
            founded_year: input.founded_year,
            location: input.location,
            website_url: input.website_url,
        };
        let publisher = ctx
            .within_deadline("create_publisher", async {
                Ok(self.store().create(publisher).await?)
            })
            .await?;
        info!(publisher_id = %publisher.id, "Publisher created");
        Ok(publisher)
    }

    pub async fn update_publisher(
        &self,
        ctx: &RequestContext,
        id: &str,
        update: PublisherUpdate,
    ) -> LendingResult<Stored<Publisher>> {
        gate::authorize(ctx.identity(), STAFF)?;
        if let Some(name) = &update.name {
            require_name("name", name)?;
        }

        ctx.within_deadline(
            "update_publisher",
            self.records.modify::<Publisher, _>("publisher", id, |publisher| {
                set(&mut publisher.name, &trimmed(&update.name));
                set_opt(&mut publisher.founded_year, &update.founded_year);
                set_opt(&mut publisher.location, &update.location);
                set_opt(&mut publisher.website_url, &update.website_url);
                Ok(())
            }),
        )
        .await
    }

    /// Rejected while any book names the publisher
    pub async fn delete_publisher(&self, ctx: &RequestContext, id: &str) -> LendingResult<bool> {
        gate::authorize(ctx.identity(), STAFF)?;
        ctx.within_deadline(
            "delete_publisher",
            retry_conflicts(
                || self.try_delete_publisher(id),
                self.records.retry(),
                "delete_publisher",
            ),
        )
        .await?;

        info!(publisher_id = %id, "Publisher deleted");
        Ok(true)
    }

    // ========================================================================
    // Reviews
    // ========================================================================

    pub async fn book_reviews(&self, ctx: &RequestContext, book_id: &str) -> LendingResult<Vec<Stored<Review>>> {
        gate::authorize(ctx.identity(), ANY_ROLE)?;
        ctx.within_deadline("book_reviews", async {
            Ok(self
                .store()
                .list::<Review>(&Filter::eq("bookId", book_id))
                .await?)
        })
        .await
    }

    pub async fn add_review(
        &self,
        ctx: &RequestContext,
        book_id: &str,
        input: ReviewInput,
    ) -> LendingResult<Stored<Review>> {
        let reviewer = gate::authorize(ctx.identity(), ANY_ROLE)?;
        validate_rating(input.rating)?;

        let review = ctx
            .within_deadline("add_review", async {
                self.records.fetch::<Book>("book", book_id).await?;
                let review = Review {
                    book_id: book_id.to_string(),
                    user_id: reviewer.user_id.clone(),
                    rating: input.rating,
                    review_text: input.review_text,
                    reviewed_at: Utc::now(),
                };
                Ok(self.store().create(review).await?)
            })
            .await?;

        info!(review_id = %review.id, book_id = %book_id, user_id = %reviewer.user_id, "Review added");
        Ok(review)
    }

    /// Only the review's author may edit it
    pub async fn edit_review(
        &self,
        ctx: &RequestContext,
        review_id: &str,
        update: ReviewUpdate,
    ) -> LendingResult<Stored<Review>> {
        let reviewer = gate::authorize(ctx.identity(), ANY_ROLE)?;
        if let Some(rating) = update.rating {
            validate_rating(rating)?;
        }

        ctx.within_deadline(
            "edit_review",
            self.records.modify::<Review, _>("review", review_id, |review| {
                gate::authorize_owner_or(Some(reviewer), &review.user_id, &[])?;
                set(&mut review.rating, &update.rating);
                set_opt(&mut review.review_text, &update.review_text);
                Ok(())
            }),
        )
        .await
    }

    /// The review's author or an admin may delete it
    pub async fn delete_review(&self, ctx: &RequestContext, review_id: &str) -> LendingResult<bool> {
        let caller = gate::authorize(ctx.identity(), ANY_ROLE)?;
        ctx.within_deadline(
            "delete_review",
            self.records.remove::<Review, _>("review", review_id, |review| {
                gate::authorize_owner_or(Some(caller), &review.user_id, &[Role::Admin])?;
                Ok(())
            }),
        )
        .await?;

        info!(review_id = %review_id, "Review deleted");
        Ok(true)
    }
}

// ============================================================================
// Staging
// ============================================================================

/// Reads every referenced author and publisher through `uow`, so deleting
/// one of them concurrently fails one of the two commits.
async fn check_references(
    uow: &mut dyn UnitOfWork,
    author_ids: &[String],
    publisher_id: Option<&str>,
) -> LendingResult<()> {
    for author_id in author_ids {
        if uow.get::<Author>(author_id).await?.is_none() {
            return Err(LendingError::invalid(format!("unknown author {author_id}")));
        }
    }
    if let Some(publisher_id) = publisher_id {
        if uow.get::<Publisher>(publisher_id).await?.is_none() {
            return Err(LendingError::invalid(format!("unknown publisher {publisher_id}")));
        }
    }
    Ok(())
}

async fn stage_edit_book(uow: &mut dyn UnitOfWork, id: &str, update: &BookUpdate) -> LendingResult<Stored<Book>> {
    let mut stored = uow
        .get::<Book>(id)
        .await?
        .ok_or_else(|| LendingError::not_found("book", id))?;
    check_references(
        uow,
        update.author_ids.as_deref().unwrap_or_default(),
        update.publisher_id.as_deref(),
    )
    .await?;

    let book = &mut stored.value;
    set(&mut book.title, &update.title);
    set_opt(&mut book.isbn, &update.isbn);
    set_opt(&mut book.description, &update.description);
    set(&mut book.author_ids, &update.author_ids);
    set_opt(&mut book.publisher_id, &update.publisher_id);
    set_opt(&mut book.published_year, &update.published_year);
    set_opt(&mut book.page_count, &update.page_count);
    set_opt(&mut book.language, &update.language);
    set_opt(&mut book.category, &update.category);
    set(&mut book.tags, &update.tags);
    set_opt(&mut book.cover_image_url, &update.cover_image_url);

    uow.save(&mut stored).await?;
    Ok(stored)
}

async fn stage_delete_author(uow: &mut dyn UnitOfWork, id: &str) -> LendingResult<()> {
    let author = uow
        .get::<Author>(id)
        .await?
        .ok_or_else(|| LendingError::not_found("author", id))?;
    let books = uow.list::<Book>(&Filter::all()).await?;
    if books.iter().any(|b| b.value.author_ids.iter().any(|a| a == id)) {
        return Err(LendingError::invalid(format!(
            "author {id} is still credited on a book"
        )));
    }
    uow.remove(&author).await?;
    Ok(())
}

async fn stage_delete_publisher(uow: &mut dyn UnitOfWork, id: &str) -> LendingResult<()> {
    let publisher = uow
        .get::<Publisher>(id)
        .await?
        .ok_or_else(|| LendingError::not_found("publisher", id))?;
    let books = uow.list::<Book>(&Filter::eq("publisherId", id)).await?;
    if !books.is_empty() {
        return Err(LendingError::invalid(format!(
            "publisher {id} still has {} book(s)",
            books.len()
        )));
    }
    uow.remove(&publisher).await?;
    Ok(())
}
