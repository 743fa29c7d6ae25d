//! GraphQL object, input and enum types
//!
//! Output objects flatten a stored record into its id plus fields. Password
//! hashes never leave the service layer.

use async_graphql::{Enum, InputObject, SimpleObject};
use chrono::{DateTime, Utc};

use crate::db::Stored;
use crate::lending;
use crate::services;

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Enum)]
pub enum UserRole {
    Admin,
    Librarian,
    Reader,
}

impl From<lending::Role> for UserRole {
    fn from(role: lending::Role) -> Self {
        match role {
            lending::Role::Admin => UserRole::Admin,
            lending::Role::Librarian => UserRole::Librarian,
            lending::Role::Reader => UserRole::Reader,
        }
    }
}

impl From<UserRole> for lending::Role {
    fn from(role: UserRole) -> Self {
        match role {
            UserRole::Admin => lending::Role::Admin,
            UserRole::Librarian => lending::Role::Librarian,
            UserRole::Reader => lending::Role::Reader,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Enum)]
pub enum BookAvailability {
    Available,
    CheckedOut,
}

impl From<lending::Availability> for BookAvailability {
    fn from(availability: lending::Availability) -> Self {
        match availability {
            lending::Availability::Available => BookAvailability::Available,
            lending::Availability::CheckedOut => BookAvailability::CheckedOut,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Enum)]
pub enum LoanStatus {
    Borrowed,
    Returned,
}

impl From<lending::LoanStatus> for LoanStatus {
    fn from(status: lending::LoanStatus) -> Self {
        match status {
            lending::LoanStatus::Borrowed => LoanStatus::Borrowed,
            lending::LoanStatus::Returned => LoanStatus::Returned,
        }
    }
}

impl From<LoanStatus> for lending::LoanStatus {
    fn from(status: LoanStatus) -> Self {
        match status {
            LoanStatus::Borrowed => lending::LoanStatus::Borrowed,
            LoanStatus::Returned => lending::LoanStatus::Returned,
        }
    }
}

// ============================================================================
// Catalog Types
// ============================================================================

#[derive(Debug, Clone, SimpleObject)]
pub struct Book {
    pub id: String,
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
    pub availability: BookAvailability,
}

impl From<Stored<lending::Book>> for Book {
    fn from(stored: Stored<lending::Book>) -> Self {
        let b = stored.value;
        Book {
            id: stored.id,
            title: b.title,
            isbn: b.isbn,
            description: b.description,
            author_ids: b.author_ids,
            publisher_id: b.publisher_id,
            published_year: b.published_year,
            page_count: b.page_count,
            language: b.language,
            category: b.category,
            tags: b.tags,
            cover_image_url: b.cover_image_url,
            availability: b.availability.into(),
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
pub struct Author {
    pub id: String,
    pub name: String,
    pub biography: Option<String>,
    /// ISO date, as entered
    pub birth_date: Option<String>,
    pub nationality: Option<String>,
    pub awards: Vec<String>,
    pub website_url: Option<String>,
}

impl From<Stored<lending::Author>> for Author {
    fn from(stored: Stored<lending::Author>) -> Self {
        let a = stored.value;
        Author {
            id: stored.id,
            name: a.name,
            biography: a.biography,
            birth_date: a.birth_date,
            nationality: a.nationality,
            awards: a.awards,
            website_url: a.website_url,
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
pub struct Publisher {
    pub id: String,
    pub name: String,
    pub founded_year: Option<i32>,
    pub location: Option<String>,
    pub website_url: Option<String>,
}

impl From<Stored<lending::Publisher>> for Publisher {
    fn from(stored: Stored<lending::Publisher>) -> Self {
        let p = stored.value;
        Publisher {
            id: stored.id,
            name: p.name,
            founded_year: p.founded_year,
            location: p.location,
            website_url: p.website_url,
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
pub struct Review {
    pub id: String,
    pub book_id: String,
    pub user_id: String,
    pub rating: i32,
    pub review_text: Option<String>,
    pub reviewed_at: DateTime<Utc>,
}

impl From<Stored<lending::Review>> for Review {
    fn from(stored: Stored<lending::Review>) -> Self {
        let r = stored.value;
        Review {
            id: stored.id,
            book_id: r.book_id,
            user_id: r.user_id,
            rating: r.rating,
            review_text: r.review_text,
            reviewed_at: r.reviewed_at,
        }
    }
}

// ============================================================================
// Users & Loans
// ============================================================================

#[derive(Debug, Clone, SimpleObject)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub favorite_genres: Vec<String>,
    pub registered_at: DateTime<Utc>,
    /// Ids of the loans this user currently holds
    pub active_loan_ids: Vec<String>,
}

impl From<Stored<lending::User>> for User {
    fn from(stored: Stored<lending::User>) -> Self {
        let u = stored.value;
        User {
            id: stored.id,
            name: u.name,
            email: u.email,
            role: u.role.into(),
            favorite_genres: u.favorite_genres,
            registered_at: u.registered_at,
            active_loan_ids: u.active_loans.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
pub struct Loan {
    pub id: String,
    pub book_id: String,
    pub user_id: String,
    pub borrowed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub status: LoanStatus,
    /// Still borrowed after its due date
    pub overdue: bool,
}

/// Token issued by sign-up or login
#[derive(Debug, Clone, SimpleObject)]
pub struct AuthPayload {
    pub token: String,
    pub user: User,
}

impl From<services::AuthSession> for AuthPayload {
    fn from(session: services::AuthSession) -> Self {
        AuthPayload {
            token: session.token,
            user: session.user.into(),
        }
    }
}

// ============================================================================
// Inputs
// ============================================================================

#[derive(Debug, InputObject)]
pub struct SignUpInput {
    pub name: String,
    pub email: String,
    pub password: String,
    #[graphql(default)]
    pub favorite_genres: Vec<String>,
}

impl From<SignUpInput> for services::SignUpInput {
    fn from(input: SignUpInput) -> Self {
        services::SignUpInput {
            name: input.name,
            email: input.email,
            password: input.password,
            favorite_genres: input.favorite_genres,
        }
    }
}

#[derive(Debug, InputObject)]
pub struct AddBookInput {
    pub title: String,
    pub isbn: Option<String>,
    pub description: Option<String>,
    #[graphql(default)]
    pub author_ids: Vec<String>,
    pub publisher_id: Option<String>,
    pub published_year: Option<i32>,
    pub page_count: Option<i32>,
    pub language: Option<String>,
    pub category: Option<String>,
    #[graphql(default)]
    pub tags: Vec<String>,
    pub cover_image_url: Option<String>,
}

impl From<AddBookInput> for services::BookInput {
    fn from(input: AddBookInput) -> Self {
        services::BookInput {
            title: input.title,
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
        }
    }
}

/// Omitted fields are left unchanged
#[derive(Debug, InputObject)]
pub struct EditBookInput {
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

impl From<EditBookInput> for services::BookUpdate {
    fn from(input: EditBookInput) -> Self {
        services::BookUpdate {
            title: input.title,
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
        }
    }
}

#[derive(Debug, InputObject)]
pub struct CreateAuthorInput {
    pub name: String,
    pub biography: Option<String>,
    pub birth_date: Option<String>,
    pub nationality: Option<String>,
    #[graphql(default)]
    pub awards: Vec<String>,
    pub website_url: Option<String>,
}

impl From<CreateAuthorInput> for services::AuthorInput {
    fn from(input: CreateAuthorInput) -> Self {
        services::AuthorInput {
            name: input.name,
            biography: input.biography,
            birth_date: input.birth_date,
            nationality: input.nationality,
            awards: input.awards,
            website_url: input.website_url,
        }
    }
}

#[derive(Debug, InputObject)]
pub struct UpdateAuthorInput {
    pub name: Option<String>,
    pub biography: Option<String>,
    pub birth_date: Option<String>,
    pub nationality: Option<String>,
    pub awards: Option<Vec<String>>,
    pub website_url: Option<String>,
}

impl From<UpdateAuthorInput> for services::AuthorUpdate {
    fn from(input: UpdateAuthorInput) -> Self {
        services::AuthorUpdate {
            name: input.name,
            biography: input.biography,
            birth_date: input.birth_date,
            nationality: input.nationality,
            awards: input.awards,
            website_url: input.website_url,
        }
    }
}

#[derive(Debug, InputObject)]
pub struct CreatePublisherInput {
    pub name: String,
    pub founded_year: Option<i32>,
    pub location: Option<String>,
    pub website_url: Option<String>,
}

impl From<CreatePublisherInput> for services::PublisherInput {
    fn from(input: CreatePublisherInput) -> Self {
        services::PublisherInput {
            name: input.name,
            founded_year: input.founded_year,
            location: input.location,
            website_url: input.website_url,
        }
    }
}

#[derive(Debug, InputObject)]
pub struct UpdatePublisherInput {
    pub name: Option<String>,
    pub founded_year: Option<i32>,
    pub location: Option<String>,
    pub website_url: Option<String>,
}

impl From<UpdatePublisherInput> for services::PublisherUpdate {
    fn from(input: UpdatePublisherInput) -> Self {
        services::PublisherUpdate {
            name: input.name,
            founded_year: input.founded_year,
            location: input.location,
            website_url: input.website_url,
        }
    }
}

#[derive(Debug, InputObject)]
pub struct AddReviewInput {
    pub book_id: String,
    /// 1 to 5
    pub rating: i32,
    pub review_text: Option<String>,
}

#[derive(Debug, InputObject)]
pub struct EditReviewInput {
    pub rating: Option<i32>,
    pub review_text: Option<String>,
}

impl From<EditReviewInput> for services::ReviewUpdate {
    fn from(input: EditReviewInput) -> Self {
        services::ReviewUpdate {
            rating: input.rating,
            review_text: input.review_text,
        }
    }
}

#[derive(Debug, InputObject)]
pub struct UpdateUserInput {
    pub name: Option<String>,
    pub email: Option<String>,
    pub favorite_genres: Option<Vec<String>>,
    /// Admin only
    pub role: Option<UserRole>,
    /// Required when changing your own password
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

impl From<UpdateUserInput> for services::UserUpdate {
    fn from(input: UpdateUserInput) -> Self {
        services::UserUpdate {
            name: input.name,
            email: input.email,
            favorite_genres: input.favorite_genres,
            role: input.role.map(Into::into),
            current_password: input.current_password,
            new_password: input.new_password,
        }
    }
}
