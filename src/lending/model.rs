//! Records stored in the library collections
//!
//! Field names are camelCase in stored bodies; filters use those names.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{Collection, Entity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Librarian,
    Reader,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Librarian => "LIBRARIAN",
            Role::Reader => "READER",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Role::Admin),
            "LIBRARIAN" => Ok(Role::Librarian),
            "READER" => Ok(Role::Reader),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Availability {
    Available,
    CheckedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoanStatus {
    Borrowed,
    Returned,
}

impl LoanStatus {
    /// Stored representation, for filters
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Borrowed => "BORROWED",
            LoanStatus::Returned => "RETURNED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub title: String,
    pub isbn: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub author_ids: Vec<String>,
    pub publisher_id: Option<String>,
    pub published_year: Option<i32>,
    pub page_count: Option<i32>,
    pub language: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub cover_image_url: Option<String>,
    /// Written only by the loan ledger
    pub availability: Availability,
}

impl Entity for Book {
    const COLLECTION: Collection = Collection::Books;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub name: String,
    /// Stored lowercased
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    #[serde(default)]
    pub favorite_genres: Vec<String>,
    pub registered_at: DateTime<Utc>,
    /// Ids of this user's loans still in `Borrowed` state
    #[serde(default)]
    pub active_loans: BTreeSet<String>,
}

impl Entity for User {
    const COLLECTION: Collection = Collection::Users;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Loan {
    pub book_id: String,
    pub user_id: String,
    pub borrowed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub status: LoanStatus,
}

impl Loan {
    pub fn open(
        book_id: impl Into<String>,
        user_id: impl Into<String>,
        borrowed_at: DateTime<Utc>,
        due_at: DateTime<Utc>,
    ) -> Self {
        Self {
            book_id: book_id.into(),
            user_id: user_id.into(),
            borrowed_at,
            due_at,
            returned_at: None,
            status: LoanStatus::Borrowed,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == LoanStatus::Borrowed
    }
}

impl Entity for Loan {
    const COLLECTION: Collection = Collection::Loans;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub name: String,
    pub biography: Option<String>,
    pub birth_date: Option<String>,
    pub nationality: Option<String>,
    #[serde(default)]
    pub awards: Vec<String>,
    pub website_url: Option<String>,
}

impl Entity for Author {
    const COLLECTION: Collection = Collection::Authors;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Publisher {
    pub name: String,
    pub founded_year: Option<i32>,
    pub location: Option<String>,
    pub website_url: Option<String>,
}

impl Entity for Publisher {
    const COLLECTION: Collection = Collection::Publishers;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub book_id: String,
    pub user_id: String,
    /// 1 to 5
    pub rating: i32,
    pub review_text: Option<String>,
    pub reviewed_at: DateTime<Utc>,
}

impl Entity for Review {
    const COLLECTION: Collection = Collection::Reviews;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_loan_body_uses_camel_case() {
        let at = DateTime::parse_from_rfc3339("2025-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let loan = Loan::open("b1", "u1", at, at);
        let body = serde_json::to_value(&loan).unwrap();

        assert_eq!(body["bookId"], "b1");
        assert_eq!(body["userId"], "u1");
        assert_eq!(body["status"], json!(LoanStatus::Borrowed.as_str()));
        assert!(body["returnedAt"].is_null());
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("librarian".parse::<Role>().unwrap(), Role::Librarian);
        assert_eq!(Role::Admin.to_string(), "ADMIN");
        assert!("owner".parse::<Role>().is_err());
    }
}
