//! Fixtures shared by unit tests

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::db::{DocumentStore, DocumentStoreExt};

use super::model::{Availability, Book, Role, User};

pub fn at(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

pub fn book(title: &str) -> Book {
    Book {
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
    }
}

pub fn user(name: &str, role: Role) -> User {
    User {
        name: name.to_string(),
        email: format!("{}@example.org", name.to_lowercase()),
        password_hash: String::new(),
        role,
        favorite_genres: vec![],
        registered_at: at("2025-01-01T00:00:00Z"),
        active_loans: BTreeSet::new(),
    }
}

pub async fn seed_book(store: &dyn DocumentStore, title: &str) -> String {
    store.create(book(title)).await.unwrap().id
}

pub async fn seed_user(store: &dyn DocumentStore, name: &str, role: Role) -> String {
    store.create(user(name, role)).await.unwrap().id
}
