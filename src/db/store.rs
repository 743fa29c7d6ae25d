//! Document store abstraction
//!
//! Collections hold JSON documents addressed by an opaque string id. Every
//! document carries a version that starts at 1 and is bumped by each update.
//! Multi-document changes go through a [UnitOfWork], which is applied
//! all-or-nothing on [commit](UnitOfWork::commit). A unit that is dropped or
//! rolled back leaves no trace.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{StoreError, StoreResult};

/// Named collections of the library database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Books,
    Users,
    Loans,
    Authors,
    Publishers,
    Reviews,
}

impl Collection {
    pub const ALL: [Collection; 6] = [
        Collection::Books,
        Collection::Users,
        Collection::Loans,
        Collection::Authors,
        Collection::Publishers,
        Collection::Reviews,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Books => "books",
            Collection::Users => "users",
            Collection::Loans => "loans",
            Collection::Authors => "authors",
            Collection::Publishers => "publishers",
            Collection::Reviews => "reviews",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored JSON document
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub version: i64,
    pub body: Value,
}

/// Conjunction of top-level field equality terms
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    terms: Vec<(String, Value)>,
}

impl Filter {
    /// Matches every document in a collection
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::all().and(field, value)
    }

    pub fn and(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.terms.push((field.into(), value.into()));
        self
    }

    pub fn terms(&self) -> &[(String, Value)] {
        &self.terms
    }

    pub fn matches(&self, body: &Value) -> bool {
        self.terms
            .iter()
            .all(|(field, expected)| body.get(field) == Some(expected))
    }
}

/// Backend-neutral document store.
///
/// Implementations must be safe to share across requests; the store is the
/// only serialization point between concurrent units of work.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Short backend name for logs
    fn backend(&self) -> &'static str;

    async fn find_by_id(&self, collection: Collection, id: &str) -> StoreResult<Option<Document>>;

    async fn find(&self, collection: Collection, filter: &Filter) -> StoreResult<Vec<Document>>;

    /// Insert a new document and return its generated id
    async fn insert(&self, collection: Collection, body: Value) -> StoreResult<String>;

    /// Start an isolated unit of work
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>>;

    /// Verify the backend is reachable
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// A group of reads and writes applied atomically.
///
/// Every document read or written through the unit is version-checked at
/// commit; if any of them changed underneath, commit fails with
/// [StoreError::Conflict] and nothing is applied.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn find_by_id(&mut self, collection: Collection, id: &str)
        -> StoreResult<Option<Document>>;

    async fn find(&mut self, collection: Collection, filter: &Filter) -> StoreResult<Vec<Document>>;

    async fn insert(&mut self, collection: Collection, body: Value) -> StoreResult<String>;

    /// Replace a document's body if its version is still `expected_version`.
    /// Returns the new version.
    async fn update(
        &mut self,
        collection: Collection,
        id: &str,
        expected_version: i64,
        body: Value,
    ) -> StoreResult<i64>;

    async fn delete(&mut self, collection: Collection, id: &str, expected_version: i64)
        -> StoreResult<()>;

    async fn commit(&mut self) -> StoreResult<()>;

    async fn rollback(&mut self) -> StoreResult<()>;
}

/// Commit `uow` when `staged` succeeded, otherwise roll it back and return the
/// staging error unchanged.
pub async fn commit_or_rollback<T, E>(mut uow: Box<dyn UnitOfWork>, staged: Result<T, E>) -> Result<T, E>
where
    E: From<StoreError>,
{
    match staged {
        Ok(value) => {
            uow.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = uow.rollback().await {
                tracing::warn!(error = %rollback_err, "Rollback of failed unit of work did not complete");
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_matches_all_terms() {
        let body = json!({"userId": "u1", "status": "BORROWED", "count": 2});

        assert!(Filter::all().matches(&body));
        assert!(Filter::eq("userId", "u1").matches(&body));
        assert!(Filter::eq("userId", "u1").and("status", "BORROWED").matches(&body));
        assert!(!Filter::eq("userId", "u1").and("status", "RETURNED").matches(&body));
        assert!(!Filter::eq("missing", "x").matches(&body));
        assert!(Filter::eq("count", 2).matches(&body));
    }

    #[test]
    fn test_collection_names() {
        assert_eq!(Collection::Loans.to_string(), "loans");
        assert_eq!(Collection::ALL.len(), 6);
    }
}
