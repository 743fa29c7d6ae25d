//! SQLite-backed document store
//!
//! All collections share one `documents` table keyed by `(collection, id)`.
//! A unit of work is a SQLite transaction; updates are conditional on the
//! version read earlier, and lock contention surfaces as
//! [StoreError::Conflict] so callers can retry the whole unit.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use tracing::{info, warn};
use uuid::Uuid;

use super::error::{StoreError, StoreResult};
use super::sqlite_helpers::{filter_clause, now_iso8601, parse_body};
use super::store::{Collection, Document, DocumentStore, Filter, UnitOfWork};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    collection TEXT NOT NULL,
    id TEXT NOT NULL,
    version INTEGER NOT NULL,
    body TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (collection, id)
)
"#;

type Row = (String, i64, String);

fn to_document(collection: Collection, (id, version, body): Row) -> StoreResult<Document> {
    let body = parse_body(collection, &id, &body)?;
    Ok(Document { id, version, body })
}

/// Document store persisted in a SQLite database file
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `url` and ensure the schema
    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Connect, retrying every `retry_interval` until the database opens
    pub async fn connect_with_retry(
        url: &str,
        max_connections: u32,
        retry_interval: Duration,
    ) -> Self {
        loop {
            match Self::connect(url, max_connections).await {
                Ok(store) => {
                    info!(url = %url, "Document store ready");
                    return store;
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        retry_in_secs = retry_interval.as_secs(),
                        "Database connection failed, retrying"
                    );
                    tokio::time::sleep(retry_interval).await;
                }
            }
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn ensure_schema(&self) -> StoreResult<()> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }
}

async fn select_by_id<'e, E>(executor: E, collection: Collection, id: &str) -> StoreResult<Option<Document>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row: Option<Row> = sqlx::query_as(
        "SELECT id, version, body FROM documents WHERE collection = ? AND id = ?",
    )
    .bind(collection.as_str())
    .bind(id)
    .fetch_optional(executor)
    .await?;

    row.map(|row| to_document(collection, row)).transpose()
}

async fn select_matching<'e, E>(executor: E, collection: Collection, filter: &Filter) -> StoreResult<Vec<Document>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let (clause, binds) = filter_clause(collection, filter)?;
    let sql = format!("SELECT id, version, body FROM documents WHERE {clause} ORDER BY id");

    let mut query = sqlx::query_as::<_, Row>(&sql);
    for value in binds {
        query = query.bind(value);
    }
    let rows = query.fetch_all(executor).await?;

    rows.into_iter().map(|row| to_document(collection, row)).collect()
}

async fn insert_row<'e, E>(executor: E, collection: Collection, body: &Value) -> StoreResult<String>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let id = Uuid::new_v4().to_string();
    let now = now_iso8601();
    sqlx::query(
        "INSERT INTO documents (collection, id, version, body, created_at, updated_at) \
         VALUES (?, ?, 1, ?, ?, ?)",
    )
    .bind(collection.as_str())
    .bind(&id)
    .bind(serde_json::to_string(body)?)
    .bind(&now)
    .bind(&now)
    .execute(executor)
    .await?;
    Ok(id)
}

#[async_trait]
impl DocumentStore for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn find_by_id(&self, collection: Collection, id: &str) -> StoreResult<Option<Document>> {
        select_by_id(&self.pool, collection, id).await
    }

    async fn find(&self, collection: Collection, filter: &Filter) -> StoreResult<Vec<Document>> {
        select_matching(&self.pool, collection, filter).await
    }

    async fn insert(&self, collection: Collection, body: Value) -> StoreResult<String> {
        insert_row(&self.pool, collection, &body).await
    }

    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteUnitOfWork { tx: Some(tx) }))
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Unit of work backed by a SQLite transaction.
///
/// Dropping it without committing rolls the transaction back.
pub struct SqliteUnitOfWork {
    tx: Option<Transaction<'static, Sqlite>>,
}

impl SqliteUnitOfWork {
    fn tx(&mut self) -> StoreResult<&mut Transaction<'static, Sqlite>> {
        self.tx.as_mut().ok_or(StoreError::Finished)
    }

    /// Distinguish a missing document from a stale version after a
    /// conditional write touched no rows
    async fn no_rows_error(&mut self, collection: Collection, id: &str, expected_version: i64) -> StoreError {
        let tx = match self.tx() {
            Ok(tx) => tx,
            Err(e) => return e,
        };
        match select_by_id(&mut **tx, collection, id).await {
            Ok(Some(doc)) => StoreError::Conflict(format!(
                "{collection}/{id} is at version {}, expected {expected_version}",
                doc.version
            )),
            Ok(None) => StoreError::Missing {
                collection,
                id: id.to_string(),
            },
            Err(e) => e,
        }
    }
}

#[async_trait]
impl UnitOfWork for SqliteUnitOfWork {
    async fn find_by_id(
        &mut self,
        collection: Collection,
        id: &str,
    ) -> StoreResult<Option<Document>> {
        let tx = self.tx()?;
        select_by_id(&mut **tx, collection, id).await
    }

    async fn find(&mut self, collection: Collection, filter: &Filter) -> StoreResult<Vec<Document>> {
        let tx = self.tx()?;
        select_matching(&mut **tx, collection, filter).await
    }

    async fn insert(&mut self, collection: Collection, body: Value) -> StoreResult<String> {
        let tx = self.tx()?;
        insert_row(&mut **tx, collection, &body).await
    }

    async fn update(
        &mut self,
        collection: Collection,
        id: &str,
        expected_version: i64,
        body: Value,
    ) -> StoreResult<i64> {
        let body = serde_json::to_string(&body)?;
        let tx = self.tx()?;
        let result = sqlx::query(
            "UPDATE documents SET version = version + 1, body = ?, updated_at = ? \
             WHERE collection = ? AND id = ? AND version = ?",
        )
        .bind(body)
        .bind(now_iso8601())
        .bind(collection.as_str())
        .bind(id)
        .bind(expected_version)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.no_rows_error(collection, id, expected_version).await);
        }
        Ok(expected_version + 1)
    }

    async fn delete(
        &mut self,
        collection: Collection,
        id: &str,
        expected_version: i64,
    ) -> StoreResult<()> {
        let tx = self.tx()?;
        let result = sqlx::query(
            "DELETE FROM documents WHERE collection = ? AND id = ? AND version = ?",
        )
        .bind(collection.as_str())
        .bind(id)
        .bind(expected_version)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.no_rows_error(collection, id, expected_version).await);
        }
        Ok(())
    }

    async fn commit(&mut self) -> StoreResult<()> {
        let tx = self.tx.take().ok_or(StoreError::Finished)?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&mut self) -> StoreResult<()> {
        let tx = self.tx.take().ok_or(StoreError::Finished)?;
        tx.rollback().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use tempfile::TempDir;

    async fn open() -> (TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("store.db").display());
        let store = SqliteStore::connect(&url, 4).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_insert_find_and_filter() {
        let (_dir, store) = open().await;
        store
            .insert(Collection::Loans, json!({"userId": "u1", "status": "BORROWED"}))
            .await
            .unwrap();
        store
            .insert(Collection::Loans, json!({"userId": "u1", "status": "RETURNED"}))
            .await
            .unwrap();
        store
            .insert(Collection::Loans, json!({"userId": "u2", "status": "BORROWED"}))
            .await
            .unwrap();

        let for_u1 = store
            .find(Collection::Loans, &Filter::eq("userId", "u1"))
            .await
            .unwrap();
        assert_eq!(for_u1.len(), 2);

        let open_for_u1 = store
            .find(
                Collection::Loans,
                &Filter::eq("userId", "u1").and("status", "BORROWED"),
            )
            .await
            .unwrap();
        assert_eq!(open_for_u1.len(), 1);
        assert_eq!(open_for_u1[0].version, 1);

        let all = store.find(Collection::Loans, &Filter::all()).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(store.find(Collection::Books, &Filter::all()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unit_of_work_commit_and_rollback() {
        let (_dir, store) = open().await;
        let id = store
            .insert(Collection::Books, json!({"title": "Dune"}))
            .await
            .unwrap();

        let mut uow = store.begin().await.unwrap();
        uow.update(Collection::Books, &id, 1, json!({"title": "Dune Messiah"}))
            .await
            .unwrap();
        uow.rollback().await.unwrap();
        let doc = store.find_by_id(Collection::Books, &id).await.unwrap().unwrap();
        assert_eq!(doc.body["title"], "Dune");

        let mut uow = store.begin().await.unwrap();
        let version = uow
            .update(Collection::Books, &id, 1, json!({"title": "Children of Dune"}))
            .await
            .unwrap();
        uow.commit().await.unwrap();
        let doc = store.find_by_id(Collection::Books, &id).await.unwrap().unwrap();
        assert_eq!(version, 2);
        assert_eq!(doc.version, 2);
        assert_eq!(doc.body["title"], "Children of Dune");
    }

    #[tokio::test]
    async fn test_stale_and_missing_updates() {
        let (_dir, store) = open().await;
        let id = store
            .insert(Collection::Books, json!({"title": "Dune"}))
            .await
            .unwrap();

        let mut uow = store.begin().await.unwrap();
        assert_matches!(
            uow.update(Collection::Books, &id, 3, json!({})).await,
            Err(StoreError::Conflict(_))
        );
        assert_matches!(
            uow.delete(Collection::Books, "missing", 1).await,
            Err(StoreError::Missing { .. })
        );
        uow.delete(Collection::Books, &id, 1).await.unwrap();
        uow.commit().await.unwrap();
        assert_matches!(uow.commit().await, Err(StoreError::Finished));

        assert!(store.find_by_id(Collection::Books, &id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dropped_unit_rolls_back() {
        let (_dir, store) = open().await;
        {
            let mut uow = store.begin().await.unwrap();
            uow.insert(Collection::Loans, json!({"bookId": "b1"})).await.unwrap();
        }
        let loans = store.find(Collection::Loans, &Filter::all()).await.unwrap();
        assert!(loans.is_empty());
        store.ping().await.unwrap();
    }
}
