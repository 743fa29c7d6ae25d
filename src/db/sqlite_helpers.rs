//! SQLite helper utilities for the documents table
//!
//! Bodies are stored as JSON TEXT and queried through SQLite's JSON1
//! functions.

use chrono::Utc;
use serde_json::Value;

use super::error::{StoreError, StoreResult};
use super::store::{Collection, Filter};

// ============================================================================
// Timestamp Helpers
// ============================================================================

/// Get current UTC timestamp as ISO8601 string for SQLite
#[inline]
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339()
}

// ============================================================================
// JSON Helpers
// ============================================================================

/// JSON path addressing a top-level field of a body
pub fn json_path(field: &str) -> String {
    format!("$.\"{}\"", field.replace('"', ""))
}

/// Build the `WHERE` clause for a filter over one collection.
///
/// Returns the SQL fragment plus its bind values in order. Values are bound
/// as JSON text and unwrapped with `json_extract(?, '$')` so strings, numbers
/// and booleans compare the same way SQLite stores them in the body.
pub fn filter_clause(collection: Collection, filter: &Filter) -> StoreResult<(String, Vec<String>)> {
    let mut sql = String::from("collection = ?");
    let mut binds = vec![collection.as_str().to_string()];

    for (field, value) in filter.terms() {
        if value.is_null() {
            sql.push_str(" AND json_extract(body, ?) IS NULL");
            binds.push(json_path(field));
        } else {
            sql.push_str(" AND json_extract(body, ?) = json_extract(?, '$')");
            binds.push(json_path(field));
            binds.push(serde_json::to_string(value)?);
        }
    }

    Ok((sql, binds))
}

/// Parse a stored body, reporting unreadable rows as corrupt documents
pub fn parse_body(collection: Collection, id: &str, body: &str) -> StoreResult<Value> {
    serde_json::from_str(body).map_err(|e| StoreError::Corrupt {
        collection,
        id: id.to_string(),
        reason: e.to_string(),
    })
}
