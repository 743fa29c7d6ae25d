//! GraphQL API over the lending core and the catalog services
//!
//! This is the single API surface for the Shelfmark backend. Queries and
//! mutations are split per domain under `queries/` and `mutations/`; each
//! file defines a `#[derive(Default)]` struct with an `#[Object]` impl, and
//! `schema.rs` merges them into the roots.
//!
//! Resolvers hold no business logic: they build a request context from the
//! caller's identity, call one service operation and translate its error
//! into a GraphQL error with a `code` extension.

pub mod auth;
pub mod helpers;
pub mod mutations;
pub mod queries;
mod schema;
pub mod types;

pub use auth::{DEFAULT_REQUEST_TIMEOUT, RequestTimeout};
pub use schema::{SchemaServices, ShelfmarkSchema, build_schema};
