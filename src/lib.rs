//! Shelfmark - library-management backend
//!
//! Books, users and loans behind a GraphQL API. The lending core in
//! [lending] keeps book availability and user loan sets consistent under
//! concurrent borrows by running every change as one unit of work against
//! the [db] document store.

pub mod app;
pub mod config;
pub mod db;
pub mod graphql;
pub mod lending;
pub mod services;
