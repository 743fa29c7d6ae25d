//! Document store adapter
//!
//! The lending core talks to storage only through [DocumentStore] and
//! [UnitOfWork]. Two backends are provided: [SqliteStore] for deployments and
//! [MemoryStore] for tests and throwaway instances.

pub mod entity;
pub mod error;
pub mod memory;
pub mod sqlite;
pub mod sqlite_helpers;
pub mod store;

pub use entity::{DocumentStoreExt, Entity, Stored, UnitOfWorkExt};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use store::{Collection, Document, DocumentStore, Filter, UnitOfWork, commit_or_rollback};
