//! Typed access to documents
//!
//! Domain records implement [Entity] to bind themselves to a collection.
//! The extension traits add typed `get`/`list`/`create`/`save` helpers to any
//! store or unit of work, decoding bodies with serde.

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};

use super::error::{StoreError, StoreResult};
use super::store::{Collection, Document, DocumentStore, Filter, UnitOfWork};

/// A record type stored in a fixed collection
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    const COLLECTION: Collection;
}

/// A decoded document together with its id and version
#[derive(Debug, Clone, PartialEq)]
pub struct Stored<T> {
    pub id: String,
    pub version: i64,
    pub value: T,
}

impl<T: Entity> Stored<T> {
    pub fn from_document(doc: Document) -> StoreResult<Self> {
        let Document { id, version, body } = doc;
        match serde_json::from_value(body) {
            Ok(value) => Ok(Self { id, version, value }),
            Err(e) => Err(StoreError::Corrupt {
                collection: T::COLLECTION,
                id,
                reason: e.to_string(),
            }),
        }
    }
}

fn decode_all<T: Entity>(docs: Vec<Document>) -> StoreResult<Vec<Stored<T>>> {
    docs.into_iter().map(Stored::from_document).collect()
}

#[async_trait]
pub trait DocumentStoreExt: DocumentStore {
    async fn get<T: Entity>(&self, id: &str) -> StoreResult<Option<Stored<T>>> {
        match self.find_by_id(T::COLLECTION, id).await? {
            Some(doc) => Ok(Some(Stored::from_document(doc)?)),
            None => Ok(None),
        }
    }

    async fn list<T: Entity>(&self, filter: &Filter) -> StoreResult<Vec<Stored<T>>> {
        let docs = self.find(T::COLLECTION, filter).await?;
        decode_all(docs)
    }

    async fn create<T: Entity>(&self, value: T) -> StoreResult<Stored<T>> {
        let body = serde_json::to_value(&value)?;
        let id = self.insert(T::COLLECTION, body).await?;
        Ok(Stored { id, version: 1, value })
    }
}

impl<S: DocumentStore + ?Sized> DocumentStoreExt for S {}

#[async_trait]
pub trait UnitOfWorkExt: UnitOfWork {
    async fn get<T: Entity>(&mut self, id: &str) -> StoreResult<Option<Stored<T>>> {
        match self.find_by_id(T::COLLECTION, id).await? {
            Some(doc) => Ok(Some(Stored::from_document(doc)?)),
            None => Ok(None),
        }
    }

    async fn list<T: Entity>(&mut self, filter: &Filter) -> StoreResult<Vec<Stored<T>>> {
        let docs = self.find(T::COLLECTION, filter).await?;
        decode_all(docs)
    }

    async fn create<T: Entity>(&mut self, value: T) -> StoreResult<Stored<T>> {
        let body = serde_json::to_value(&value)?;
        let id = self.insert(T::COLLECTION, body).await?;
        Ok(Stored { id, version: 1, value })
    }

    /// Write back a modified record, bumping its version in place
    async fn save<T: Entity>(&mut self, stored: &mut Stored<T>) -> StoreResult<()> {
        let body = serde_json::to_value(&stored.value)?;
        stored.version = self
            .update(T::COLLECTION, &stored.id, stored.version, body)
            .await?;
        Ok(())
    }

    async fn remove<T: Entity>(&mut self, stored: &Stored<T>) -> StoreResult<()> {
        self.delete(T::COLLECTION, &stored.id, stored.version).await
    }
}

impl<U: UnitOfWork + ?Sized> UnitOfWorkExt for U {}
