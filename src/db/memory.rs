//! In-process document store
//!
//! Used by tests and by `DATABASE_URL=memory`. Units of work stage their
//! writes privately and validate every version they observed when committing,
//! so two units racing on the same document cannot both succeed. Filtered
//! reads are re-run at commit as well; a matching document inserted since
//! the read fails the commit.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use uuid::Uuid;

use super::error::{StoreError, StoreResult};
use super::store::{Collection, Document, DocumentStore, Filter, UnitOfWork};

type Key = (Collection, String);

#[derive(Default)]
struct State {
    documents: HashMap<Collection, HashMap<String, Document>>,
    /// Collections whose next write fails
    faults: HashSet<Collection>,
}

impl State {
    fn current(&self, collection: Collection, id: &str) -> Option<&Document> {
        self.documents.get(&collection).and_then(|docs| docs.get(id))
    }

    fn take_fault(&mut self, collection: Collection) -> StoreResult<()> {
        if self.faults.remove(&collection) {
            return Err(StoreError::Fault(collection));
        }
        Ok(())
    }
}

/// Document store held entirely in memory
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next write staged against `collection` fail with
    /// [StoreError::Fault]
    pub fn fail_next_write(&self, collection: Collection) {
        self.state.lock().faults.insert(collection);
    }

    pub fn count(&self, collection: Collection) -> usize {
        self.state
            .lock()
            .documents
            .get(&collection)
            .map_or(0, |docs| docs.len())
    }
}

fn matching(docs: Option<&HashMap<String, Document>>, filter: &Filter) -> Vec<Document> {
    let mut found: Vec<Document> = docs
        .into_iter()
        .flat_map(|docs| docs.values())
        .filter(|doc| filter.matches(&doc.body))
        .cloned()
        .collect();
    found.sort_by(|a, b| a.id.cmp(&b.id));
    found
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn find_by_id(&self, collection: Collection, id: &str) -> StoreResult<Option<Document>> {
        Ok(self.state.lock().current(collection, id).cloned())
    }

    async fn find(&self, collection: Collection, filter: &Filter) -> StoreResult<Vec<Document>> {
        let state = self.state.lock();
        Ok(matching(state.documents.get(&collection), filter))
    }

    async fn insert(&self, collection: Collection, body: Value) -> StoreResult<String> {
        let mut state = self.state.lock();
        state.take_fault(collection)?;

        let id = Uuid::new_v4().to_string();
        let doc = Document {
            id: id.clone(),
            version: 1,
            body,
        };
        state
            .documents
            .entry(collection)
            .or_default()
            .insert(id.clone(), doc);
        Ok(id)
    }

    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        Ok(Box::new(MemoryUnitOfWork {
            state: self.state.clone(),
            observed: HashMap::new(),
            scans: Vec::new(),
            staged: HashMap::new(),
            finished: false,
        }))
    }
}

/// Unit of work over a [MemoryStore]
pub struct MemoryUnitOfWork {
    state: Arc<Mutex<State>>,
    /// Version of each committed document as first seen (None if absent)
    observed: HashMap<Key, Option<i64>>,
    /// Filtered reads, checked for documents that appeared afterwards
    scans: Vec<(Collection, Filter)>,
    /// Pending writes; None marks a deletion
    staged: HashMap<Key, Option<Document>>,
    finished: bool,
}

impl MemoryUnitOfWork {
    fn ensure_open(&self) -> StoreResult<()> {
        if self.finished {
            return Err(StoreError::Finished);
        }
        Ok(())
    }

    /// The document as this unit sees it, recording the committed version
    fn visible(&mut self, state: &State, collection: Collection, id: &str) -> Option<Document> {
        let key = (collection, id.to_string());
        if let Some(staged) = self.staged.get(&key) {
            return staged.clone();
        }
        let current = state.current(collection, id).cloned();
        self.observed
            .entry(key)
            .or_insert_with(|| current.as_ref().map(|doc| doc.version));
        current
    }

    fn finish(&mut self) {
        self.finished = true;
        self.observed.clear();
        self.scans.clear();
        self.staged.clear();
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn find_by_id(
        &mut self,
        collection: Collection,
        id: &str,
    ) -> StoreResult<Option<Document>> {
        self.ensure_open()?;
        let state = self.state.clone();
        let state = state.lock();
        Ok(self.visible(&state, collection, id))
    }

    async fn find(&mut self, collection: Collection, filter: &Filter) -> StoreResult<Vec<Document>> {
        self.ensure_open()?;
        let state = self.state.clone();
        let state = state.lock();

        let mut ids: Vec<String> = state
            .documents
            .get(&collection)
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default();
        ids.extend(
            self.staged
                .keys()
                .filter(|(c, id)| *c == collection && state.current(*c, id).is_none())
                .map(|(_, id)| id.clone()),
        );
        ids.sort();
        self.scans.push((collection, filter.clone()));

        let mut found = Vec::new();
        for id in ids {
            match self.visible(&state, collection, &id) {
                Some(doc) if filter.matches(&doc.body) => found.push(doc),
                _ => {}
            }
        }
        Ok(found)
    }

    async fn insert(&mut self, collection: Collection, body: Value) -> StoreResult<String> {
        self.ensure_open()?;
        self.state.lock().take_fault(collection)?;

        let id = Uuid::new_v4().to_string();
        let key = (collection, id.clone());
        self.observed.insert(key.clone(), None);
        self.staged.insert(
            key,
            Some(Document {
                id: id.clone(),
                version: 1,
                body,
            }),
        );
        Ok(id)
    }

    async fn update(
        &mut self,
        collection: Collection,
        id: &str,
        expected_version: i64,
        body: Value,
    ) -> StoreResult<i64> {
        self.ensure_open()?;
        let state = self.state.clone();
        let mut state = state.lock();
        state.take_fault(collection)?;

        let current = self
            .visible(&state, collection, id)
            .ok_or_else(|| StoreError::Missing {
                collection,
                id: id.to_string(),
            })?;
        if current.version != expected_version {
            return Err(StoreError::Conflict(format!(
                "{collection}/{id} is at version {}, expected {expected_version}",
                current.version
            )));
        }

        let version = expected_version + 1;
        self.staged.insert(
            (collection, id.to_string()),
            Some(Document {
                id: id.to_string(),
                version,
                body,
            }),
        );
        Ok(version)
    }

    async fn delete(
        &mut self,
        collection: Collection,
        id: &str,
        expected_version: i64,
    ) -> StoreResult<()> {
        self.ensure_open()?;
        let state = self.state.clone();
        let mut state = state.lock();
        state.take_fault(collection)?;

        let current = self
            .visible(&state, collection, id)
            .ok_or_else(|| StoreError::Missing {
                collection,
                id: id.to_string(),
            })?;
        if current.version != expected_version {
            return Err(StoreError::Conflict(format!(
                "{collection}/{id} is at version {}, expected {expected_version}",
                current.version
            )));
        }

        self.staged.insert((collection, id.to_string()), None);
        Ok(())
    }

    async fn commit(&mut self) -> StoreResult<()> {
        self.ensure_open()?;
        let state = self.state.clone();
        let mut state = state.lock();

        let stale = self.observed.iter().find(|((collection, id), seen)| {
            state.current(*collection, id).map(|doc| doc.version) != **seen
        });
        if let Some(((collection, id), _)) = stale {
            let reason = format!("{collection}/{id} changed since it was read");
            self.finish();
            return Err(StoreError::Conflict(reason));
        }

        let phantom = self.scans.iter().find_map(|(collection, filter)| {
            state
                .documents
                .get(collection)
                .into_iter()
                .flat_map(|docs| docs.values())
                .find(|doc| {
                    filter.matches(&doc.body)
                        && !self.observed.contains_key(&(*collection, doc.id.clone()))
                })
                .map(|doc| format!("{collection}/{} appeared since a filtered read", doc.id))
        });
        if let Some(reason) = phantom {
            self.finish();
            return Err(StoreError::Conflict(reason));
        }

        for ((collection, id), doc) in self.staged.drain() {
            let docs = state.documents.entry(collection).or_default();
            match doc {
                Some(doc) => {
                    docs.insert(id, doc);
                }
                None => {
                    docs.remove(&id);
                }
            }
        }
        self.finish();
        Ok(())
    }

    async fn rollback(&mut self) -> StoreResult<()> {
        self.ensure_open()?;
        self.finish();
        Ok(())
    }
}
