use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use crate::{Collection, Document, DocumentRef, DocumentStore, Payload, StoreError};

/// Simple in-memory document store for tests and local runs.
///
/// Ids are decimal strings drawn from one counter shared by all collections.
/// Index lookups scan the collection for the index's key field.
pub struct InMemoryStore {
    inner: Mutex<State>,
}

#[derive(Default)]
struct State {
    next_id: u64,
    collections: HashMap<Collection, BTreeMap<u64, Payload>>,
}

impl State {
    fn find(&self, collection: Collection, term: &str) -> Option<Document> {
        let field = collection.key_field();
        self.collections.get(&collection).and_then(|docs| {
            docs.iter()
                .find(|(_, data)| data.get(field).and_then(Value::as_str) == Some(term))
                .map(|(id, data)| document(collection, *id, data.clone()))
        })
    }

    fn insert(&mut self, collection: Collection, data: Payload) -> Document {
        self.next_id += 1;
        let id = self.next_id;
        self.collections
            .entry(collection)
            .or_default()
            .insert(id, data.clone());
        document(collection, id, data)
    }

    fn overwrite(&mut self, reference: &DocumentRef, data: Payload) -> Result<Document, StoreError> {
        let not_found = || {
            StoreError::NotFound(format!("{}/{}", reference.collection(), reference.id()))
        };
        let collection = Collection::parse(reference.collection()).ok_or_else(not_found)?;
        let id: u64 = reference.id().parse().map_err(|_| not_found())?;
        let slot = self
            .collections
            .get_mut(&collection)
            .and_then(|docs| docs.get_mut(&id))
            .ok_or_else(not_found)?;
        *slot = data.clone();
        Ok(document(collection, id, data))
    }
}

fn document(collection: Collection, id: u64, data: Payload) -> Document {
    Document::new(DocumentRef::in_collection(collection, id.to_string()), data)
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(State::default()),
        }
    }

    /// Number of documents stored in `collection`.
    pub fn len(&self, collection: Collection) -> Result<usize, StoreError> {
        let state = self.lock()?;
        Ok(state.collections.get(&collection).map_or(0, BTreeMap::len))
    }

    pub fn is_empty(&self, collection: Collection) -> Result<bool, StoreError> {
        Ok(self.len(collection)? == 0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Database("mutex poisoned".into()))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn find_first(&self, index: &str, term: &str) -> Result<Option<Document>, StoreError> {
        let collection = Collection::from_index(index)
            .ok_or_else(|| StoreError::Database(format!("index not found: {index}")))?;
        Ok(self.lock()?.find(collection, term))
    }

    async fn create(&self, collection: Collection, data: Payload) -> Result<Document, StoreError> {
        Ok(self.lock()?.insert(collection, data))
    }

    async fn replace(
        &self,
        reference: &DocumentRef,
        data: Payload,
    ) -> Result<Document, StoreError> {
        self.lock()?.overwrite(reference, data)
    }

    // Lookup and write share one lock, so concurrent upserts of a key never
    // both create.
    async fn upsert_by_index(
        &self,
        collection: Collection,
        term: &str,
        data: Payload,
    ) -> Result<Document, StoreError> {
        let mut state = self.lock()?;
        match state.find(collection, term) {
            Some(existing) => state.overwrite(&existing.reference, data),
            None => Ok(state.insert(collection, data)),
        }
    }
}
