//! store.rs — generic document-store seam.
//!
//! The real persistence technology stays outside this crate; everything here
//! talks to a small trait with Firestore-shaped semantics: documents are
//! JSON objects addressed by `(collection, id)`, and `update` is a shallow
//! field merge (last writer wins, no transactions).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document, `None` when absent.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>>;

    /// Shallow-merge `fields` into an existing document. Fails when the
    /// document does not exist.
    async fn update(&self, collection: &str, id: &str, fields: Map<String, Value>) -> Result<()>;

    /// Insert a new document and return its generated id.
    async fn create(&self, collection: &str, doc: Value) -> Result<String>;
}

/// Fetch and deserialize in one step.
pub async fn get_typed<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
    id: &str,
) -> Result<Option<T>> {
    match store.get(collection, id).await? {
        Some(value) => {
            let doc = serde_json::from_value(value)
                .with_context(|| format!("malformed {collection} document {id}"))?;
            Ok(Some(doc))
        }
        None => Ok(None),
    }
}

/// In-memory implementation backing the default wiring and every test.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, HashMap<String, Value>>>,
    next_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document with a known id (test/bootstrap helper).
    pub fn insert(&self, collection: &str, id: &str, doc: Value) {
        let mut collections = self.collections.lock().expect("store mutex poisoned");
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), doc);
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        let collections = self.collections.lock().expect("store mutex poisoned");
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn update(&self, collection: &str, id: &str, fields: Map<String, Value>) -> Result<()> {
        let mut collections = self.collections.lock().expect("store mutex poisoned");
        let doc = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| anyhow!("no such document: {collection}/{id}"))?;

        let obj = doc
            .as_object_mut()
            .ok_or_else(|| anyhow!("document {collection}/{id} is not an object"))?;
        for (key, value) in fields {
            obj.insert(key, value);
        }
        Ok(())
    }

    async fn create(&self, collection: &str, doc: Value) -> Result<String> {
        let id = format!("{collection}-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.insert(collection, &id, doc);
        Ok(id)
    }
}
