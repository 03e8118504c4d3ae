//! In-process target store.
//!
//! Behaves like a document store with a unique primary-key index: bulk inserts are unordered
//! and report duplicate keys per document. Documents without a primary key get a generated
//! [`ObjectId`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::error::StoreError;
use crate::types::{Namespace, ObjectId, Record, RecordKey, Value};

use super::{Destination, InsertManyOutcome, TargetCollection, WriteFailure, WriteFailureKind};

/// One in-memory collection.
#[derive(Debug)]
pub struct MemoryCollection {
    primary_key: String,
    docs: Mutex<BTreeMap<RecordKey, Record>>,
    next_id: AtomicU64,
}

impl MemoryCollection {
    /// Empty collection keyed by `_id`.
    pub fn new() -> Self {
        Self::with_primary_key("_id")
    }

    /// Empty collection keyed by `primary_key`.
    pub fn with_primary_key(primary_key: impl Into<String>) -> Self {
        Self {
            primary_key: primary_key.into(),
            docs: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Collection pre-filled with `docs` (later duplicates replace earlier ones).
    pub fn with_documents(primary_key: impl Into<String>, docs: impl IntoIterator<Item = Record>) -> Self {
        let collection = Self::with_primary_key(primary_key);
        {
            let mut stored = collection.lock();
            for doc in docs {
                let (key, doc) = collection.keyed(doc);
                stored.insert(key, doc);
            }
        }
        collection
    }

    /// Stored document with `key`.
    pub fn get(&self, key: &RecordKey) -> Option<Record> {
        self.lock().get(key).cloned()
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<RecordKey, Record>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.docs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn keyed(&self, mut doc: Record) -> (RecordKey, Record) {
        if let Some(key) = doc.key(&self.primary_key) {
            return (key, doc);
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut bytes = [0u8; 12];
        bytes[4..].copy_from_slice(&n.to_be_bytes());
        let id = Value::ObjectId(ObjectId::from_bytes(bytes));
        let key = RecordKey::from_value(&id);
        doc.insert(self.primary_key.clone(), id);
        (key, doc)
    }
}

impl Default for MemoryCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetCollection for MemoryCollection {
    fn primary_key(&self) -> &str {
        &self.primary_key
    }

    fn insert_many(&self, docs: &[Record], _timeout: Duration) -> Result<InsertManyOutcome, StoreError> {
        let mut stored = self.lock();
        let mut outcome = InsertManyOutcome::default();
        for (index, doc) in docs.iter().enumerate() {
            let (key, doc) = self.keyed(doc.clone());
            if stored.contains_key(&key) {
                outcome.failures.push(WriteFailure {
                    index,
                    kind: WriteFailureKind::DuplicateKey,
                });
            } else {
                stored.insert(key, doc);
            }
        }
        Ok(outcome)
    }

    fn replace_one(&self, key: &RecordKey, doc: &Record, _timeout: Duration) -> Result<(), StoreError> {
        self.lock().insert(key.clone(), doc.clone());
        Ok(())
    }

    fn existing_keys(
        &self,
        keys: &[RecordKey],
        _timeout: Duration,
    ) -> Result<HashSet<RecordKey>, StoreError> {
        let stored = self.lock();
        Ok(keys.iter().filter(|k| stored.contains_key(*k)).cloned().collect())
    }

    fn count(&self, _timeout: Duration) -> Result<u64, StoreError> {
        Ok(self.lock().len() as u64)
    }
}

/// In-memory catalog of [`MemoryCollection`]s, created on first use.
#[derive(Debug)]
pub struct MemoryStore {
    primary_key: String,
    default: Arc<MemoryCollection>,
    collections: Mutex<HashMap<Namespace, Arc<MemoryCollection>>>,
}

impl MemoryStore {
    /// Empty store keyed by `_id`.
    pub fn new() -> Self {
        Self::with_primary_key("_id")
    }

    /// Empty store whose collections are keyed by `primary_key`.
    pub fn with_primary_key(primary_key: impl Into<String>) -> Self {
        let primary_key = primary_key.into();
        Self {
            default: Arc::new(MemoryCollection::with_primary_key(primary_key.clone())),
            primary_key,
            collections: Mutex::new(HashMap::new()),
        }
    }

    /// The collection used for records without a namespace.
    pub fn default_handle(&self) -> Arc<MemoryCollection> {
        Arc::clone(&self.default)
    }

    /// The collection for `namespace`, creating it if needed.
    pub fn handle(&self, namespace: &Namespace) -> Arc<MemoryCollection> {
        let mut collections = self
            .collections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(
            collections
                .entry(namespace.clone())
                .or_insert_with(|| Arc::new(MemoryCollection::with_primary_key(self.primary_key.clone()))),
        )
    }

    /// Namespaces created so far, sorted.
    pub fn namespaces(&self) -> Vec<Namespace> {
        let collections = self
            .collections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut out: Vec<Namespace> = collections.keys().cloned().collect();
        out.sort();
        out
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Destination for MemoryStore {
    fn default_collection(&self) -> Result<Arc<dyn TargetCollection>, StoreError> {
        Ok(self.default_handle())
    }

    fn collection(&self, namespace: &Namespace) -> Result<Arc<dyn TargetCollection>, StoreError> {
        Ok(self.handle(namespace))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str) -> Record {
        Record::new().with("_id", Value::String(id.to_string()))
    }

    #[test]
    fn insert_many_reports_duplicates_per_document() {
        let c = MemoryCollection::with_documents("_id", vec![doc("K1")]);
        let outcome = c
            .insert_many(&[doc("K1"), doc("K3"), doc("K3")], Duration::from_secs(1))
            .unwrap();
        let indexes: Vec<usize> = outcome.failures.iter().map(|f| f.index).collect();
        assert_eq!(indexes, vec![0, 2]);
        assert!(outcome.only_duplicates());
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn documents_without_key_get_generated_ids() {
        let c = MemoryCollection::new();
        let unkeyed = Record::new().with("name", Value::String("Ada".to_string()));
        c.insert_many(&[unkeyed.clone(), unkeyed], Duration::from_secs(1))
            .unwrap();
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn store_creates_collections_per_namespace() {
        let store = MemoryStore::new();
        let ns = Namespace::new("shop", "orders");
        store.collection(&ns).unwrap();
        assert!(Arc::ptr_eq(&store.handle(&ns), &store.handle(&ns)));
        assert_eq!(store.namespaces(), vec![ns]);
    }
}
