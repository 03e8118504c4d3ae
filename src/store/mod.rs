//! Target-store interface.
//!
//! The import never opens connections itself. Callers hand it a [`Destination`] that resolves
//! namespaces to already-open [`TargetCollection`] handles. [`memory`] provides an in-process
//! implementation.

pub mod memory;

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::StoreError;
use crate::types::{Namespace, Record, RecordKey};

pub use memory::{MemoryCollection, MemoryStore};

/// Why one document of a bulk insert was not written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteFailureKind {
    /// A document with the same primary key already exists.
    DuplicateKey,
    /// Any other per-document rejection (validation, size limit, ...).
    Other(String),
}

/// Per-document failure of a bulk insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteFailure {
    /// Position of the document in the submitted batch.
    pub index: usize,
    /// What went wrong.
    pub kind: WriteFailureKind,
}

/// Result of an unordered bulk insert: every document not listed in `failures` was inserted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertManyOutcome {
    /// Failed documents, in batch order.
    pub failures: Vec<WriteFailure>,
}

impl InsertManyOutcome {
    /// Whether every failure is a duplicate-key violation.
    pub fn only_duplicates(&self) -> bool {
        self.failures
            .iter()
            .all(|f| f.kind == WriteFailureKind::DuplicateKey)
    }
}

/// Handle to one collection of the target store.
///
/// Every call carries a timeout; implementations return [`StoreError::Timeout`] when it elapses.
pub trait TargetCollection: Send + Sync {
    /// Field that identifies a document.
    fn primary_key(&self) -> &str {
        "_id"
    }

    /// Insert `docs` unordered: a failing document never prevents its siblings from being written.
    fn insert_many(&self, docs: &[Record], timeout: Duration) -> Result<InsertManyOutcome, StoreError>;

    /// Replace the document with `key`, inserting it if absent.
    fn replace_one(&self, key: &RecordKey, doc: &Record, timeout: Duration) -> Result<(), StoreError>;

    /// The subset of `keys` already present. One round trip regardless of `keys.len()`.
    fn existing_keys(
        &self,
        keys: &[RecordKey],
        timeout: Duration,
    ) -> Result<HashSet<RecordKey>, StoreError>;

    /// Number of stored documents.
    fn count(&self, timeout: Duration) -> Result<u64, StoreError>;
}

/// Resolves record namespaces to collection handles.
pub trait Destination: Send + Sync {
    /// Collection for records without a namespace of their own.
    fn default_collection(&self) -> Result<Arc<dyn TargetCollection>, StoreError>;

    /// Collection for records decoded from a `<database>/<collection>` entry.
    fn collection(&self, namespace: &Namespace) -> Result<Arc<dyn TargetCollection>, StoreError>;

    /// Handle for an optional namespace.
    fn resolve(&self, namespace: Option<&Namespace>) -> Result<Arc<dyn TargetCollection>, StoreError> {
        match namespace {
            Some(ns) => self.collection(ns),
            None => self.default_collection(),
        }
    }
}

/// Routes every record, whatever its namespace, into one collection.
#[derive(Clone)]
pub struct SingleCollection(pub Arc<dyn TargetCollection>);

impl Destination for SingleCollection {
    fn default_collection(&self) -> Result<Arc<dyn TargetCollection>, StoreError> {
        Ok(Arc::clone(&self.0))
    }

    fn collection(&self, _namespace: &Namespace) -> Result<Arc<dyn TargetCollection>, StoreError> {
        Ok(Arc::clone(&self.0))
    }
}

impl fmt::Debug for SingleCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleCollection")
            .field("primary_key", &self.0.primary_key())
            .finish()
    }
}
