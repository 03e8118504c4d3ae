//! Dry-run planning.
//!
//! The planner batches records exactly like [`super::BatchWriter`] but only asks the store which
//! keys already exist, once per batch. It never calls a mutating store method.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::error::StoreError;
use crate::store::TargetCollection;
use crate::types::{BatchResult, ConflictPolicy, Namespace, Record, RecordKey};

use super::BatchSink;

/// Extracts the identity of a record. `None` means the store would assign one.
pub type KeyExtractor = Box<dyn Fn(&Record) -> Option<RecordKey> + Send + Sync>;

/// Predicted outcome of an import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DryRunPreview {
    /// Policy the prediction assumes.
    pub policy: ConflictPolicy,
    /// Counters in [`BatchResult`] shape: inserted = would insert, updated = would overwrite.
    pub counts: BatchResult,
    /// Up to the configured limit of conflicting keys, in encounter order.
    pub conflict_sample: Vec<RecordKey>,
    /// Total key conflicts found.
    pub conflicts: u64,
}

impl DryRunPreview {
    /// Records that would be inserted.
    pub fn would_insert(&self) -> u64 {
        self.counts.inserted()
    }

    /// Records that would be skipped as duplicates.
    pub fn would_skip(&self) -> u64 {
        self.counts.skipped()
    }

    /// Records that would replace an existing document.
    pub fn would_overwrite(&self) -> u64 {
        self.counts.updated()
    }

    /// Records that would fail, as conflicts or as decode errors.
    pub fn would_reject(&self) -> u64 {
        self.counts.failed()
    }
}

/// [`BatchSink`] that predicts counts without writing.
pub struct DryRunPlanner {
    policy: ConflictPolicy,
    timeout: Duration,
    key_extractor: Option<KeyExtractor>,
    seen: HashMap<Option<Namespace>, HashSet<RecordKey>>,
    sample: Vec<RecordKey>,
    sample_limit: usize,
    conflicts: u64,
}

impl DryRunPlanner {
    /// Planner keyed by each collection's primary key.
    pub fn new(policy: ConflictPolicy, timeout: Duration, sample_limit: usize) -> Self {
        Self {
            policy,
            timeout,
            key_extractor: None,
            seen: HashMap::new(),
            sample: Vec::new(),
            sample_limit,
            conflicts: 0,
        }
    }

    /// Use a custom record identity instead of the collection's primary key.
    pub fn with_key_extractor(mut self, key_extractor: KeyExtractor) -> Self {
        self.key_extractor = Some(key_extractor);
        self
    }

    /// Finish planning, attaching the counts accumulated by the caller.
    pub fn into_preview(self, counts: BatchResult) -> DryRunPreview {
        DryRunPreview {
            policy: self.policy,
            counts,
            conflict_sample: self.sample,
            conflicts: self.conflicts,
        }
    }

    fn extract(&self, record: &Record, collection: &dyn TargetCollection) -> Option<RecordKey> {
        match &self.key_extractor {
            Some(extract) => extract(record),
            None => record.key(collection.primary_key()),
        }
    }
}

impl BatchSink for DryRunPlanner {
    fn process_batch(
        &mut self,
        namespace: Option<&Namespace>,
        collection: &dyn TargetCollection,
        batch: Vec<Record>,
        result: &mut BatchResult,
    ) -> Result<(), StoreError> {
        let keys: Vec<Option<RecordKey>> = batch
            .iter()
            .map(|record| self.extract(record, collection))
            .collect();
        let lookup: Vec<RecordKey> = keys.iter().flatten().cloned().collect();
        let existing = if lookup.is_empty() {
            HashSet::new()
        } else {
            collection.existing_keys(&lookup, self.timeout)?
        };

        let seen = self.seen.entry(namespace.cloned()).or_default();
        for key in keys {
            let Some(key) = key else {
                result.add_inserted(1);
                continue;
            };
            let first_in_import = seen.insert(key.clone());
            if first_in_import && !existing.contains(&key) {
                result.add_inserted(1);
                continue;
            }

            self.conflicts += 1;
            match self.policy {
                ConflictPolicy::Skip => result.add_skipped(1),
                ConflictPolicy::Overwrite => result.add_updated(1),
                ConflictPolicy::Reject => result.add_failure(key.to_string(), "duplicate key"),
            }
            if self.sample.len() < self.sample_limit {
                self.sample.push(key);
            }
        }
        Ok(())
    }
}

impl fmt::Debug for DryRunPlanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DryRunPlanner")
            .field("policy", &self.policy)
            .field("custom_key_extractor", &self.key_extractor.is_some())
            .field("conflicts", &self.conflicts)
            .finish()
    }
}

/// Plan an import of `records` into `collection` without touching it.
pub fn plan(
    records: impl IntoIterator<Item = Record>,
    collection: &dyn TargetCollection,
    key_extractor: Option<KeyExtractor>,
    policy: ConflictPolicy,
    batch_size: usize,
    timeout: Duration,
) -> Result<DryRunPreview, StoreError> {
    let mut planner = DryRunPlanner::new(policy, timeout, 20);
    if let Some(extract) = key_extractor {
        planner = planner.with_key_extractor(extract);
    }

    let mut counts = BatchResult::default();
    let mut batch = Vec::with_capacity(batch_size.max(1));
    for record in records {
        batch.push(record);
        if batch.len() >= batch_size.max(1) {
            planner.process_batch(None, collection, std::mem::take(&mut batch), &mut counts)?;
        }
    }
    if !batch.is_empty() {
        planner.process_batch(None, collection, batch, &mut counts)?;
    }
    Ok(planner.into_preview(counts))
}
