//! Conflict-aware batch writer.

use std::time::Duration;

use crate::error::StoreError;
use crate::store::{TargetCollection, WriteFailure, WriteFailureKind};
use crate::types::{BatchResult, ConflictPolicy, Namespace, Record};

use super::BatchSink;

/// Writes batches with one unordered bulk insert each.
///
/// A batch whose only failures are duplicate keys is recoverable and resolved per
/// [`ConflictPolicy`]. Any other failure is fatal.
#[derive(Debug, Clone)]
pub struct BatchWriter {
    policy: ConflictPolicy,
    timeout: Duration,
}

impl BatchWriter {
    /// Writer applying `policy`, with `timeout` on every store call.
    pub fn new(policy: ConflictPolicy, timeout: Duration) -> Self {
        Self { policy, timeout }
    }

    /// Write one batch into `collection`.
    pub fn write_batch(
        &self,
        collection: &dyn TargetCollection,
        batch: &[Record],
        result: &mut BatchResult,
    ) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }

        let outcome = collection.insert_many(batch, self.timeout)?;
        let failed = outcome.failures.len();
        if failed > batch.len() {
            return Err(StoreError::Rejected(format!(
                "store reported {failed} failures for a batch of {}",
                batch.len()
            )));
        }
        result.add_inserted((batch.len() - failed) as u64);
        if failed == 0 {
            return Ok(());
        }

        let primary_key = collection.primary_key();
        if let Some(fatal) = outcome
            .failures
            .iter()
            .find(|f| f.kind != WriteFailureKind::DuplicateKey)
        {
            return Err(describe_rejection(fatal, batch, primary_key));
        }

        match self.policy {
            ConflictPolicy::Skip => result.add_skipped(failed as u64),
            ConflictPolicy::Reject => {
                for failure in &outcome.failures {
                    let key = batch
                        .get(failure.index)
                        .and_then(|doc| doc.key(primary_key))
                        .map_or_else(|| format!("#{}", failure.index), |k| k.to_string());
                    result.add_failure(key, "duplicate key");
                }
            }
            ConflictPolicy::Overwrite => {
                for failure in &outcome.failures {
                    let Some(doc) = batch.get(failure.index) else {
                        return Err(unknown_index(failure.index));
                    };
                    match doc.key(primary_key) {
                        Some(key) => {
                            collection.replace_one(&key, doc, self.timeout)?;
                            result.add_updated(1);
                        }
                        None => result.add_failure(
                            format!("#{}", failure.index),
                            "duplicate key on a record without a primary key",
                        ),
                    }
                }
            }
        }

        tracing::debug!(
            batch_len = batch.len(),
            duplicates = failed,
            policy = ?self.policy,
            "resolved duplicate keys"
        );
        Ok(())
    }
}

impl BatchSink for BatchWriter {
    fn process_batch(
        &mut self,
        _namespace: Option<&Namespace>,
        collection: &dyn TargetCollection,
        batch: Vec<Record>,
        result: &mut BatchResult,
    ) -> Result<(), StoreError> {
        self.write_batch(collection, &batch, result)
    }
}

fn describe_rejection(failure: &WriteFailure, batch: &[Record], primary_key: &str) -> StoreError {
    let Some(doc) = batch.get(failure.index) else {
        return unknown_index(failure.index);
    };
    let key = doc
        .key(primary_key)
        .map_or_else(|| format!("#{}", failure.index), |k| k.to_string());
    let reason = match &failure.kind {
        WriteFailureKind::Other(reason) => reason.as_str(),
        WriteFailureKind::DuplicateKey => "duplicate key",
    };
    StoreError::Rejected(format!("document {key}: {reason}"))
}

fn unknown_index(index: usize) -> StoreError {
    StoreError::Rejected(format!("store reported a failure for unknown batch index {index}"))
}
