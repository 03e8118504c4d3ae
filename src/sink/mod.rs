//! Batch consumers driven by the coordinator.
//!
//! - [`BatchWriter`]: inserts batches and resolves duplicate keys per [`ConflictPolicy`]
//! - [`DryRunPlanner`]: predicts the writer's counts with one existence check per batch
//!
//! Both see exactly the same batches, so a dry run reports the counts the real import would.
//!
//! [`ConflictPolicy`]: crate::types::ConflictPolicy

pub mod planner;
pub mod writer;

use crate::error::StoreError;
use crate::store::TargetCollection;
use crate::types::{BatchResult, Namespace, Record};

pub use planner::{DryRunPlanner, DryRunPreview, KeyExtractor, plan};
pub use writer::BatchWriter;

/// Consumer of one batch of records bound for one collection.
pub trait BatchSink {
    /// Account for every record of `batch` in `result`, or fail with a fatal store error.
    ///
    /// On error, `result` reflects whatever the store confirmed before failing.
    fn process_batch(
        &mut self,
        namespace: Option<&Namespace>,
        collection: &dyn TargetCollection,
        batch: Vec<Record>,
        result: &mut BatchResult,
    ) -> Result<(), StoreError>;
}
