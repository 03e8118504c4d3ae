//! Import coordination: drives a [`RecordStream`] into a [`BatchSink`] batch by batch.
//!
//! This module sits "above" [`crate::ingestion`] and [`crate::sink`] and provides:
//!
//! - Sequential batching with namespace-aware flushing
//! - Cooperative cancellation between batches ([`CancellationToken`])
//! - Real-time progress counters + observer hooks for monitoring

mod cancel;
mod observer;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::ImportError;
use crate::ingestion::{DetectedFormat, ImportContext, ImportOptions, RecordStream};
use crate::sink::{BatchSink, BatchWriter, DryRunPlanner, DryRunPreview};
use crate::store::{Destination, TargetCollection};
use crate::types::{BatchResult, Namespace, Record, Schema};

pub use cancel::CancellationToken;
pub use observer::{ImportProgress, ProgressSnapshot};

/// Terminal status of an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ImportStatus {
    /// The source was exhausted.
    Completed,
    /// The cancellation token was observed between batches.
    Cancelled,
    /// A fatal error stopped the import.
    Failed,
}

/// Lifecycle of an [`ImportCoordinator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportState {
    Idle,
    Running,
    Finished(ImportStatus),
}

/// Everything known about a finished import.
///
/// `result` is always the full accumulated [`BatchResult`], whatever the status.
#[derive(Debug)]
pub struct ImportOutcome {
    pub status: ImportStatus,
    pub result: BatchResult,
    /// Set exactly when `status` is [`ImportStatus::Failed`].
    pub error: Option<ImportError>,
    /// Format used for decoding, if classification got that far.
    pub format: Option<DetectedFormat>,
    /// Inferred columns (CSV only).
    pub schema: Option<Schema>,
    /// Predicted counts for dry runs.
    pub preview: Option<DryRunPreview>,
    /// Final progress.
    pub progress: ProgressSnapshot,
}

impl ImportOutcome {
    pub fn is_completed(&self) -> bool {
        self.status == ImportStatus::Completed
    }

    /// The accumulated counters, or the fatal error.
    pub fn into_result(self) -> Result<BatchResult, ImportError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.result),
        }
    }
}

/// Runs one import from a decoded stream to its terminal status.
///
/// Batches are strictly sequential. After every batch the coordinator publishes a
/// [`ProgressSnapshot`] and then polls the [`CancellationToken`]; a batch already handed to the
/// store is never interrupted. The terminal outcome is reported to the observer exactly once.
pub struct ImportCoordinator<'a> {
    ctx: ImportContext,
    options: &'a ImportOptions,
    cancel: &'a CancellationToken,
    state: ImportState,
    progress: Arc<ImportProgress>,
    last_published: Option<u64>,
}

impl<'a> ImportCoordinator<'a> {
    pub fn new(source: impl Into<String>, options: &'a ImportOptions, cancel: &'a CancellationToken) -> Self {
        Self {
            ctx: ImportContext {
                source: source.into(),
                format: options.format,
                dry_run: options.dry_run,
                policy: options.policy,
            },
            options,
            cancel,
            state: ImportState::Idle,
            progress: Arc::new(ImportProgress::new()),
            last_published: None,
        }
    }

    /// Get a handle to real-time progress counters.
    pub fn progress(&self) -> Arc<ImportProgress> {
        Arc::clone(&self.progress)
    }

    pub fn state(&self) -> ImportState {
        self.state
    }

    pub fn context(&self) -> &ImportContext {
        &self.ctx
    }

    /// Record the format the stream was decoded with.
    pub fn set_format(&mut self, format: DetectedFormat) {
        self.ctx.format = Some(format);
    }

    /// Drive `stream` into `destination` (or only plan it, for dry runs) until it ends.
    pub fn run(mut self, mut stream: Box<dyn RecordStream>, destination: &dyn Destination) -> ImportOutcome {
        self.state = ImportState::Running;
        self.progress.begin(stream.total_estimate());
        let schema = stream.schema().cloned();
        let timeout = self.options.call_timeout();
        let mut result = BatchResult::default();

        tracing::debug!(
            source = %self.ctx.source,
            format = ?self.ctx.format,
            dry_run = self.ctx.dry_run,
            policy = ?self.ctx.policy,
            batch_size = self.options.batch_size,
            "import started"
        );

        let (drove, preview) = if self.options.dry_run {
            let mut planner =
                DryRunPlanner::new(self.options.policy, timeout, self.options.conflict_sample_limit);
            let drove = self.drive(&mut planner, stream.as_mut(), destination, &mut result);
            (drove, Some(planner.into_preview(result.clone())))
        } else {
            let mut writer = BatchWriter::new(self.options.policy, timeout);
            (self.drive(&mut writer, stream.as_mut(), destination, &mut result), None)
        };

        match drove {
            Ok(status) => self.finish(status, result, None, schema, preview),
            Err(e) => self.finish(ImportStatus::Failed, result, Some(e), schema, preview),
        }
    }

    /// End an import that failed before any record could be decoded.
    pub fn fail(self, error: ImportError) -> ImportOutcome {
        self.progress.begin(None);
        self.finish(ImportStatus::Failed, BatchResult::default(), Some(error), None, None)
    }

    fn drive<S: BatchSink>(
        &mut self,
        sink: &mut S,
        stream: &mut dyn RecordStream,
        destination: &dyn Destination,
        result: &mut BatchResult,
    ) -> Result<ImportStatus, ImportError> {
        if self.cancel.is_cancelled() {
            return Ok(ImportStatus::Cancelled);
        }

        let batch_size = self.options.batch_size.max(1);
        let mut handles: HashMap<Option<Namespace>, Arc<dyn TargetCollection>> = HashMap::new();
        let mut carry: Option<(Option<Namespace>, Record)> = None;

        loop {
            let mut batch: Vec<Record> = Vec::with_capacity(batch_size);
            let mut namespace: Option<Namespace> = None;
            let mut exhausted = false;

            if let Some((ns, record)) = carry.take() {
                namespace = ns;
                batch.push(record);
            }

            while batch.len() < batch_size {
                match stream.next() {
                    None => {
                        exhausted = true;
                        break;
                    }
                    Some(Ok(decoded)) => {
                        if !batch.is_empty() && decoded.namespace != namespace {
                            carry = Some((decoded.namespace, decoded.record));
                            break;
                        }
                        namespace = decoded.namespace;
                        batch.push(decoded.record);
                    }
                    Some(Err(e)) if e.is_recoverable() => {
                        tracing::warn!(source = %self.ctx.source, location = %e.location(), error = %e, "skipping undecodable record");
                        result.add_failure(e.location(), e.to_string());
                    }
                    Some(Err(e)) => return Err(e.into()),
                }
            }

            if !batch.is_empty() {
                let collection = match handles.get(&namespace) {
                    Some(handle) => Arc::clone(handle),
                    None => {
                        let handle = destination.resolve(namespace.as_ref())?;
                        handles.insert(namespace.clone(), Arc::clone(&handle));
                        handle
                    }
                };

                let batch_len = batch.len();
                sink.process_batch(namespace.as_ref(), collection.as_ref(), batch, result)?;

                self.progress.on_batch_completed();
                self.progress.on_records(result.records_processed());
                tracing::debug!(
                    source = %self.ctx.source,
                    namespace = ?namespace.as_ref().map(|ns| ns.to_string()),
                    batch_len,
                    processed = result.records_processed(),
                    "batch completed"
                );
                self.publish();

                if self.cancel.is_cancelled() {
                    return Ok(ImportStatus::Cancelled);
                }
            }

            if exhausted {
                return Ok(ImportStatus::Completed);
            }
        }
    }

    fn publish(&mut self) {
        let snapshot = self.progress.snapshot();
        self.last_published = Some(snapshot.records_processed);
        if let Some(obs) = self.options.observer.as_ref() {
            obs.on_progress(&self.ctx, &snapshot);
        }
    }

    fn finish(
        mut self,
        status: ImportStatus,
        result: BatchResult,
        error: Option<ImportError>,
        schema: Option<Schema>,
        preview: Option<DryRunPreview>,
    ) -> ImportOutcome {
        self.progress.on_records(result.records_processed());
        if status == ImportStatus::Cancelled {
            self.progress.on_cancelled();
        }
        self.progress.end();

        if status == ImportStatus::Cancelled
            || self.last_published != Some(self.progress.records_processed())
        {
            self.publish();
        }
        self.state = ImportState::Finished(status);

        let outcome = ImportOutcome {
            status,
            result,
            error,
            format: self.ctx.format,
            schema,
            preview,
            progress: self.progress.snapshot(),
        };

        match &outcome.error {
            Some(e) => tracing::error!(source = %self.ctx.source, status = ?status, error = %e, "import failed"),
            None => tracing::info!(
                source = %self.ctx.source,
                status = ?status,
                processed = outcome.result.records_processed(),
                "import finished"
            ),
        }

        if let Some(obs) = self.options.observer.as_ref() {
            obs.on_finished(&self.ctx, &outcome);
            if let Some(e) = &outcome.error {
                let severity = e.severity();
                if severity >= self.options.alert_at_or_above {
                    obs.on_alert(&self.ctx, severity, e);
                }
            }
        }

        outcome
    }
}

impl fmt::Debug for ImportCoordinator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportCoordinator")
            .field("ctx", &self.ctx)
            .field("state", &self.state)
            .field("progress", &self.progress)
            .finish()
    }
}
