use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, TrySendError, sync_channel};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ImportError;
use crate::execution::{ImportOutcome, ImportStatus, ProgressSnapshot};
use crate::types::{BatchResult, ConflictPolicy};

use super::sniff::DetectedFormat;

/// Severity classification used for alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ImportSeverity {
    /// Informational event.
    Info,
    /// Warning-level event (non-fatal).
    Warning,
    /// Error-level event (import failed).
    Error,
    /// Critical error (I/O or store infrastructure failures).
    Critical,
}

/// Context about an import attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportContext {
    /// Display name of the source.
    pub source: String,
    /// Format used for decoding, once known.
    pub format: Option<DetectedFormat>,
    /// Whether this is a dry run.
    pub dry_run: bool,
    /// Conflict policy in effect.
    pub policy: ConflictPolicy,
}

/// Observer interface for import progress and outcomes.
///
/// Callbacks run on the importing thread between batches; implementations must return
/// promptly and never wait on the caller.
pub trait ImportObserver: Send + Sync {
    /// Called after every batch with updated progress.
    fn on_progress(&self, _ctx: &ImportContext, _snapshot: &ProgressSnapshot) {}

    /// Called exactly once when the import reaches a terminal status.
    fn on_finished(&self, _ctx: &ImportContext, _outcome: &ImportOutcome) {}

    /// Called when a fatal error meets the alert threshold.
    fn on_alert(&self, _ctx: &ImportContext, _severity: ImportSeverity, _error: &ImportError) {}
}

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn ImportObserver>>,
}

impl CompositeObserver {
    /// Create a new composite observer from a list of observers.
    pub fn new(observers: Vec<Arc<dyn ImportObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl ImportObserver for CompositeObserver {
    fn on_progress(&self, ctx: &ImportContext, snapshot: &ProgressSnapshot) {
        for o in &self.observers {
            o.on_progress(ctx, snapshot);
        }
    }

    fn on_finished(&self, ctx: &ImportContext, outcome: &ImportOutcome) {
        for o in &self.observers {
            o.on_finished(ctx, outcome);
        }
    }

    fn on_alert(&self, ctx: &ImportContext, severity: ImportSeverity, error: &ImportError) {
        for o in &self.observers {
            o.on_alert(ctx, severity, error);
        }
    }
}

/// Emits import events as `tracing` events.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl ImportObserver for TracingObserver {
    fn on_progress(&self, ctx: &ImportContext, snapshot: &ProgressSnapshot) {
        tracing::info!(
            source = %ctx.source,
            records = snapshot.records_processed,
            total = ?snapshot.total_estimate,
            batches = snapshot.batches_completed,
            elapsed_ms = snapshot.elapsed_ms,
            "import progress"
        );
    }

    fn on_finished(&self, ctx: &ImportContext, outcome: &ImportOutcome) {
        let result = &outcome.result;
        match &outcome.error {
            Some(error) => tracing::error!(
                source = %ctx.source,
                status = ?outcome.status,
                inserted = result.inserted(),
                failed = result.failed(),
                processed = result.records_processed(),
                %error,
                "import finished"
            ),
            None => tracing::info!(
                source = %ctx.source,
                status = ?outcome.status,
                dry_run = ctx.dry_run,
                inserted = result.inserted(),
                updated = result.updated(),
                skipped = result.skipped(),
                failed = result.failed(),
                "import finished"
            ),
        }
    }

    fn on_alert(&self, ctx: &ImportContext, severity: ImportSeverity, error: &ImportError) {
        tracing::error!(source = %ctx.source, ?severity, %error, "ALERT: import failed");
    }
}

/// Keeps the latest snapshot for polling from another thread.
#[derive(Debug, Default)]
pub struct SharedProgress {
    latest: Mutex<Option<ProgressSnapshot>>,
    finished: Mutex<Option<ImportStatus>>,
}

impl SharedProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recently published snapshot.
    pub fn latest(&self) -> Option<ProgressSnapshot> {
        self.latest.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Terminal status, once the import has finished.
    pub fn finished(&self) -> Option<ImportStatus> {
        *self.finished.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl ImportObserver for SharedProgress {
    fn on_progress(&self, _ctx: &ImportContext, snapshot: &ProgressSnapshot) {
        *self.latest.lock().unwrap_or_else(|p| p.into_inner()) = Some(snapshot.clone());
    }

    fn on_finished(&self, _ctx: &ImportContext, outcome: &ImportOutcome) {
        *self.latest.lock().unwrap_or_else(|p| p.into_inner()) = Some(outcome.progress.clone());
        *self.finished.lock().unwrap_or_else(|p| p.into_inner()) = Some(outcome.status);
    }
}

/// Event pushed through a [`ChannelObserver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportEvent {
    /// Progress after a batch.
    Progress(ProgressSnapshot),
    /// Terminal status and final counters.
    Finished {
        status: ImportStatus,
        result: BatchResult,
    },
}

/// Pushes events into a bounded channel without ever blocking the import.
///
/// At most `capacity` progress events wait in the channel; further progress events are dropped
/// until the receiver catches up, and the next one carries newer numbers. One extra slot is kept
/// for [`ImportEvent::Finished`], so the terminal event of an import is always delivered.
#[derive(Debug)]
pub struct ChannelObserver {
    tx: SyncSender<ImportEvent>,
    queued: Arc<AtomicUsize>,
    capacity: usize,
}

impl ChannelObserver {
    /// Create an observer and the receiving end of its channel.
    pub fn bounded(capacity: usize) -> (Self, ImportEventReceiver) {
        let (tx, rx) = sync_channel(capacity + 1);
        let queued = Arc::new(AtomicUsize::new(0));
        let receiver = ImportEventReceiver {
            rx,
            queued: Arc::clone(&queued),
        };
        (Self { tx, queued, capacity }, receiver)
    }

    fn push(&self, event: ImportEvent) {
        let terminal = matches!(event, ImportEvent::Finished { .. });
        if !terminal && self.queued.load(Ordering::SeqCst) >= self.capacity {
            tracing::trace!(?event, "progress channel full; dropping event");
            return;
        }

        self.queued.fetch_add(1, Ordering::SeqCst);
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Disconnected(_)) => {
                self.queued.fetch_sub(1, Ordering::SeqCst);
            }
            Err(TrySendError::Full(event)) => {
                self.queued.fetch_sub(1, Ordering::SeqCst);
                tracing::trace!(?event, "event channel full; dropping event");
            }
        }
    }
}

impl ImportObserver for ChannelObserver {
    fn on_progress(&self, _ctx: &ImportContext, snapshot: &ProgressSnapshot) {
        self.push(ImportEvent::Progress(snapshot.clone()));
    }

    fn on_finished(&self, _ctx: &ImportContext, outcome: &ImportOutcome) {
        self.push(ImportEvent::Finished {
            status: outcome.status,
            result: outcome.result.clone(),
        });
    }
}

/// Receiving end of a [`ChannelObserver`].
///
/// All methods return `None` once no event is available (or, for the blocking ones, once the
/// observer has been dropped).
#[derive(Debug)]
pub struct ImportEventReceiver {
    rx: Receiver<ImportEvent>,
    queued: Arc<AtomicUsize>,
}

impl ImportEventReceiver {
    /// Block until the next event.
    pub fn recv(&self) -> Option<ImportEvent> {
        self.rx.recv().ok().map(|event| self.received(event))
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<ImportEvent> {
        self.rx.recv_timeout(timeout).ok().map(|event| self.received(event))
    }

    pub fn try_recv(&self) -> Option<ImportEvent> {
        self.rx.try_recv().ok().map(|event| self.received(event))
    }

    /// Drain the events queued right now.
    pub fn try_iter(&self) -> impl Iterator<Item = ImportEvent> + '_ {
        std::iter::from_fn(|| self.try_recv())
    }

    fn received(&self, event: ImportEvent) -> ImportEvent {
        self.queued.fetch_sub(1, Ordering::SeqCst);
        event
    }
}
