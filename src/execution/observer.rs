use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

const NO_ESTIMATE: u64 = u64::MAX;

/// Point-in-time view of an import's progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Records accounted for so far (inserted, updated, skipped or failed). Never decreases.
    pub records_processed: u64,
    /// Expected record count, when the decoder knows it.
    pub total_estimate: Option<u64>,
    /// Time since the import started running.
    pub elapsed_ms: u64,
    /// Whether the import stopped because cancellation was requested.
    pub cancelled: bool,
    /// Batches fully processed.
    pub batches_completed: u64,
}

impl fmt::Display for ProgressSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.total_estimate {
            Some(total) => write!(f, "records={}/{}", self.records_processed, total)?,
            None => write!(f, "records={}", self.records_processed)?,
        }
        write!(
            f,
            ", batches={}, elapsed_ms={}, cancelled={}",
            self.batches_completed, self.elapsed_ms, self.cancelled
        )
    }
}

/// Live progress counters for one import.
///
/// The coordinator updates these as it goes; any thread holding the `Arc` can take a
/// [`ImportProgress::snapshot`] at any time.
pub struct ImportProgress {
    started_at: Mutex<Option<Instant>>,
    elapsed_ns: AtomicU64,
    records_processed: AtomicU64,
    batches_completed: AtomicU64,
    total_estimate: AtomicU64,
    cancelled: AtomicBool,
}

impl ImportProgress {
    pub fn new() -> Self {
        Self {
            started_at: Mutex::new(None),
            elapsed_ns: AtomicU64::new(0),
            records_processed: AtomicU64::new(0),
            batches_completed: AtomicU64::new(0),
            total_estimate: AtomicU64::new(NO_ESTIMATE),
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn begin(&self, total_estimate: Option<u64>) {
        *self.started_at.lock().unwrap_or_else(|p| p.into_inner()) = Some(Instant::now());
        self.total_estimate
            .store(total_estimate.unwrap_or(NO_ESTIMATE), Ordering::SeqCst);
    }

    /// Freeze elapsed time at the end of the run.
    pub fn end(&self) {
        let elapsed = self.elapsed();
        self.elapsed_ns
            .store(elapsed.as_nanos().min(u64::MAX as u128) as u64, Ordering::SeqCst);
    }

    /// Raise the processed count. Lower values are ignored so the count never goes backwards.
    pub fn on_records(&self, records_processed: u64) {
        self.records_processed
            .fetch_max(records_processed, Ordering::SeqCst);
    }

    pub fn on_batch_completed(&self) {
        let _ = self.batches_completed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn on_cancelled(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn records_processed(&self) -> u64 {
        self.records_processed.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let total = self.total_estimate.load(Ordering::SeqCst);
        ProgressSnapshot {
            records_processed: self.records_processed.load(Ordering::SeqCst),
            total_estimate: (total != NO_ESTIMATE).then_some(total),
            elapsed_ms: self.elapsed().as_millis().min(u64::MAX as u128) as u64,
            cancelled: self.cancelled.load(Ordering::SeqCst),
            batches_completed: self.batches_completed.load(Ordering::SeqCst),
        }
    }

    fn elapsed(&self) -> Duration {
        let frozen = self.elapsed_ns.load(Ordering::SeqCst);
        if frozen > 0 {
            return Duration::from_nanos(frozen);
        }
        let started_at = *self.started_at.lock().unwrap_or_else(|p| p.into_inner());
        started_at.map(|start| start.elapsed()).unwrap_or_default()
    }
}

impl Default for ImportProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ImportProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ImportProgress").field(&self.snapshot()).finish()
    }
}
