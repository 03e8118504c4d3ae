#![allow(dead_code)]

use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rust_data_import::StoreError;
use rust_data_import::execution::{CancellationToken, ImportOutcome, ImportStatus, ProgressSnapshot};
use rust_data_import::ingestion::{ImportContext, ImportObserver, ImportSeverity};
use rust_data_import::store::{InsertManyOutcome, MemoryCollection, TargetCollection};
use rust_data_import::types::{Record, RecordKey};
use rust_data_import::ImportError;

pub fn tmp_path(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("rust-data-import-{nanos}-{name}"))
}

/// In-memory ZIP archive; names ending in `/` become directory entries.
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options =
        zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (name, bytes) in entries {
        if name.ends_with('/') {
            writer.add_directory(*name, options).unwrap();
        } else {
            writer.start_file(*name, options).unwrap();
            writer.write_all(bytes).unwrap();
        }
    }
    writer.finish().unwrap().into_inner()
}

/// NDJSON with `_id` values `0..n`.
pub fn numbered_ndjson(n: usize) -> Vec<u8> {
    let mut out = String::new();
    for i in 0..n {
        out.push_str(&format!("{{\"_id\":{i},\"name\":\"user-{i}\"}}\n"));
    }
    out.into_bytes()
}

/// Collection whose `fail_on`-th `insert_many` call (1-based) fails with a transport error.
pub struct FlakyCollection {
    pub inner: MemoryCollection,
    calls: AtomicUsize,
    fail_on: usize,
}

impl FlakyCollection {
    pub fn new(fail_on: usize) -> Self {
        Self {
            inner: MemoryCollection::new(),
            calls: AtomicUsize::new(0),
            fail_on,
        }
    }

    pub fn insert_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TargetCollection for FlakyCollection {
    fn insert_many(&self, docs: &[Record], timeout: Duration) -> Result<InsertManyOutcome, StoreError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_on {
            return Err(StoreError::Transport("connection reset by peer".to_string()));
        }
        self.inner.insert_many(docs, timeout)
    }

    fn replace_one(&self, key: &RecordKey, doc: &Record, timeout: Duration) -> Result<(), StoreError> {
        self.inner.replace_one(key, doc, timeout)
    }

    fn existing_keys(&self, keys: &[RecordKey], timeout: Duration) -> Result<HashSet<RecordKey>, StoreError> {
        self.inner.existing_keys(keys, timeout)
    }

    fn count(&self, timeout: Duration) -> Result<u64, StoreError> {
        self.inner.count(timeout)
    }
}

/// Records every callback it receives.
#[derive(Default)]
pub struct RecordingObserver {
    pub snapshots: Mutex<Vec<ProgressSnapshot>>,
    pub finished: Mutex<Vec<ImportStatus>>,
    pub alerts: Mutex<Vec<ImportSeverity>>,
}

impl ImportObserver for RecordingObserver {
    fn on_progress(&self, _ctx: &ImportContext, snapshot: &ProgressSnapshot) {
        self.snapshots.lock().unwrap().push(snapshot.clone());
    }

    fn on_finished(&self, _ctx: &ImportContext, outcome: &ImportOutcome) {
        self.finished.lock().unwrap().push(outcome.status);
    }

    fn on_alert(&self, _ctx: &ImportContext, severity: ImportSeverity, _error: &ImportError) {
        self.alerts.lock().unwrap().push(severity);
    }
}

/// Cancels `token` once `after_batches` batches have completed.
pub struct CancelAfter {
    pub token: CancellationToken,
    pub after_batches: u64,
}

impl ImportObserver for CancelAfter {
    fn on_progress(&self, _ctx: &ImportContext, snapshot: &ProgressSnapshot) {
        if snapshot.batches_completed == self.after_batches {
            self.token.cancel();
        }
    }
}
