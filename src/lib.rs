//! `rust-data-import` imports exported data files into a document store.
//!
//! The primary entrypoint is [`ingestion::import_from_path`], which classifies the source by
//! content (or you can force a format via [`ingestion::ImportOptions`]), decodes it lazily into
//! [`types::Record`]s and writes them in batches under a [`types::ConflictPolicy`].
//!
//! ## What you can import
//!
//! **Formats (sniffed from the first 8 KiB, not from the extension):**
//!
//! - **ZIP** export archives laid out as `<database>/<collection>.<ext>`, including archives nested
//!   inside archives
//! - **JSON**: an array of objects, or a single object
//! - **NDJSON**: one object per line; bad lines are reported and skipped
//! - **CSV**: comma, tab or semicolon delimited with a header row; cell types are inferred
//! - **Dump directories** with the same layout as an export archive
//!
//! JSON values may use extended JSON tags (`$oid`, `$date`, `$numberLong`, `$binary`, ...), which
//! decode to the matching [`types::Value`] variant.
//!
//! ## Quick example: import NDJSON
//!
//! ```rust
//! use rust_data_import::execution::{CancellationToken, ImportStatus};
//! use rust_data_import::ingestion::{ImportOptions, RawSource, import_source};
//! use rust_data_import::store::MemoryStore;
//!
//! let ndjson = b"{\"_id\": 1, \"name\": \"ada\"}\n{\"_id\": 2, \"name\": \"bob\"}\n".to_vec();
//! let store = MemoryStore::new();
//! let outcome = import_source(
//!     RawSource::from_bytes("people", ndjson),
//!     &store,
//!     &ImportOptions::default(),
//!     &CancellationToken::new(),
//! );
//!
//! assert_eq!(outcome.status, ImportStatus::Completed);
//! assert_eq!(outcome.result.inserted(), 2);
//! assert_eq!(store.default_handle().len(), 2);
//! ```
//!
//! ## Dry-run example
//!
//! ```rust
//! use std::time::Duration;
//!
//! use rust_data_import::sink::plan;
//! use rust_data_import::store::MemoryCollection;
//! use rust_data_import::types::{ConflictPolicy, Record, Value};
//!
//! let existing = MemoryCollection::with_documents("_id", vec![Record::new().with("_id", Value::Int(1))]);
//! let incoming = vec![
//!     Record::new().with("_id", Value::Int(1)),
//!     Record::new().with("_id", Value::Int(2)),
//! ];
//!
//! let preview = plan(incoming, &existing, None, ConflictPolicy::Skip, 256, Duration::from_secs(5)).unwrap();
//! assert_eq!((preview.would_insert(), preview.would_skip()), (1, 1));
//! assert_eq!(existing.len(), 1);
//! ```
//!
//! ## Modules
//!
//! - [`ingestion`]: sniffing, decoders and the unified import entrypoints
//! - [`sink`]: the conflict-aware batch writer and the dry-run planner
//! - [`execution`]: the coordinator, progress counters and cancellation
//! - [`store`]: the target-store traits and an in-memory store
//! - [`types`]: records, values, keys and result counters
//! - [`extjson`]: extended JSON conversion
//! - [`error`]: error types used across the crate

pub mod error;
pub mod execution;
pub mod extjson;
pub mod ingestion;
pub mod sink;
pub mod store;
pub mod types;

pub use error::{DecodeError, ImportError, ImportResult, StoreError};
