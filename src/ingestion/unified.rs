//! Unified import entrypoint.
//!
//! Most callers should use [`import_from_path`], which imports a file (or a dump directory) into
//! a [`crate::store::Destination`].
//!
//! - If [`ImportOptions::format`] is `None`, the format is sniffed from the content; the file
//!   extension is only used to warn about mismatches.
//! - If an [`super::observability::ImportObserver`] is provided, progress, the final outcome and
//!   alerts are reported to it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ImportError, ImportResult};
use crate::execution::{CancellationToken, ImportCoordinator, ImportOutcome};
use crate::store::Destination;
use crate::types::ConflictPolicy;

use super::decode::{DecodeOptions, RecordStream, open_decoder};
use super::directory::DirectoryDecoder;
use super::observability::{ImportObserver, ImportSeverity};
use super::sniff::{DetectedFormat, detect_format};
use super::source::RawSource;

/// Options controlling an import.
///
/// Use [`Default`] for common cases. Every field except the observer can be loaded from JSON with
/// [`ImportOptions::from_json_str`]; missing fields take their default.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportOptions {
    /// If `None`, classify the source by content.
    pub format: Option<DetectedFormat>,
    /// How duplicate keys are resolved.
    pub policy: ConflictPolicy,
    /// Only predict counts; never write.
    pub dry_run: bool,
    /// Records per bulk insert. Must be > 0.
    pub batch_size: usize,
    /// Timeout applied to every store call. Must be > 0.
    pub call_timeout_ms: u64,
    /// Leading CSV rows used for schema inference.
    pub csv_sample_rows: usize,
    /// Glob restricting which archive/directory entries are imported, e.g. `"shop/*.json"`.
    pub include: Option<String>,
    /// Maximum nesting of archives inside archives.
    pub max_archive_depth: usize,
    /// Number of conflicting keys kept in a dry-run preview.
    pub conflict_sample_limit: usize,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: ImportSeverity,
    /// Optional observer for progress/outcome/alerts.
    #[serde(skip)]
    pub observer: Option<Arc<dyn ImportObserver>>,
}

impl fmt::Debug for ImportOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportOptions")
            .field("format", &self.format)
            .field("policy", &self.policy)
            .field("dry_run", &self.dry_run)
            .field("batch_size", &self.batch_size)
            .field("call_timeout_ms", &self.call_timeout_ms)
            .field("csv_sample_rows", &self.csv_sample_rows)
            .field("include", &self.include)
            .field("max_archive_depth", &self.max_archive_depth)
            .field("conflict_sample_limit", &self.conflict_sample_limit)
            .field("alert_at_or_above", &self.alert_at_or_above)
            .field("observer_set", &self.observer.is_some())
            .finish()
    }
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            format: None,
            policy: ConflictPolicy::Skip,
            dry_run: false,
            batch_size: 256,
            call_timeout_ms: 30_000,
            csv_sample_rows: 100,
            include: None,
            max_archive_depth: 4,
            conflict_sample_limit: 20,
            alert_at_or_above: ImportSeverity::Critical,
            observer: None,
        }
    }
}

impl ImportOptions {
    /// Parse options from a JSON object.
    pub fn from_json_str(json: &str) -> ImportResult<Self> {
        serde_json::from_str(json).map_err(|e| ImportError::Config {
            message: e.to_string(),
        })
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Reject settings no import can run with.
    pub fn validate(&self) -> ImportResult<()> {
        if self.batch_size == 0 {
            return Err(ImportError::Config {
                message: "batch_size must be > 0".to_string(),
            });
        }
        if self.call_timeout_ms == 0 {
            return Err(ImportError::Config {
                message: "call_timeout_ms must be > 0".to_string(),
            });
        }
        Ok(())
    }

    /// Decoder settings derived from these options.
    pub fn decode_options(&self) -> ImportResult<DecodeOptions> {
        let include = match &self.include {
            Some(pattern) => Some(glob::Pattern::new(pattern).map_err(|e| ImportError::Config {
                message: format!("invalid include pattern '{pattern}': {e}"),
            })?),
            None => None,
        };
        Ok(DecodeOptions {
            csv_sample_rows: self.csv_sample_rows,
            include,
            max_archive_depth: self.max_archive_depth,
        })
    }
}

/// Import a file or a dump directory into `destination`.
///
/// Never panics and never returns early: every failure, including a missing file or an
/// unrecognized format, ends in an [`ImportOutcome`] with [`crate::execution::ImportStatus::Failed`]
/// and is reported to the observer like any other terminal status.
///
/// # Examples
///
/// ## Import an export archive, overwriting existing documents
///
/// ```no_run
/// use rust_data_import::execution::CancellationToken;
/// use rust_data_import::ingestion::{ImportOptions, import_from_path};
/// use rust_data_import::store::MemoryStore;
/// use rust_data_import::types::ConflictPolicy;
///
/// let store = MemoryStore::new();
/// let opts = ImportOptions {
///     policy: ConflictPolicy::Overwrite,
///     ..Default::default()
/// };
/// let outcome = import_from_path("export.zip", &store, &opts, &CancellationToken::new());
/// println!("{:?}: inserted={}", outcome.status, outcome.result.inserted());
/// ```
///
/// ## Dry run with tracing output
///
/// ```no_run
/// use std::sync::Arc;
///
/// use rust_data_import::execution::CancellationToken;
/// use rust_data_import::ingestion::{ImportOptions, TracingObserver, import_from_path};
/// use rust_data_import::store::MemoryStore;
///
/// let store = MemoryStore::new();
/// let opts = ImportOptions {
///     dry_run: true,
///     observer: Some(Arc::new(TracingObserver)),
///     ..Default::default()
/// };
/// let outcome = import_from_path("people.ndjson", &store, &opts, &CancellationToken::new());
/// if let Some(preview) = outcome.preview {
///     println!("would insert {}", preview.would_insert());
/// }
/// ```
pub fn import_from_path(
    path: impl AsRef<Path>,
    destination: &dyn Destination,
    options: &ImportOptions,
    cancel: &CancellationToken,
) -> ImportOutcome {
    let path = path.as_ref();
    if path.is_dir() {
        let coordinator = ImportCoordinator::new(path.display().to_string(), options, cancel);
        let stream = options
            .validate()
            .and_then(|()| options.decode_options())
            .and_then(|decode| DirectoryDecoder::open(path, decode).map_err(ImportError::from));
        return match stream {
            Ok(stream) => coordinator.run(Box::new(stream), destination),
            Err(e) => coordinator.fail(e),
        };
    }

    match RawSource::from_path(path) {
        Ok(source) => import_source(source, destination, options, cancel),
        Err(e) => ImportCoordinator::new(path.display().to_string(), options, cancel).fail(e.into()),
    }
}

/// Import an already-open source into `destination`.
pub fn import_source(
    mut source: RawSource,
    destination: &dyn Destination,
    options: &ImportOptions,
    cancel: &CancellationToken,
) -> ImportOutcome {
    let mut coordinator = ImportCoordinator::new(source.name(), options, cancel);
    if let Err(e) = options.validate() {
        return coordinator.fail(e);
    }

    let format = match options.format {
        Some(forced) => forced,
        None => match detect_format(&mut source) {
            Ok(sniffed) => {
                warn_on_extension_mismatch(&source, sniffed);
                sniffed
            }
            Err(e) => return coordinator.fail(e.into()),
        },
    };
    if format == DetectedFormat::Unknown {
        return coordinator.fail(ImportError::Classification {
            source_name: source.name().to_string(),
        });
    }
    coordinator.set_format(format);

    match open_stream(format, source, options) {
        Ok(stream) => coordinator.run(stream, destination),
        Err(e) => coordinator.fail(e),
    }
}

fn open_stream(
    format: DetectedFormat,
    source: RawSource,
    options: &ImportOptions,
) -> ImportResult<Box<dyn RecordStream>> {
    let decode = options.decode_options()?;
    open_decoder(format, source, &decode)
}

fn warn_on_extension_mismatch(source: &RawSource, sniffed: DetectedFormat) {
    let Some(hinted) = source.extension().and_then(DetectedFormat::from_extension) else {
        return;
    };
    // A lone-object `.ndjson` file sniffs as JsonArray and decodes the same either way.
    let compatible = hinted == sniffed
        || matches!(
            (hinted, sniffed),
            (DetectedFormat::Ndjson, DetectedFormat::JsonArray)
                | (DetectedFormat::JsonArray, DetectedFormat::Ndjson)
        );
    if !compatible {
        tracing::warn!(
            source = %source.name(),
            extension = ?source.extension(),
            ?sniffed,
            "file extension does not match its content; using the sniffed format"
        );
    }
}

/// Convenience helper for callers that want an owned request object.
///
/// This can be useful if you want to enqueue imports in a job system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRequest {
    /// Path to the input file or dump directory.
    pub path: PathBuf,
    /// Options controlling the import.
    #[serde(default)]
    pub options: ImportOptions,
}

impl ImportRequest {
    /// Execute the request by calling [`import_from_path`].
    pub fn run(&self, destination: &dyn Destination, cancel: &CancellationToken) -> ImportOutcome {
        import_from_path(&self.path, destination, &self.options, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_load_from_partial_json() {
        let opts = ImportOptions::from_json_str(
            r#"{"format":"ndjson","policy":"overwrite","batch_size":10,"include":"db/*.json"}"#,
        )
        .unwrap();
        assert_eq!(opts.format, Some(DetectedFormat::Ndjson));
        assert_eq!(opts.policy, ConflictPolicy::Overwrite);
        assert_eq!(opts.batch_size, 10);
        assert_eq!(opts.csv_sample_rows, 100);
        assert!(opts.decode_options().unwrap().includes("db/users.json"));
        assert!(!opts.decode_options().unwrap().includes("other/users.json"));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let opts = ImportOptions {
            batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(opts.validate(), Err(ImportError::Config { .. })));
    }

    #[test]
    fn zero_call_timeout_is_rejected() {
        let opts = ImportOptions {
            call_timeout_ms: 0,
            ..Default::default()
        };
        assert!(matches!(opts.validate(), Err(ImportError::Config { message }) if message.contains("call_timeout_ms")));
        assert!(ImportOptions::default().validate().is_ok());
    }

    #[test]
    fn format_and_policy_use_the_same_json_casing() {
        let json = serde_json::to_value(ImportOptions {
            format: Some(DetectedFormat::JsonArray),
            policy: ConflictPolicy::Reject,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(json["format"], "jsonarray");
        assert_eq!(json["policy"], "reject");

        let back = ImportOptions::from_json_str(r#"{"format":"jsonarray"}"#).unwrap();
        assert_eq!(back.format, Some(DetectedFormat::JsonArray));
        assert!(ImportOptions::from_json_str(r#"{"format":"JsonArray"}"#).is_err());
    }

    #[test]
    fn bad_include_pattern_is_a_config_error() {
        let opts = ImportOptions {
            include: Some("[".to_string()),
            ..Default::default()
        };
        assert!(matches!(opts.decode_options(), Err(ImportError::Config { .. })));
    }
}
