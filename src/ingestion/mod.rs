//! Ingestion entrypoints and implementations.
//!
//! Most callers should use [`import_from_path`] (from [`unified`]) which:
//!
//! - classifies the source by content (or you can force a format via [`ImportOptions`])
//! - decodes it lazily into records and writes them in batches (or previews a dry run)
//! - optionally reports progress/outcome/alerts to an [`ImportObserver`]
//!
//! Format-specific decoders are also available under:
//! - [`json`] (JSON array and NDJSON)
//! - [`csv`]
//! - [`archive`] (ZIP exports) and [`directory`] (unpacked dump directories)

pub mod archive;
pub mod csv;
pub mod decode;
pub mod directory;
pub mod json;
pub mod observability;
pub mod sniff;
pub mod source;
pub mod unified;

pub use decode::{DecodeOptions, Decoded, RecordStream, open_decoder};
pub use observability::{
    ChannelObserver, CompositeObserver, ImportContext, ImportEvent, ImportEventReceiver, ImportObserver, ImportSeverity,
    SharedProgress, TracingObserver,
};
pub use sniff::{DetectedFormat, SNIFF_PREFIX_LEN, detect_format, detect_format_bytes};
pub use source::RawSource;
pub use unified::{ImportOptions, ImportRequest, import_from_path, import_source};
