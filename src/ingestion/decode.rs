//! Record streams and decoder dispatch.

use std::fmt;

use crate::error::{DecodeError, ImportError, ImportResult};
use crate::types::{Namespace, Record, Schema};

use super::archive::ArchiveDecoder;
use super::csv::CsvDecoder;
use super::json::{JsonArrayDecoder, NdjsonDecoder};
use super::sniff::{DetectedFormat, detect_format};
use super::source::RawSource;

/// A decoded record and, for multi-collection sources, where it belongs.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    /// Destination derived from the archive/directory entry, if any.
    pub namespace: Option<Namespace>,
    /// The record itself.
    pub record: Record,
}

impl Decoded {
    /// A record without a namespace of its own.
    pub fn new(record: Record) -> Self {
        Self {
            namespace: None,
            record,
        }
    }
}

/// Lazy, single-pass sequence of decoded records.
///
/// Recoverable errors ([`DecodeError::is_recoverable`]) are yielded in place of the record they
/// replace and decoding continues. After a fatal error the stream yields `None`.
pub trait RecordStream: Iterator<Item = Result<Decoded, DecodeError>> + Send {
    /// Expected number of records, when the decoder knows it up front.
    fn total_estimate(&self) -> Option<u64> {
        None
    }

    /// Inferred column layout (CSV only).
    fn schema(&self) -> Option<&Schema> {
        None
    }
}

/// Settings shared by all decoders.
#[derive(Debug, Clone)]
pub struct DecodeOptions {
    /// Leading CSV rows used for schema inference.
    pub csv_sample_rows: usize,
    /// Only archive/directory entries whose path matches are decoded.
    pub include: Option<glob::Pattern>,
    /// Maximum nesting of archives inside archives.
    pub max_archive_depth: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            csv_sample_rows: 100,
            include: None,
            max_archive_depth: 4,
        }
    }
}

impl DecodeOptions {
    pub(crate) fn includes(&self, entry_path: &str) -> bool {
        self.include
            .as_ref()
            .is_none_or(|pattern| pattern.matches(entry_path))
    }
}

/// Open the decoder for `format` over `source`.
///
/// Fails with [`ImportError::Classification`] for [`DetectedFormat::Unknown`], and with a fatal
/// decode error when the document cannot be decoded at all (e.g. malformed JSON array).
pub fn open_decoder(
    format: DetectedFormat,
    source: RawSource,
    options: &DecodeOptions,
) -> ImportResult<Box<dyn RecordStream>> {
    if format == DetectedFormat::Unknown {
        return Err(ImportError::Classification {
            source_name: source.name().to_string(),
        });
    }
    Ok(open_stream(format, source, options, 0)?)
}

fn open_stream(
    format: DetectedFormat,
    source: RawSource,
    options: &DecodeOptions,
    depth: usize,
) -> Result<Box<dyn RecordStream>, DecodeError> {
    Ok(match format {
        DetectedFormat::Zip => Box::new(ArchiveDecoder::open(source.into_reader(), options.clone(), depth)?),
        DetectedFormat::JsonArray => Box::new(JsonArrayDecoder::from_reader(source.into_reader())?),
        DetectedFormat::Ndjson => Box::new(NdjsonDecoder::new(std::io::BufReader::new(source.into_reader()))),
        DetectedFormat::Csv => Box::new(CsvDecoder::from_source(source, options.csv_sample_rows)?),
        DetectedFormat::Unknown => {
            return Err(DecodeError::Document {
                message: "unrecognized format".to_string(),
            });
        }
    })
}

/// Decode one archive or directory entry.
///
/// Nested archives are expanded; everything else must follow `<database>/<collection>.<ext>`.
/// Convention violations and unrecognized content are recoverable [`DecodeError::Entry`]s.
pub(crate) fn open_entry(
    path: &str,
    bytes: Vec<u8>,
    options: &DecodeOptions,
    depth: usize,
) -> Result<Box<dyn RecordStream>, DecodeError> {
    let entry_error = |message: String| DecodeError::Entry {
        path: path.to_string(),
        message,
    };

    let mut source = RawSource::from_bytes(path, bytes);
    let format = detect_format(&mut source).map_err(|e| entry_error(e.to_string()))?;

    match format {
        DetectedFormat::Zip => {
            if depth > options.max_archive_depth {
                return Err(entry_error(format!(
                    "archives nested deeper than {} levels",
                    options.max_archive_depth
                )));
            }
            ArchiveDecoder::open(source.into_reader(), options.clone(), depth)
                .map(|d| Box::new(d) as Box<dyn RecordStream>)
                .map_err(|e| entry_error(e.to_string()))
        }
        DetectedFormat::Unknown => Err(entry_error("unrecognized content".to_string())),
        _ => {
            let namespace = Namespace::from_entry_path(path).map_err(entry_error)?;
            let inner = open_stream(format, source, options, depth)?;
            Ok(Box::new(Namespaced {
                path: path.to_string(),
                namespace,
                inner,
            }))
        }
    }
}

/// Tags every record of an entry with the entry's namespace.
struct Namespaced {
    path: String,
    namespace: Namespace,
    inner: Box<dyn RecordStream>,
}

impl Iterator for Namespaced {
    type Item = Result<Decoded, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(match self.inner.next()? {
            Ok(mut decoded) => {
                decoded.namespace = Some(self.namespace.clone());
                Ok(decoded)
            }
            Err(e) if e.is_recoverable() => Err(DecodeError::Entry {
                path: self.path.clone(),
                message: e.to_string(),
            }),
            Err(e) => Err(e),
        })
    }
}

impl RecordStream for Namespaced {
    fn total_estimate(&self) -> Option<u64> {
        self.inner.total_estimate()
    }

    fn schema(&self) -> Option<&Schema> {
        self.inner.schema()
    }
}

/// Drains entry streams one after another, stopping at the first fatal error.
#[derive(Default)]
pub(crate) struct EntryChain {
    current: Option<Box<dyn RecordStream>>,
    done: bool,
}

impl EntryChain {
    /// Next item of the current entry, opening entries via `open_next` as they run dry.
    ///
    /// `open_next` returns `None` once entries are exhausted and `Ok(None)` for skipped entries.
    pub(crate) fn next_with<F>(&mut self, mut open_next: F) -> Option<Result<Decoded, DecodeError>>
    where
        F: FnMut() -> Option<Result<Option<Box<dyn RecordStream>>, DecodeError>>,
    {
        loop {
            if self.done {
                return None;
            }
            if let Some(current) = self.current.as_mut() {
                match current.next() {
                    Some(item) => {
                        if matches!(&item, Err(e) if !e.is_recoverable()) {
                            self.done = true;
                        }
                        return Some(item);
                    }
                    None => self.current = None,
                }
            }
            match open_next() {
                None => {
                    self.done = true;
                    return None;
                }
                Some(Ok(Some(stream))) => self.current = Some(stream),
                Some(Ok(None)) => {}
                Some(Err(e)) => {
                    if !e.is_recoverable() {
                        self.done = true;
                    }
                    return Some(Err(e));
                }
            }
        }
    }
}

impl fmt::Debug for EntryChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryChain")
            .field("in_entry", &self.current.is_some())
            .field("done", &self.done)
            .finish()
    }
}
