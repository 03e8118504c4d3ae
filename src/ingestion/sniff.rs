//! Content-based format detection.
//!
//! Only a bounded prefix ([`SNIFF_PREFIX_LEN`]) is inspected, except when the content opens with
//! a JSON object that does not close (or closes with only whitespace after it) within the prefix:
//! then [`detect_format`] reads on until that first object ends. Checks run in priority order:
//!
//! 1. ZIP local-file-header signature
//! 2. (after stripping a UTF-8 BOM and leading whitespace) `[` → JSON array
//! 3. `{` → NDJSON when at least two lines hold complete objects, otherwise a single object is
//!    treated as a one-element JSON array
//! 4. a delimiter (comma, tab, semicolon) giving a consistent column count on the first two
//!    lines → CSV
//!
//! Anything else is [`DetectedFormat::Unknown`].

use std::io::{self, BufReader, Read, Seek, SeekFrom};

use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};

use super::source::RawSource;

/// Number of leading bytes inspected by [`detect_format`].
pub const SNIFF_PREFIX_LEN: usize = 8 * 1024;

const ZIP_SIGNATURE: &[u8] = b"PK\x03\x04";
pub(crate) const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const CANDIDATE_DELIMITERS: [u8; 3] = [b',', b'\t', b';'];

/// Format classification of a byte source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectedFormat {
    /// ZIP archive of exports.
    Zip,
    /// A JSON array of objects, or a single JSON object.
    JsonArray,
    /// Newline-delimited JSON objects.
    Ndjson,
    /// Delimited text with a header row.
    Csv,
    /// Not decodable.
    Unknown,
}

impl DetectedFormat {
    /// Format conventionally associated with a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "zip" => Some(Self::Zip),
            "json" => Some(Self::JsonArray),
            "ndjson" | "jsonl" => Some(Self::Ndjson),
            "csv" | "tsv" => Some(Self::Csv),
            _ => None,
        }
    }
}

/// Classify `source` from its first [`SNIFF_PREFIX_LEN`] bytes. The source is left rewound.
pub fn detect_format(source: &mut RawSource) -> io::Result<DetectedFormat> {
    detect_format_with_limit(source, SNIFF_PREFIX_LEN)
}

/// [`detect_format`] with an explicit prefix bound.
pub fn detect_format_with_limit(source: &mut RawSource, limit: usize) -> io::Result<DetectedFormat> {
    let prefix = source.peek_prefix(limit)?;
    let complete = prefix.len() < limit || source.size() <= limit as u64;
    let format = detect_format_bytes(&prefix, complete);
    if complete || format != DetectedFormat::JsonArray || !opens_with_object(&prefix) {
        return Ok(format);
    }

    let skip = if prefix.starts_with(UTF8_BOM) { UTF8_BOM.len() as u64 } else { 0 };
    let resolved = classify_first_object(source, skip);
    source.rewind()?;
    resolved
}

fn opens_with_object(prefix: &[u8]) -> bool {
    let text = prefix.strip_prefix(UTF8_BOM).unwrap_or(prefix).trim_ascii_start();
    text.first() == Some(&b'{')
}

/// Read past the prefix until the first top-level object closes, then look at what follows it.
fn classify_first_object(source: &mut RawSource, skip: u64) -> io::Result<DetectedFormat> {
    let reader = source.reader_mut();
    reader.seek(SeekFrom::Start(skip))?;

    let mut buffered = BufReader::new(reader);
    let mut objects = serde_json::Deserializer::from_reader(&mut buffered).into_iter::<IgnoredAny>();
    let end = match objects.next() {
        Some(Ok(_)) => skip + objects.byte_offset() as u64,
        Some(Err(e)) if e.is_io() => return Err(e.into()),
        _ => return Ok(DetectedFormat::Unknown),
    };
    drop(objects);

    let reader = buffered.into_inner();
    reader.seek(SeekFrom::Start(end))?;
    let mut saw_newline = false;
    for byte in BufReader::new(reader).bytes() {
        match byte? {
            b'\n' => saw_newline = true,
            b if b.is_ascii_whitespace() => {}
            b'{' if saw_newline => return Ok(DetectedFormat::Ndjson),
            _ => return Ok(DetectedFormat::Unknown),
        }
    }
    Ok(DetectedFormat::JsonArray)
}

/// Classify a byte prefix.
///
/// `complete` says whether `prefix` is the whole content; when it is not, a trailing partial
/// line is ignored and a JSON object still open at the end of the prefix counts as a single
/// object. [`detect_format`] settles that last case by reading the rest of the first object.
pub fn detect_format_bytes(prefix: &[u8], complete: bool) -> DetectedFormat {
    if prefix.starts_with(ZIP_SIGNATURE) {
        return DetectedFormat::Zip;
    }

    let text = prefix.strip_prefix(UTF8_BOM).unwrap_or(prefix).trim_ascii_start();
    match text.first() {
        None => DetectedFormat::Unknown,
        Some(b'[') => DetectedFormat::JsonArray,
        Some(b'{') => classify_objects(text, complete),
        Some(_) => match detect_delimiter(text, complete) {
            Some(_) => DetectedFormat::Csv,
            None => DetectedFormat::Unknown,
        },
    }
}

/// Pick the CSV delimiter for `sample`: the candidate giving the most columns (at least two) on
/// the first line, confirmed by the same count on the second line.
pub fn detect_delimiter(sample: &[u8], complete: bool) -> Option<u8> {
    let sample = if complete { sample } else { whole_lines(sample) };

    let mut best: Option<(u8, usize)> = None;
    for delimiter in CANDIDATE_DELIMITERS {
        let Some(columns) = first_row_columns(sample, delimiter) else {
            continue;
        };
        if columns >= 2 && best.is_none_or(|(_, n)| columns > n) {
            best = Some((delimiter, columns));
        }
    }

    let (delimiter, columns) = best?;
    (second_row_columns(sample, delimiter) == Some(columns)).then_some(delimiter)
}

fn classify_objects(text: &[u8], complete: bool) -> DetectedFormat {
    let lines = if complete { text } else { whole_lines(text) };
    let object_lines = lines
        .split(|b| *b == b'\n')
        .map(<[u8]>::trim_ascii)
        .filter(|line| line.first() == Some(&b'{'))
        .filter(|line| serde_json::from_slice::<IgnoredAny>(line).is_ok())
        .take(2)
        .count();
    if object_lines >= 2 {
        return DetectedFormat::Ndjson;
    }

    let mut stream = serde_json::Deserializer::from_slice(text).into_iter::<IgnoredAny>();
    match stream.next() {
        Some(Ok(_)) => {
            let rest = &text[stream.byte_offset()..];
            let next = rest.trim_ascii_start();
            let gap = &rest[..rest.len() - next.len()];
            if next.is_empty() {
                DetectedFormat::JsonArray
            } else if next.first() == Some(&b'{') && gap.contains(&b'\n') {
                DetectedFormat::Ndjson
            } else {
                DetectedFormat::Unknown
            }
        }
        // The object runs past the prefix bound.
        Some(Err(e)) if e.is_eof() && !complete => DetectedFormat::JsonArray,
        _ => DetectedFormat::Unknown,
    }
}

fn whole_lines(text: &[u8]) -> &[u8] {
    match text.iter().rposition(|b| *b == b'\n') {
        Some(end) => &text[..=end],
        None => &[],
    }
}

fn sample_reader(sample: &[u8], delimiter: u8) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(sample)
}

fn first_row_columns(sample: &[u8], delimiter: u8) -> Option<usize> {
    sample_reader(sample, delimiter)
        .byte_records()
        .next()
        .and_then(Result::ok)
        .map(|r| r.len())
}

fn second_row_columns(sample: &[u8], delimiter: u8) -> Option<usize> {
    sample_reader(sample, delimiter)
        .byte_records()
        .nth(1)
        .and_then(Result::ok)
        .map(|r| r.len())
}
