//! CSV decoding.
//!
//! Rules:
//!
//! - The first non-empty row is the header.
//! - The delimiter (comma, tab or semicolon) is detected from the content, never from the
//!   file extension. Comma is assumed when detection is inconclusive (e.g. one column).
//! - Cells get light type inference (see [`infer_value`]); empty cells become
//!   [`Value::Null`].
//! - A row whose column count differs from the header is a recoverable row error.
//!
//! The leading rows are buffered to infer an advisory [`Schema`].

use std::collections::VecDeque;
use std::io::Read;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::error::DecodeError;
use crate::types::{DataType, Field, Schema, Value};

use super::decode::{Decoded, RecordStream};
use super::sniff::{SNIFF_PREFIX_LEN, UTF8_BOM, detect_delimiter};
use super::source::{RawSource, SourceReader};

/// Streaming CSV decoder.
pub struct CsvDecoder<R: Read> {
    records: csv::StringRecordsIntoIter<R>,
    headers: Vec<String>,
    schema: Schema,
    buffered: VecDeque<Result<Decoded, DecodeError>>,
    done: bool,
}

impl CsvDecoder<Box<dyn SourceReader>> {
    /// Detect the delimiter from the source prefix, then decode the source.
    pub fn from_source(mut source: RawSource, sample_rows: usize) -> Result<Self, DecodeError> {
        let prefix = source.peek_prefix(SNIFF_PREFIX_LEN)?;
        let complete = source.size() <= SNIFF_PREFIX_LEN as u64;
        let sample = prefix.strip_prefix(UTF8_BOM).unwrap_or(&prefix);
        let delimiter = detect_delimiter(sample, complete).unwrap_or(b',');
        Self::with_delimiter(source.into_reader(), delimiter, sample_rows)
    }
}

impl<R: Read> CsvDecoder<R> {
    /// Decode `reader` using a known delimiter.
    pub fn with_delimiter(reader: R, delimiter: u8, sample_rows: usize) -> Result<Self, DecodeError> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .delimiter(delimiter)
            .from_reader(reader);

        let headers: Vec<String> = rdr
            .headers()
            .map_err(fatal_csv_error)?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect();
        if headers.iter().all(String::is_empty) {
            return Err(DecodeError::Document {
                message: "csv input has no header row".to_string(),
            });
        }

        let mut decoder = Self {
            records: rdr.into_records(),
            schema: Schema::new(Vec::new()),
            headers,
            buffered: VecDeque::new(),
            done: false,
        };
        decoder.sample(sample_rows);
        Ok(decoder)
    }

    /// Column names from the header row.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    fn sample(&mut self, sample_rows: usize) {
        let mut types: Vec<Option<DataType>> = vec![None; self.headers.len()];
        while self.buffered.len() < sample_rows {
            let Some(item) = self.read_row() else {
                break;
            };
            if let Ok(decoded) = &item {
                for (slot, (_, value)) in types.iter_mut().zip(decoded.record.iter()) {
                    if let Some(t) = DataType::of(value) {
                        *slot = Some(slot.map_or(t, |cur| cur.widen(t)));
                    }
                }
            }
            self.buffered.push_back(item);
        }

        self.schema = Schema::new(
            self.headers
                .iter()
                .zip(types)
                .map(|(name, t)| Field::new(name.clone(), t.unwrap_or(DataType::Utf8)))
                .collect(),
        );
    }

    fn read_row(&mut self) -> Option<Result<Decoded, DecodeError>> {
        if self.done {
            return None;
        }
        let Some(result) = self.records.next() else {
            self.done = true;
            return None;
        };

        let item = match result {
            Ok(row) => {
                let line = row.position().map_or(0, |p| p.line());
                if row.len() == self.headers.len() {
                    Ok(Decoded::new(
                        self.headers
                            .iter()
                            .zip(row.iter())
                            .map(|(name, raw)| (name.clone(), infer_value(raw)))
                            .collect(),
                    ))
                } else {
                    Err(DecodeError::Row {
                        row: line,
                        message: format!(
                            "expected {} columns, found {}",
                            self.headers.len(),
                            row.len()
                        ),
                    })
                }
            }
            Err(e) => match e.kind() {
                csv::ErrorKind::Io(_) => Err(fatal_csv_error(e)),
                _ => Err(DecodeError::Row {
                    row: e.position().map_or(0, |p| p.line()),
                    message: e.to_string(),
                }),
            },
        };
        if matches!(&item, Err(e) if !e.is_recoverable()) {
            self.done = true;
        }
        Some(item)
    }
}

impl<R: Read> Iterator for CsvDecoder<R> {
    type Item = Result<Decoded, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buffered.pop_front().or_else(|| self.read_row())
    }
}

impl<R: Read + Send> RecordStream for CsvDecoder<R> {
    fn schema(&self) -> Option<&Schema> {
        Some(&self.schema)
    }
}

fn fatal_csv_error(e: csv::Error) -> DecodeError {
    match e.into_kind() {
        csv::ErrorKind::Io(io) => DecodeError::Io(io),
        other => DecodeError::Document {
            message: format!("invalid csv: {other:?}"),
        },
    }
}

/// Best-effort typed value for a CSV cell: integer, float, boolean, ISO date, else string.
pub fn infer_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::Int(i);
    }
    // Rust also parses "inf"/"NaN"; only digit-bearing text counts as a number here.
    if trimmed.bytes().any(|b| b.is_ascii_digit()) {
        if let Ok(f) = trimmed.parse::<f64>() {
            return Value::Float(f);
        }
    }
    if trimmed.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if let Some(d) = parse_iso_date(trimmed) {
        return Value::Date(d);
    }
    Value::String(trimmed.to_owned())
}

fn parse_iso_date(s: &str) -> Option<DateTime<Utc>> {
    let parsed = if let Ok(d) = DateTime::parse_from_rfc3339(s) {
        d.with_timezone(&Utc)
    } else if let Ok(d) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        d.and_utc()
    } else if let Ok(d) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        d.and_utc()
    } else if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        d.and_hms_opt(0, 0, 0)?.and_utc()
    } else {
        return None;
    };
    DateTime::from_timestamp_millis(parsed.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(input: &str) -> CsvDecoder<&[u8]> {
        let delimiter = detect_delimiter(input.as_bytes(), true).unwrap_or(b',');
        CsvDecoder::with_delimiter(input.as_bytes(), delimiter, 100).unwrap()
    }

    #[test]
    fn infers_cell_types() {
        assert_eq!(infer_value(" 42 "), Value::Int(42));
        assert_eq!(infer_value("98.5"), Value::Float(98.5));
        assert_eq!(infer_value("TRUE"), Value::Bool(true));
        assert_eq!(infer_value(""), Value::Null);
        assert_eq!(infer_value("NaN"), Value::String("NaN".to_string()));
        assert!(matches!(infer_value("2024-03-01"), Value::Date(_)));
        assert!(matches!(infer_value("2024-03-01T10:00:00Z"), Value::Date(_)));
        assert_eq!(infer_value("Ada"), Value::String("Ada".to_string()));
    }

    #[test]
    fn schema_widens_mixed_numeric_columns() {
        let d = decode("id,score,name\n1,2,Ada\n2,2.5,\n");
        let schema = d.schema().unwrap();
        assert_eq!(schema.fields[0], Field::new("id", DataType::Int64));
        assert_eq!(schema.fields[1], Field::new("score", DataType::Float64));
        assert_eq!(schema.fields[2], Field::new("name", DataType::Utf8));
    }

    #[test]
    fn short_row_is_recoverable_and_decoding_continues() {
        let rows: Vec<_> = decode("a;b\n1;2\n3\n4;5\n").collect();
        assert_eq!(rows.len(), 3);
        assert!(rows[0].is_ok());
        let err = rows[1].as_ref().unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(err.location(), "row 3");
        assert!(rows[2].is_ok());
    }

    #[test]
    fn rows_after_sample_are_still_decoded() {
        let input = "n\n1\n2\n3\n4\n";
        let d = CsvDecoder::with_delimiter(input.as_bytes(), b',', 2).unwrap();
        assert_eq!(d.count(), 4);
    }
}
