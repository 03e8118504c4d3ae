//! JSON decoding.
//!
//! Supported inputs:
//! - A JSON array of objects: `[{"a":1}, {"a":2}]` (or a single object `{"a":1}`)
//! - Newline-delimited JSON (NDJSON): `{"a":1}\n{"a":2}\n`
//!
//! Values go through extended-JSON conversion ([`crate::extjson`]), so `$date`, `$oid`,
//! `$numberLong` and `$binary` wrappers come out as exact [`crate::types::Value`] variants.
//!
//! The two shapes fail differently: an array is one atomic document, so any bad element fails
//! the whole decode before a single record is produced; NDJSON lines are independent, so a bad
//! line is reported and the next line is decoded.

use std::io::{BufRead, Read};

use crate::error::DecodeError;
use crate::extjson::{json_type_name, record_from_json};
use crate::types::Record;

use super::decode::{Decoded, RecordStream};
use super::sniff::UTF8_BOM;

/// Decoder for a JSON array (or lone object) document.
#[derive(Debug)]
pub struct JsonArrayDecoder {
    records: std::vec::IntoIter<Record>,
    total: u64,
}

impl JsonArrayDecoder {
    /// Read and decode the whole document.
    pub fn from_reader(mut reader: impl Read) -> Result<Self, DecodeError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_slice(&bytes)
    }

    /// Decode an in-memory document.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, DecodeError> {
        let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
        let document: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| DecodeError::Document {
                message: format!("invalid json: {e}"),
            })?;

        let items = match document {
            serde_json::Value::Array(items) => items,
            obj @ serde_json::Value::Object(_) => vec![obj],
            other => {
                return Err(DecodeError::Document {
                    message: format!(
                        "json must be an object or an array of objects, found {}",
                        json_type_name(&other)
                    ),
                });
            }
        };

        let records = items
            .into_iter()
            .enumerate()
            .map(|(idx, item)| {
                record_from_json(item).map_err(|message| DecodeError::Document {
                    message: format!("element {idx}: {message}"),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            total: records.len() as u64,
            records: records.into_iter(),
        })
    }
}

impl Iterator for JsonArrayDecoder {
    type Item = Result<Decoded, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.records.next().map(|r| Ok(Decoded::new(r)))
    }
}

impl RecordStream for JsonArrayDecoder {
    fn total_estimate(&self) -> Option<u64> {
        Some(self.total)
    }
}

/// Line-by-line NDJSON decoder.
#[derive(Debug)]
pub struct NdjsonDecoder<R> {
    reader: R,
    line: u64,
    buf: Vec<u8>,
    done: bool,
}

impl<R: BufRead> NdjsonDecoder<R> {
    /// Wrap a buffered reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: 0,
            buf: Vec::new(),
            done: false,
        }
    }
}

impl<R: BufRead> Iterator for NdjsonDecoder<R> {
    type Item = Result<Decoded, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => self.done = true,
                Ok(_) => {
                    self.line += 1;
                    let mut bytes = self.buf.as_slice();
                    if self.line == 1 {
                        bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
                    }
                    let bytes = bytes.trim_ascii();
                    if bytes.is_empty() {
                        continue;
                    }

                    let parsed = serde_json::from_slice::<serde_json::Value>(bytes)
                        .map_err(|e| e.to_string())
                        .and_then(record_from_json);
                    return Some(match parsed {
                        Ok(record) => Ok(Decoded::new(record)),
                        Err(message) => Err(DecodeError::Line {
                            line: self.line,
                            message,
                        }),
                    });
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(DecodeError::Io(e)));
                }
            }
        }
        None
    }
}

impl<R: BufRead + Send> RecordStream for NdjsonDecoder<R> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    #[test]
    fn lone_object_is_one_record() {
        let mut d = JsonArrayDecoder::from_slice(br#"{"name":"test"}"#).unwrap();
        assert_eq!(d.total_estimate(), Some(1));
        let rec = d.next().unwrap().unwrap().record;
        assert_eq!(rec.get("name"), Some(&Value::String("test".to_string())));
        assert!(d.next().is_none());
    }

    #[test]
    fn array_with_non_object_element_is_fatal() {
        let err = JsonArrayDecoder::from_slice(br#"[{"a":1}, 2]"#).unwrap_err();
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("element 1"));
    }

    #[test]
    fn ndjson_tolerates_crlf_and_bom() {
        let input = b"\xEF\xBB\xBF{\"a\":1}\r\n\r\n{\"a\":2}\r\n";
        let rows: Vec<_> = NdjsonDecoder::new(&input[..]).collect();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(Result::is_ok));
    }
}
