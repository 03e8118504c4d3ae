//! Core data model types for import.
//!
//! Decoders produce [`Record`]s whose fields are typed [`Value`]s. The writer and planner
//! accumulate outcomes into a [`BatchResult`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 12-byte document identifier (`$oid` in extended JSON).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 12]);

impl ObjectId {
    /// Wrap raw identifier bytes.
    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    /// Parse a 24-character hex string.
    pub fn parse_str(s: &str) -> Option<Self> {
        let mut bytes = [0u8; 12];
        hex::decode_to_slice(s, &mut bytes).ok()?;
        Some(Self(bytes))
    }

    /// Raw identifier bytes.
    pub fn bytes(&self) -> [u8; 12] {
        self.0
    }

    /// Lowercase hex rendering.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// A single typed field value.
///
/// Every decoder maps its input onto this closed set, so downstream code can match exhaustively.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing/empty value.
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// UTC timestamp with millisecond precision.
    Date(DateTime<Utc>),
    /// Opaque bytes with their extended-JSON subtype (`0x00` generic, `0x04` UUID, ...).
    Binary { subtype: u8, bytes: Vec<u8> },
    /// Document identifier.
    ObjectId(ObjectId),
    /// Ordered list of values.
    Array(Vec<Value>),
    /// Embedded document.
    Object(Record),
}

impl Value {
    /// Convert from extended JSON (see [`crate::extjson`]).
    pub fn from_extended_json(v: serde_json::Value) -> Result<Self, String> {
        crate::extjson::from_json(v)
    }

    /// Render as relaxed extended JSON so that decoding the output yields an equal value.
    pub fn to_extended_json(&self) -> serde_json::Value {
        crate::extjson::to_json(self)
    }

    /// Name of the variant, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::Binary { .. } => "binary",
            Value::ObjectId(_) => "objectId",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }
}

/// Ordered mapping of field name to [`Value`].
///
/// Field order is preserved as decoded; inserting an existing name replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty record with room for `n` fields.
    pub fn with_capacity(n: usize) -> Self {
        Self {
            fields: Vec::with_capacity(n),
        }
    }

    /// Set a field, replacing any existing value with the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Builder-style [`Record::insert`].
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.insert(name, value);
        self
    }

    /// Look up a field by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate fields in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Identity of this record under `key_field`, if the field is present.
    pub fn key(&self, key_field: &str) -> Option<RecordKey> {
        self.get(key_field).map(RecordKey::from_value)
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (name, value) in iter {
            record.insert(name, value);
        }
        record
    }
}

/// Canonical identity of a primary-key value.
///
/// Two keys are equal when their extended JSON renderings are equal, so `1` and `"1"` differ.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordKey(String);

impl RecordKey {
    /// Key for a primary-key value.
    pub fn from_value(value: &Value) -> Self {
        Self(value.to_extended_json().to_string())
    }

    /// Canonical text of the key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Destination of a record inside a multi-collection source (`<database>.<collection>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Namespace {
    /// Database name.
    pub database: String,
    /// Collection name.
    pub collection: String,
}

impl Namespace {
    /// Create a namespace.
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }

    /// Derive a namespace from an entry path laid out as `<database>/<collection>.<extension>`.
    pub fn from_entry_path(path: &str) -> Result<Self, String> {
        let parts: Vec<&str> = path.split('/').collect();
        let [database, file] = parts.as_slice() else {
            return Err(format!(
                "expected '<database>/<collection>.<extension>', found {} path segment(s)",
                parts.len()
            ));
        };
        if database.is_empty() {
            return Err("empty database name".to_string());
        }
        let Some((collection, extension)) = file.rsplit_once('.') else {
            return Err("missing file extension".to_string());
        };
        if collection.is_empty() || extension.is_empty() {
            return Err("empty collection name or extension".to_string());
        }
        Ok(Self::new(*database, collection))
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// Logical column type inferred for a CSV [`Schema`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    /// 64-bit signed integer.
    Int64,
    /// 64-bit floating point number.
    Float64,
    /// Boolean.
    Bool,
    /// ISO-8601 date or timestamp.
    Date,
    /// UTF-8 string.
    Utf8,
}

impl DataType {
    /// Type of a single inferred cell; `None` for nulls, which carry no type evidence.
    pub fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Int(_) => Some(Self::Int64),
            Value::Float(_) => Some(Self::Float64),
            Value::Bool(_) => Some(Self::Bool),
            Value::Date(_) => Some(Self::Date),
            _ => Some(Self::Utf8),
        }
    }

    /// Smallest type that can hold values of both `self` and `other`.
    pub fn widen(self, other: Self) -> Self {
        match (self, other) {
            (a, b) if a == b => a,
            (Self::Int64, Self::Float64) | (Self::Float64, Self::Int64) => Self::Float64,
            _ => Self::Utf8,
        }
    }
}

/// A single named, typed column in a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Column name.
    pub name: String,
    /// Inferred column type.
    pub data_type: DataType,
}

impl Field {
    /// Create a new field.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Best-effort column layout of a CSV source, derived from its leading rows.
///
/// Advisory only: records keep their per-cell inferred values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// Ordered list of fields.
    pub fields: Vec<Field>,
}

impl Schema {
    /// Create a new schema from fields.
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Iterate field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Returns the index of a field by name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

/// What the writer does when a record's primary key already exists in the target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Keep the existing document; count the record as skipped.
    #[default]
    Skip,
    /// Replace the existing document; count the record as updated.
    Overwrite,
    /// Leave the existing document; count the record as failed.
    Reject,
}

/// A record that was not imported, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDescriptor {
    /// Record key, or the source location for records that never decoded.
    pub key: String,
    /// Human-readable reason.
    pub reason: String,
}

/// Outcome counters for an import or a dry-run preview.
///
/// Counters only grow, and `inserted + updated + skipped + failed` always equals
/// [`BatchResult::records_processed`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    inserted: u64,
    updated: u64,
    skipped: u64,
    failed: u64,
    failures: Vec<FailureDescriptor>,
}

impl BatchResult {
    /// Records newly inserted.
    pub fn inserted(&self) -> u64 {
        self.inserted
    }

    /// Records that replaced an existing document.
    pub fn updated(&self) -> u64 {
        self.updated
    }

    /// Records left out because their key already existed.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Records that were rejected or could not be decoded.
    pub fn failed(&self) -> u64 {
        self.failed
    }

    /// Failure descriptors in the order they occurred.
    pub fn failures(&self) -> &[FailureDescriptor] {
        &self.failures
    }

    /// Total records accounted for so far.
    pub fn records_processed(&self) -> u64 {
        self.inserted + self.updated + self.skipped + self.failed
    }

    pub(crate) fn add_inserted(&mut self, n: u64) {
        self.inserted += n;
    }

    pub(crate) fn add_updated(&mut self, n: u64) {
        self.updated += n;
    }

    pub(crate) fn add_skipped(&mut self, n: u64) {
        self.skipped += n;
    }

    pub(crate) fn add_failure(&mut self, key: impl Into<String>, reason: impl Into<String>) {
        self.failed += 1;
        self.failures.push(FailureDescriptor {
            key: key.into(),
            reason: reason.into(),
        });
    }
}
