use std::time::Duration;

use thiserror::Error;

/// Convenience result type for import operations.
pub type ImportResult<T> = Result<T, ImportError>;

/// Fatal error that ends an import.
///
/// Recoverable problems (a bad NDJSON line, a short CSV row, a duplicate key) never surface as an
/// `ImportError`; they are folded into the [`crate::types::BatchResult`] instead.
#[derive(Debug, Error)]
pub enum ImportError {
    /// Underlying I/O error (e.g. file not found, permission denied).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The source content did not match any supported format.
    #[error("unrecognized format for '{source_name}': expected a ZIP archive, JSON, NDJSON or CSV")]
    Classification { source_name: String },

    /// Decoding failed in a way that invalidates the whole document.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The target store rejected a call (transport, auth, timeout, malformed batch).
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Invalid [`crate::ingestion::ImportOptions`].
    #[error("invalid options: {message}")]
    Config { message: String },
}

impl ImportError {
    /// Severity used for observer alerting.
    pub fn severity(&self) -> crate::ingestion::ImportSeverity {
        use crate::ingestion::ImportSeverity;

        match self {
            ImportError::Io(_) | ImportError::Store(_) => ImportSeverity::Critical,
            ImportError::Decode(DecodeError::Io(_)) => ImportSeverity::Critical,
            ImportError::Classification { .. } | ImportError::Decode(_) | ImportError::Config { .. } => {
                ImportSeverity::Error
            }
        }
    }
}

/// Error produced while turning bytes into records.
///
/// [`DecodeError::is_recoverable`] tells the coordinator whether the stream may continue.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// A single NDJSON line could not be decoded.
    #[error("invalid json at line {line}: {message}")]
    Line { line: u64, message: String },

    /// A single CSV row could not be decoded.
    #[error("invalid csv row {row}: {message}")]
    Row { row: u64, message: String },

    /// An archive or directory entry could not be decoded.
    #[error("skipped entry '{path}': {message}")]
    Entry { path: String, message: String },

    /// The document as a whole is malformed (e.g. a JSON array with a bad element).
    #[error("malformed document: {message}")]
    Document { message: String },

    /// The archive's entry list could not be read.
    #[error("malformed archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// I/O failure while reading the source.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DecodeError {
    /// Whether decoding can continue past this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DecodeError::Line { .. } | DecodeError::Row { .. } | DecodeError::Entry { .. }
        )
    }

    /// Short location label used as the failure descriptor key.
    pub fn location(&self) -> String {
        match self {
            DecodeError::Line { line, .. } => format!("line {line}"),
            DecodeError::Row { row, .. } => format!("row {row}"),
            DecodeError::Entry { path, .. } => format!("entry {path}"),
            DecodeError::Document { .. } | DecodeError::Archive(_) | DecodeError::Io(_) => {
                "document".to_string()
            }
        }
    }
}

/// Error returned by a [`crate::store::TargetCollection`] call.
///
/// Every variant is fatal to the import; duplicate keys are reported per document through
/// [`crate::store::InsertManyOutcome`] instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Network/connection failure.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Authentication or authorization failure.
    #[error("not authorized: {0}")]
    Auth(String),

    /// The call exceeded its per-call timeout.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    /// The store refused the batch or a document for a reason other than a duplicate key.
    #[error("write rejected: {0}")]
    Rejected(String),
}
