//! Byte sources handed to the sniffer and decoders.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;

/// Readable, rewindable byte stream.
pub trait SourceReader: Read + Seek + Send {}

impl<T: Read + Seek + Send> SourceReader for T {}

/// Caller-owned input for an import.
///
/// The import only reads from it: the sniffer inspects a prefix and rewinds, then exactly one
/// decoder consumes it front to back.
pub struct RawSource {
    name: String,
    size: u64,
    extension: Option<String>,
    reader: Box<dyn SourceReader>,
}

impl RawSource {
    /// Open a file.
    pub fn from_path(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            name: path.display().to_string(),
            size,
            extension: path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase()),
            reader: Box::new(BufReader::new(file)),
        })
    }

    /// Wrap in-memory bytes. The extension hint is taken from `name`, if it has one.
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        let extension = Path::new(&name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        Self {
            size: bytes.len() as u64,
            extension,
            name,
            reader: Box::new(Cursor::new(bytes)),
        }
    }

    /// Display name used in logs and errors.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Lowercased file extension, if known. Only a hint; content decides the format.
    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }

    /// Read up to `limit` bytes from the start, leaving the source rewound.
    pub fn peek_prefix(&mut self, limit: usize) -> io::Result<Vec<u8>> {
        self.reader.seek(SeekFrom::Start(0))?;
        let mut prefix = Vec::with_capacity(limit.min(self.size as usize));
        (&mut self.reader).take(limit as u64).read_to_end(&mut prefix)?;
        self.reader.seek(SeekFrom::Start(0))?;
        Ok(prefix)
    }

    pub(crate) fn reader_mut(&mut self) -> &mut Box<dyn SourceReader> {
        &mut self.reader
    }

    pub(crate) fn rewind(&mut self) -> io::Result<()> {
        self.reader.seek(SeekFrom::Start(0)).map(|_| ())
    }

    /// Give up the source to a decoder.
    pub fn into_reader(self) -> Box<dyn SourceReader> {
        self.reader
    }
}

impl fmt::Debug for RawSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawSource")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("extension", &self.extension)
            .finish()
    }
}
