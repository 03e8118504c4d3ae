//! ZIP archive decoding.
//!
//! Each file entry is sniffed and decoded on its own and routed to the namespace named by its
//! path (`<database>/<collection>.<extension>`). Entries are read one at a time, in archive
//! order. Directory entries and `__MACOSX/` resource forks are skipped.

use std::fmt;
use std::io::Read;

use zip::ZipArchive;

use crate::error::DecodeError;

use super::decode::{DecodeOptions, Decoded, EntryChain, RecordStream, open_entry};
use super::source::SourceReader;

/// Upper bound on the buffer reserved up front for one entry.
const MAX_ENTRY_PREALLOC: u64 = 16 * 1024 * 1024;

/// Decoder over the entries of a ZIP archive.
pub struct ArchiveDecoder {
    archive: ZipArchive<Box<dyn SourceReader>>,
    next_index: usize,
    chain: EntryChain,
    options: DecodeOptions,
    depth: usize,
}

impl ArchiveDecoder {
    /// Read the archive's entry list. A malformed central directory is fatal.
    pub fn open(
        reader: Box<dyn SourceReader>,
        options: DecodeOptions,
        depth: usize,
    ) -> Result<Self, DecodeError> {
        let archive = ZipArchive::new(reader)?;
        tracing::debug!(entries = archive.len(), depth, "opened archive");
        Ok(Self {
            archive,
            next_index: 0,
            chain: EntryChain::default(),
            options,
            depth,
        })
    }

    /// Number of entries, including directories.
    pub fn entry_count(&self) -> usize {
        self.archive.len()
    }
}

fn open_next(
    archive: &mut ZipArchive<Box<dyn SourceReader>>,
    next_index: &mut usize,
    options: &DecodeOptions,
    depth: usize,
) -> Option<Result<Option<Box<dyn RecordStream>>, DecodeError>> {
    if *next_index >= archive.len() {
        return None;
    }
    let index = *next_index;
    *next_index += 1;

    let mut file = match archive.by_index(index) {
        Ok(file) => file,
        Err(e) => {
            return Some(Err(DecodeError::Entry {
                path: format!("#{index}"),
                message: e.to_string(),
            }));
        }
    };
    let path = file.name().to_string();
    if file.is_dir() || path.starts_with("__MACOSX/") || !options.includes(&path) {
        return Some(Ok(None));
    }

    let mut bytes = Vec::with_capacity(file.size().min(MAX_ENTRY_PREALLOC) as usize);
    if let Err(e) = file.read_to_end(&mut bytes) {
        return Some(Err(DecodeError::Entry {
            path,
            message: e.to_string(),
        }));
    }
    drop(file);

    tracing::debug!(entry = %path, bytes = bytes.len(), "decoding archive entry");
    Some(open_entry(&path, bytes, options, depth + 1).map(Some))
}

impl Iterator for ArchiveDecoder {
    type Item = Result<Decoded, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        let Self {
            archive,
            next_index,
            chain,
            options,
            depth,
        } = self;
        chain.next_with(|| open_next(archive, next_index, options, *depth))
    }
}

impl RecordStream for ArchiveDecoder {}

impl fmt::Debug for ArchiveDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveDecoder")
            .field("entries", &self.archive.len())
            .field("next_index", &self.next_index)
            .field("depth", &self.depth)
            .finish()
    }
}
