//! Dump-directory decoding.
//!
//! A directory laid out like an unpacked export archive (`<root>/<database>/<collection>.<ext>`)
//! is decoded the same way as a ZIP archive: one file at a time, in file-name order, with the
//! same per-entry error semantics. Hidden files are ignored.

use std::fmt;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::DecodeError;

use super::decode::{DecodeOptions, Decoded, EntryChain, RecordStream, open_entry};

/// Decoder over the files of a dump directory.
pub struct DirectoryDecoder {
    files: std::vec::IntoIter<(String, PathBuf)>,
    chain: EntryChain,
    options: DecodeOptions,
}

impl DirectoryDecoder {
    /// List the files under `root`. Files are read lazily during iteration.
    pub fn open(root: impl AsRef<Path>, options: DecodeOptions) -> Result<Self, DecodeError> {
        let root = root.as_ref();
        let mut files = Vec::new();
        for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::from)?;
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            if hidden || !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            let entry_path = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if options.includes(&entry_path) {
                files.push((entry_path, entry.into_path()));
            }
        }
        tracing::debug!(root = %root.display(), files = files.len(), "listed dump directory");

        Ok(Self {
            files: files.into_iter(),
            chain: EntryChain::default(),
            options,
        })
    }
}

impl Iterator for DirectoryDecoder {
    type Item = Result<Decoded, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        let Self {
            files,
            chain,
            options,
        } = self;
        chain.next_with(|| {
            let (entry_path, path) = files.next()?;
            Some(match std::fs::read(&path) {
                Ok(bytes) => open_entry(&entry_path, bytes, options, 1).map(Some),
                Err(e) => Err(DecodeError::Entry {
                    path: entry_path,
                    message: e.to_string(),
                }),
            })
        })
    }
}

impl RecordStream for DirectoryDecoder {}

impl fmt::Debug for DirectoryDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryDecoder")
            .field("remaining_files", &self.files.len())
            .finish()
    }
}
