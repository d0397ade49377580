//! Deterministic ZIP packaging of fetched files.
//!
//! Entries are written in the order given, deflate-compressed, with a fixed
//! timestamp (1980-01-01 00:00:00) and fixed permissions, so identical inputs
//! yield identical archive bytes.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, instrument};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::aggregate::ArchiveEntry;

/// Permissions recorded for every entry.
const ENTRY_PERMISSIONS: u32 = 0o644;

/// Errors that can occur while packaging an archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// No entries were supplied.
    #[error("archive would be empty")]
    Empty,

    /// Two entries share a name (compared case-insensitively).
    #[error("duplicate archive entry: {name}")]
    DuplicateEntry {
        /// The repeated name.
        name: String,
    },

    /// Reading a source file or writing the archive failed.
    #[error("archive IO error at {path}: {source}")]
    Io {
        /// The path involved.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The ZIP encoder failed.
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// The blocking packaging task did not complete.
    #[error("archive task failed: {message}")]
    Task {
        /// Join error description.
        message: String,
    },
}

impl ArchiveError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Facts about a written archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// Location of the archive file.
    pub path: PathBuf,
    /// Number of entries written.
    pub entries: usize,
    /// Archive size in bytes.
    pub bytes: u64,
}

fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(ENTRY_PERMISSIONS)
}

/// Writes `entries` into a new ZIP file at `dest`. Blocking.
///
/// # Errors
///
/// Returns [`ArchiveError::Empty`] for no entries,
/// [`ArchiveError::DuplicateEntry`] when two names collide, and IO/ZIP errors
/// otherwise. A partially written file may remain at `dest` on error.
#[instrument(skip(entries), fields(entries = entries.len(), dest = %dest.display()))]
pub fn build_archive(entries: &[ArchiveEntry], dest: &Path) -> Result<ArchiveSummary, ArchiveError> {
    if entries.is_empty() {
        return Err(ArchiveError::Empty);
    }
    let mut seen = HashSet::with_capacity(entries.len());
    for entry in entries {
        if !seen.insert(entry.name.to_lowercase()) {
            return Err(ArchiveError::DuplicateEntry {
                name: entry.name.clone(),
            });
        }
    }

    let file = File::create(dest).map_err(|e| ArchiveError::io(dest, e))?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = entry_options();

    for entry in entries {
        let mut source =
            File::open(&entry.source).map_err(|e| ArchiveError::io(&entry.source, e))?;
        zip.start_file(entry.name.as_str(), options)?;
        let copied =
            std::io::copy(&mut source, &mut zip).map_err(|e| ArchiveError::io(&entry.source, e))?;
        debug!(entry = %entry.name, bytes = copied, "entry written");
    }

    let mut writer = zip.finish()?;
    writer.flush().map_err(|e| ArchiveError::io(dest, e))?;
    drop(writer);

    let bytes = std::fs::metadata(dest)
        .map_err(|e| ArchiveError::io(dest, e))?
        .len();
    info!(entries = entries.len(), bytes, "archive written");
    Ok(ArchiveSummary {
        path: dest.to_path_buf(),
        entries: entries.len(),
        bytes,
    })
}

/// Runs [`build_archive`] on the blocking thread pool.
///
/// # Errors
///
/// Same as [`build_archive`], plus [`ArchiveError::Task`] if the blocking
/// task panics.
pub async fn build_archive_blocking(
    entries: Vec<ArchiveEntry>,
    dest: PathBuf,
) -> Result<ArchiveSummary, ArchiveError> {
    tokio::task::spawn_blocking(move || build_archive(&entries, &dest))
        .await
        .map_err(|e| ArchiveError::Task {
            message: e.to_string(),
        })?
}
