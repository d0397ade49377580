//! Partitions fetch outcomes and names archive entries.
//!
//! Entry names are the item's SafeName plus the fetched file's extension.
//! Names are compared case-insensitively; when two items would share a name,
//! the later one (in batch order) gets a `_2`, `_3`, ... suffix before the
//! extension.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::BatchError;
use crate::item::Item;
use crate::pool::FetchOutcome;

/// One file to place in the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Name of the entry inside the archive.
    pub name: String,
    /// Fetched file on disk.
    pub source: PathBuf,
}

/// Manifest record for an item that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedItem {
    /// Item id.
    pub id: String,
    /// Item title.
    pub title: String,
    /// Item artist.
    pub artist: String,
    /// Human-readable failure.
    pub error: String,
    /// Stable failure code.
    pub code: String,
}

/// Manifest record for an item that made it into the archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SucceededItem {
    /// Item id.
    pub id: String,
    /// Item title.
    pub title: String,
    /// Item artist.
    pub artist: String,
    /// Name of the item's entry in the archive.
    pub entry_name: String,
}

/// Per-batch summary of what succeeded and what failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Number of items requested.
    pub total: usize,
    /// Number of items in the archive.
    pub successful: usize,
    /// Number of items that failed.
    pub failed_count: usize,
    /// Failed items in batch order.
    pub failed: Vec<FailedItem>,
    /// Archived items in batch order.
    pub succeeded: Vec<SucceededItem>,
}

/// Aggregation result: the manifest and the entries to archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregation {
    /// Batch manifest.
    pub manifest: Manifest,
    /// Archive entries in batch order.
    pub entries: Vec<ArchiveEntry>,
}

/// Hands out unique archive entry names.
#[derive(Debug, Default)]
pub struct EntryNamer {
    taken: HashSet<String>,
}

impl EntryNamer {
    /// Creates an empty namer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a name for `stem` + `source`'s extension, unique so far.
    pub fn assign(&mut self, stem: &str, source: &Path) -> String {
        let extension = source
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();

        let mut candidate = format!("{stem}{extension}");
        let mut counter = 2;
        while self.taken.contains(&candidate.to_lowercase()) {
            candidate = format!("{stem}_{counter}{extension}");
            counter += 1;
        }
        self.taken.insert(candidate.to_lowercase());
        candidate
    }
}

/// Builds the manifest and archive entries for a finished batch.
///
/// # Errors
///
/// Returns [`BatchError::AllDownloadsFailed`] when no outcome succeeded, and
/// [`BatchError::Internal`] if `outcomes` is not index-aligned with `items`.
pub fn aggregate(items: &[Item], outcomes: &[FetchOutcome]) -> Result<Aggregation, BatchError> {
    if items.len() != outcomes.len() {
        return Err(BatchError::internal(format!(
            "{} outcomes for {} items",
            outcomes.len(),
            items.len()
        )));
    }

    let mut namer = EntryNamer::new();
    let mut entries = Vec::new();
    let mut succeeded = Vec::new();
    let mut failed = Vec::new();

    for (item, outcome) in items.iter().zip(outcomes) {
        match outcome {
            FetchOutcome::Success { path } => {
                let name = namer.assign(&item.safe_name(), path);
                debug!(item_id = %item.id, entry = %name, "archive entry assigned");
                succeeded.push(SucceededItem {
                    id: item.id.clone(),
                    title: item.title.clone(),
                    artist: item.artist.clone(),
                    entry_name: name.clone(),
                });
                entries.push(ArchiveEntry {
                    name,
                    source: path.clone(),
                });
            }
            FetchOutcome::Failure { reason } => failed.push(FailedItem {
                id: item.id.clone(),
                title: item.title.clone(),
                artist: item.artist.clone(),
                error: reason.to_string(),
                code: reason.code().to_string(),
            }),
        }
    }

    if entries.is_empty() {
        warn!(total = items.len(), "every item failed");
        return Err(BatchError::AllDownloadsFailed { total: items.len() });
    }

    Ok(Aggregation {
        manifest: Manifest {
            total: items.len(),
            successful: succeeded.len(),
            failed_count: failed.len(),
            failed,
            succeeded,
        },
        entries,
    })
}
