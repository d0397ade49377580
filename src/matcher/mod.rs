//! Reconciles a fetch tool's directory output with the requested item.
//!
//! External downloaders name their output files however they like. The
//! [`ResultMatcher`] lists the audio files an item's private directory ended
//! up with and runs an ordered list of [`MatchStrategy`]s over them:
//!
//! 1. [`MetadataMatch`] - embedded title/artist tags
//! 2. [`FilenamePrefixMatch`] - SafeName prefix or fragment, or the raw id
//! 3. [`FirstAudioMatch`] - any audio file at all
//!
//! Because each item fetches into its own directory, the last resort is
//! safe: whatever audio is there belongs to the item.

mod strategies;
mod tags;

pub use strategies::{
    FilenamePrefixMatch, FirstAudioMatch, MatchStrategy, MetadataMatch, NAME_FRAGMENT_CHARS,
    normalize,
};
pub use tags::{AudioTags, LoftyTagReader, TagReader};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::item::Item;
use crate::pool::ItemFailure;

/// File extensions (lower-case, without dot) treated as audio output.
pub const AUDIO_EXTENSIONS: [&str; 7] = ["mp3", "m4a", "wav", "webm", "opus", "flac", "ogg"];

/// Returns true if `path` has an audio extension (case-insensitive).
#[must_use]
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            AUDIO_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

/// Lists regular audio files directly inside `dir`, sorted by file name.
///
/// # Errors
///
/// Returns [`ItemFailure::Io`] if the directory cannot be read.
pub fn audio_candidates(dir: &Path) -> Result<Vec<PathBuf>, ItemFailure> {
    let entries = std::fs::read_dir(dir).map_err(|e| ItemFailure::io(&e))?;
    let mut candidates = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ItemFailure::io(&e))?;
        let path = entry.path();
        if path.is_file() && is_audio_file(&path) {
            candidates.push(path);
        }
    }
    candidates.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(candidates)
}

/// Ordered strategy runner.
pub struct ResultMatcher {
    strategies: Vec<Box<dyn MatchStrategy>>,
}

impl ResultMatcher {
    /// Creates the standard three-stage matcher over a tag reader.
    pub fn new(reader: Arc<dyn TagReader>) -> Self {
        Self::with_strategies(vec![
            Box::new(MetadataMatch::new(reader)),
            Box::new(FilenamePrefixMatch),
            Box::new(FirstAudioMatch),
        ])
    }

    /// Creates a matcher running exactly the given strategies, in order.
    #[must_use]
    pub fn with_strategies(strategies: Vec<Box<dyn MatchStrategy>>) -> Self {
        Self { strategies }
    }

    /// Returns the strategy names in evaluation order.
    #[must_use]
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Finds the file in `dir` that holds `item`.
    ///
    /// # Errors
    ///
    /// Returns [`ItemFailure::MediaNotFound`] when no strategy accepts a
    /// candidate (including when the directory has no audio files), and
    /// [`ItemFailure::Io`] if the directory cannot be listed.
    pub fn locate(&self, dir: &Path, item: &Item) -> Result<PathBuf, ItemFailure> {
        let candidates = audio_candidates(dir)?;
        if candidates.is_empty() {
            debug!(item_id = %item.id, dir = %dir.display(), "no audio candidates");
            return Err(ItemFailure::MediaNotFound);
        }

        for strategy in &self.strategies {
            if let Some(path) = strategy.select(&candidates, item) {
                debug!(
                    item_id = %item.id,
                    strategy = strategy.name(),
                    path = %path.display(),
                    "matched output file"
                );
                return Ok(path);
            }
        }
        Err(ItemFailure::MediaNotFound)
    }
}

impl Default for ResultMatcher {
    fn default() -> Self {
        Self::new(Arc::new(LoftyTagReader))
    }
}

impl std::fmt::Debug for ResultMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultMatcher")
            .field("strategies", &self.strategy_names())
            .finish()
    }
}
