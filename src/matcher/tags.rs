//! Embedded tag reading for metadata matching.

use std::path::Path;

use lofty::prelude::*;
use tracing::trace;

/// Title and artist read from an audio file's embedded tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioTags {
    /// Embedded title, if any.
    pub title: Option<String>,
    /// Embedded artist, if any.
    pub artist: Option<String>,
}

/// Reads embedded tags from a file.
///
/// Returns `None` when the file has no readable tags; read errors are not
/// failures for matching purposes.
pub trait TagReader: Send + Sync {
    /// Reads the tags of the file at `path`.
    fn read_tags(&self, path: &Path) -> Option<AudioTags>;
}

/// [`TagReader`] backed by the `lofty` crate (ID3, MP4, Vorbis, FLAC, ...).
#[derive(Debug, Clone, Copy, Default)]
pub struct LoftyTagReader;

impl TagReader for LoftyTagReader {
    fn read_tags(&self, path: &Path) -> Option<AudioTags> {
        let tagged = match lofty::read_from_path(path) {
            Ok(tagged) => tagged,
            Err(error) => {
                trace!(path = %path.display(), error = %error, "no readable tags");
                return None;
            }
        };
        let tag = tagged.primary_tag().or_else(|| tagged.first_tag())?;
        Some(AudioTags {
            title: tag.title().map(|value| value.into_owned()),
            artist: tag.artist().map(|value| value.into_owned()),
        })
    }
}
