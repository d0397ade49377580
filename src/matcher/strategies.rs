//! Individual match strategies, tried in order by the result matcher.

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use regex::Regex;

use super::tags::TagReader;
use crate::item::Item;

/// Number of leading SafeName characters accepted as a filename fragment.
pub const NAME_FRAGMENT_CHARS: usize = 20;

#[allow(clippy::expect_used)]
static NON_ALPHANUMERIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^0-9a-z]").expect("normalization regex is valid") // Static pattern, safe to panic
});

/// Lower-cases `value` and drops everything outside `[0-9a-z]`.
#[must_use]
pub fn normalize(value: &str) -> String {
    NON_ALPHANUMERIC
        .replace_all(&value.to_lowercase(), "")
        .into_owned()
}

/// One way of picking the requested item's file among candidates.
pub trait MatchStrategy: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Returns the first candidate this strategy accepts for `item`.
    fn select(&self, candidates: &[PathBuf], item: &Item) -> Option<PathBuf>;
}

/// Matches on embedded title or artist tags.
#[derive(Clone)]
pub struct MetadataMatch {
    reader: Arc<dyn TagReader>,
}

impl MetadataMatch {
    /// Creates the strategy over a tag reader.
    pub fn new(reader: Arc<dyn TagReader>) -> Self {
        Self { reader }
    }
}

impl std::fmt::Debug for MetadataMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataMatch").finish_non_exhaustive()
    }
}

impl MatchStrategy for MetadataMatch {
    fn name(&self) -> &'static str {
        "metadata"
    }

    fn select(&self, candidates: &[PathBuf], item: &Item) -> Option<PathBuf> {
        let want_title = normalize(&item.title);
        let want_artist = normalize(&item.artist);

        candidates
            .iter()
            .find(|path| {
                let Some(tags) = self.reader.read_tags(path) else {
                    return false;
                };
                let equals = |tag: Option<&String>, want: &str| {
                    !want.is_empty() && tag.is_some_and(|value| normalize(value) == want)
                };
                equals(tags.title.as_ref(), &want_title)
                    || equals(tags.artist.as_ref(), &want_artist)
            })
            .cloned()
    }
}

/// Matches on the file name: SafeName prefix, SafeName fragment, or raw id.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilenamePrefixMatch;

impl MatchStrategy for FilenamePrefixMatch {
    fn name(&self) -> &'static str {
        "filename"
    }

    fn select(&self, candidates: &[PathBuf], item: &Item) -> Option<PathBuf> {
        let safe = item.safe_name().to_lowercase();
        let fragment: String = safe.chars().take(NAME_FRAGMENT_CHARS).collect();
        let id = item.id.to_lowercase();

        candidates
            .iter()
            .find(|path| {
                let name = file_name_lower(path);
                (!safe.is_empty() && name.starts_with(&safe))
                    || (!fragment.is_empty() && name.contains(&fragment))
                    || (!id.is_empty() && name.contains(&id))
            })
            .cloned()
    }
}

/// Accepts the first candidate.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstAudioMatch;

impl MatchStrategy for FirstAudioMatch {
    fn name(&self) -> &'static str {
        "first-audio"
    }

    fn select(&self, candidates: &[PathBuf], _item: &Item) -> Option<PathBuf> {
        candidates.first().cloned()
    }
}

fn file_name_lower(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::matcher::AudioTags;

    struct CannedTags(HashMap<PathBuf, AudioTags>);

    impl TagReader for CannedTags {
        fn read_tags(&self, path: &Path) -> Option<AudioTags> {
            self.0.get(path).cloned()
        }
    }

    fn item() -> Item {
        Item::new("123", "https://x.test/t", "One More Time", "Daft Punk")
    }

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(|n| PathBuf::from(format!("/d/{n}"))).collect()
    }

    // ==================== Normalize Tests ====================

    #[test]
    fn test_normalize_strips_punctuation_and_case() {
        assert_eq!(normalize("One More Time (Radio Edit)!"), "onemoretimeradioedit");
        assert_eq!(normalize("Beyoncé"), "beyonc");
    }

    // ==================== MetadataMatch Tests ====================

    #[test]
    fn test_metadata_match_on_title() {
        let candidates = paths(&["a.mp3", "b.mp3"]);
        let mut tags = HashMap::new();
        tags.insert(
            candidates[1].clone(),
            AudioTags {
                title: Some("one more time".to_string()),
                artist: None,
            },
        );
        let strategy = MetadataMatch::new(Arc::new(CannedTags(tags)));
        assert_eq!(strategy.select(&candidates, &item()), Some(candidates[1].clone()));
    }

    #[test]
    fn test_metadata_match_on_artist() {
        let candidates = paths(&["a.mp3"]);
        let mut tags = HashMap::new();
        tags.insert(
            candidates[0].clone(),
            AudioTags {
                title: Some("Something Else".to_string()),
                artist: Some("DAFT PUNK".to_string()),
            },
        );
        let strategy = MetadataMatch::new(Arc::new(CannedTags(tags)));
        assert_eq!(strategy.select(&candidates, &item()), Some(candidates[0].clone()));
    }

    #[test]
    fn test_metadata_match_ignores_untagged_files() {
        let candidates = paths(&["a.mp3"]);
        let strategy = MetadataMatch::new(Arc::new(CannedTags(HashMap::new())));
        assert_eq!(strategy.select(&candidates, &item()), None);
    }

    // ==================== FilenamePrefixMatch Tests ====================

    #[test]
    fn test_filename_match_on_safe_name_prefix() {
        let candidates = paths(&["zzz.mp3", "daft punk - one more time.mp3"]);
        assert_eq!(
            FilenamePrefixMatch.select(&candidates, &item()),
            Some(candidates[1].clone())
        );
    }

    #[test]
    fn test_filename_match_on_fragment() {
        let candidates = paths(&["01 Daft Punk - One More Ti(edit).m4a"]);
        assert_eq!(
            FilenamePrefixMatch.select(&candidates, &item()),
            Some(candidates[0].clone())
        );
    }

    #[test]
    fn test_filename_match_on_id() {
        let candidates = paths(&["other.mp3", "track-123.opus"]);
        assert_eq!(
            FilenamePrefixMatch.select(&candidates, &item()),
            Some(candidates[1].clone())
        );
    }

    #[test]
    fn test_filename_no_match() {
        let candidates = paths(&["unrelated.mp3"]);
        assert_eq!(FilenamePrefixMatch.select(&candidates, &item()), None);
    }

    // ==================== FirstAudioMatch Tests ====================

    #[test]
    fn test_first_audio_match() {
        let candidates = paths(&["b.mp3", "c.mp3"]);
        assert_eq!(
            FirstAudioMatch.select(&candidates, &item()),
            Some(candidates[0].clone())
        );
        assert_eq!(FirstAudioMatch.select(&[], &item()), None);
    }
}
