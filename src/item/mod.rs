//! Batch items and the request descriptors they are built from.
//!
//! An [`Item`] is the validated unit of work: one track to fetch. Items are
//! produced from loosely shaped [`ItemDescriptor`]s (the wire format accepted by
//! the request surface), which tolerate numeric ids, alternative URL fields and
//! missing display metadata.

mod safe_name;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::BatchError;

pub use safe_name::{MAX_SAFE_NAME_CHARS, safe_name, sanitize_component};

/// Artist used when a descriptor carries no artist information.
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

/// Owner name used in storage keys when no artist is known.
pub const DEFAULT_OWNER: &str = "trackbatch";

/// Maximum length of the owner slug used in storage keys.
const MAX_OWNER_CHARS: usize = 30;

/// Base URL used when a descriptor has an id but no URL.
const FALLBACK_TRACK_URL: &str = "https://api.soundcloud.com/tracks";

/// A single requested track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Identifier, unique within a batch.
    pub id: String,
    /// Source URL handed to the media fetcher.
    pub url: String,
    /// Display title.
    pub title: String,
    /// Display artist.
    pub artist: String,
}

impl Item {
    /// Creates an item from its four fields.
    pub fn new(
        id: impl Into<String>,
        url: impl Into<String>,
        title: impl Into<String>,
        artist: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            title: title.into(),
            artist: artist.into(),
        }
    }

    /// Returns the archive-safe display name for this item.
    #[must_use]
    pub fn safe_name(&self) -> String {
        safe_name(&self.artist, &self.title, &self.id)
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {} ({})", self.artist, self.title, self.id)
    }
}

/// Identifier as sent by clients: upstream APIs hand out numeric ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DescriptorId {
    /// String identifier.
    Text(String),
    /// Numeric identifier.
    Number(serde_json::Number),
}

impl fmt::Display for DescriptorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Number(number) => write!(f, "{number}"),
        }
    }
}

/// Nested uploader object carried by upstream track payloads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DescriptorUser {
    /// Uploader display name.
    #[serde(default)]
    pub username: Option<String>,
}

/// A track as described by the caller, before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemDescriptor {
    /// Track identifier (required).
    #[serde(default)]
    pub id: Option<DescriptorId>,
    /// Source URL.
    #[serde(default)]
    pub url: Option<String>,
    /// Alternative source URL field used by upstream payloads.
    #[serde(default)]
    pub permalink_url: Option<String>,
    /// Display title.
    #[serde(default)]
    pub title: Option<String>,
    /// Display artist.
    #[serde(default)]
    pub artist: Option<String>,
    /// Uploader, used for the artist when `artist` is absent.
    #[serde(default)]
    pub user: Option<DescriptorUser>,
}

impl ItemDescriptor {
    /// Returns the artist this descriptor names, if any.
    #[must_use]
    pub fn artist_name(&self) -> Option<&str> {
        non_empty(self.artist.as_deref()).or_else(|| {
            self.user
                .as_ref()
                .and_then(|user| non_empty(user.username.as_deref()))
        })
    }

    /// Converts the descriptor at `index` into an [`Item`], applying defaults.
    ///
    /// - `url` falls back to `permalink_url`, then to the API track URL for the id
    /// - `title` falls back to `Track <index + 1>`
    /// - `artist` falls back to `user.username`, then to [`UNKNOWN_ARTIST`]
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::Validation`] when the id is missing or blank.
    pub fn into_item(self, index: usize) -> Result<Item, BatchError> {
        let id = self
            .id
            .as_ref()
            .map(|id| id.to_string().trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| BatchError::validation(format!("item {index} missing 'id' field")))?;

        let artist = self.artist_name().unwrap_or(UNKNOWN_ARTIST).to_string();
        let url = non_empty(self.url.as_deref())
            .or_else(|| non_empty(self.permalink_url.as_deref()))
            .map_or_else(|| format!("{FALLBACK_TRACK_URL}/{id}"), str::to_string);
        let title = non_empty(self.title.as_deref())
            .map_or_else(|| format!("Track {}", index + 1), str::to_string);

        Ok(Item {
            id,
            url,
            title,
            artist,
        })
    }
}

/// A batch request body: either `{"tracks": [...]}` or a bare array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchRequest {
    /// Object form with a `tracks` field.
    Wrapped {
        /// Requested tracks in order.
        #[serde(default)]
        tracks: Vec<ItemDescriptor>,
    },
    /// Bare array form.
    Bare(Vec<ItemDescriptor>),
}

impl BatchRequest {
    /// Returns the descriptors in request order.
    #[must_use]
    pub fn descriptors(&self) -> &[ItemDescriptor] {
        match self {
            Self::Wrapped { tracks } => tracks,
            Self::Bare(tracks) => tracks,
        }
    }

    /// Returns the owner slug for storage keys: the first named artist, sanitized.
    #[must_use]
    pub fn owner(&self) -> String {
        self.descriptors()
            .iter()
            .find_map(ItemDescriptor::artist_name)
            .filter(|artist| *artist != UNKNOWN_ARTIST)
            .map_or_else(|| DEFAULT_OWNER.to_string(), owner_slug)
    }

    /// Converts every descriptor into an [`Item`], preserving order.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::Validation`] for the first descriptor without an id.
    pub fn into_items(self) -> Result<Vec<Item>, BatchError> {
        let descriptors = match self {
            Self::Wrapped { tracks } => tracks,
            Self::Bare(tracks) => tracks,
        };
        descriptors
            .into_iter()
            .enumerate()
            .map(|(index, descriptor)| descriptor.into_item(index))
            .collect()
    }
}

/// Reduces a name to `[A-Za-z0-9_-]` (other characters become `_`), at most 30 characters.
#[must_use]
pub fn owner_slug(name: &str) -> String {
    let slug: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_OWNER_CHARS)
        .collect();
    if slug.is_empty() {
        DEFAULT_OWNER.to_string()
    } else {
        slug
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> BatchRequest {
        serde_json::from_str(raw).unwrap()
    }

    // ==================== ItemDescriptor Tests ====================

    #[test]
    fn test_descriptor_full_fields() {
        let request = parse(
            r#"{"tracks":[{"id":"1","url":"https://x.test/a","title":"Song","artist":"Band"}]}"#,
        );
        let items = request.into_items().unwrap();
        assert_eq!(items, vec![Item::new("1", "https://x.test/a", "Song", "Band")]);
    }

    #[test]
    fn test_descriptor_numeric_id() {
        let items = parse(r#"[{"id": 123456, "url": "https://x.test/a"}]"#)
            .into_items()
            .unwrap();
        assert_eq!(items[0].id, "123456");
    }

    #[test]
    fn test_descriptor_permalink_url_fallback() {
        let items = parse(r#"[{"id": "5", "permalink_url": "https://x.test/p"}]"#)
            .into_items()
            .unwrap();
        assert_eq!(items[0].url, "https://x.test/p");
    }

    #[test]
    fn test_descriptor_url_built_from_id() {
        let items = parse(r#"[{"id": 77}]"#).into_items().unwrap();
        assert_eq!(items[0].url, "https://api.soundcloud.com/tracks/77");
    }

    #[test]
    fn test_descriptor_title_defaults_to_position() {
        let items = parse(r#"[{"id": "a"}, {"id": "b"}]"#).into_items().unwrap();
        assert_eq!(items[0].title, "Track 1");
        assert_eq!(items[1].title, "Track 2");
    }

    #[test]
    fn test_descriptor_artist_from_user() {
        let items = parse(r#"[{"id": "1", "user": {"username": "uploader"}}]"#)
            .into_items()
            .unwrap();
        assert_eq!(items[0].artist, "uploader");
    }

    #[test]
    fn test_descriptor_artist_unknown_default() {
        let items = parse(r#"[{"id": "1"}]"#).into_items().unwrap();
        assert_eq!(items[0].artist, UNKNOWN_ARTIST);
    }

    #[test]
    fn test_descriptor_missing_id_is_validation_error() {
        let result = parse(r#"[{"id": "1"}, {"title": "no id"}]"#).into_items();
        let err = result.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert!(err.to_string().contains("item 1"), "Got: {err}");
    }

    #[test]
    fn test_descriptor_blank_id_is_validation_error() {
        let result = parse(r#"[{"id": "   "}]"#).into_items();
        assert!(result.is_err());
    }

    // ==================== BatchRequest Tests ====================

    #[test]
    fn test_batch_request_accepts_bare_and_wrapped() {
        assert_eq!(parse(r#"[{"id": "1"}]"#).descriptors().len(), 1);
        assert_eq!(parse(r#"{"tracks": [{"id": "1"}]}"#).descriptors().len(), 1);
        assert!(parse(r"{}").descriptors().is_empty());
    }

    #[test]
    fn test_batch_request_owner_first_named_artist() {
        let request = parse(r#"[{"id": "1"}, {"id": "2", "artist": "DJ Cool/Mix"}]"#);
        assert_eq!(request.owner(), "DJ_Cool_Mix");
    }

    #[test]
    fn test_batch_request_owner_default() {
        assert_eq!(parse(r#"[{"id": "1"}]"#).owner(), DEFAULT_OWNER);
    }

    #[test]
    fn test_owner_slug_truncates() {
        assert_eq!(owner_slug(&"a".repeat(50)).len(), 30);
    }

    // ==================== Item Tests ====================

    #[test]
    fn test_item_safe_name() {
        let item = Item::new("9", "https://x.test", "Title?", "Artist");
        assert_eq!(item.safe_name(), "Artist - Title");
    }
}
