//! Archive-safe display names derived from item metadata.
//!
//! A SafeName is `"Artist - Title"` with filesystem-hostile characters removed,
//! whitespace collapsed, and the length bounded so it can be used directly as an
//! archive entry stem.

use std::sync::LazyLock;

use regex::Regex;

/// Maximum length of a SafeName, in characters.
pub const MAX_SAFE_NAME_CHARS: usize = 150;

/// Characters that are invalid on at least one common filesystem.
#[allow(clippy::expect_used)]
static UNSAFE_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[<>:"/\\|?*]"#).expect("unsafe-char regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s+").expect("whitespace regex is valid") // Static pattern, safe to panic
});

/// Strips unsafe characters, collapses whitespace runs to one space, and trims.
///
/// # Examples
///
/// ```
/// use trackbatch_core::item::sanitize_component;
///
/// assert_eq!(sanitize_component("  AC/DC:\tLive  "), "ACDC Live");
/// ```
#[must_use]
pub fn sanitize_component(value: &str) -> String {
    let stripped = UNSAFE_CHARS.replace_all(value, "");
    WHITESPACE_RUN.replace_all(&stripped, " ").trim().to_string()
}

/// Builds the SafeName for an item.
///
/// Uses `"artist - title"` when both survive sanitization, the title alone when
/// only the title does, and `track_<id>` otherwise. The result is truncated to
/// [`MAX_SAFE_NAME_CHARS`] characters.
///
/// # Examples
///
/// ```
/// use trackbatch_core::item::safe_name;
///
/// assert_eq!(safe_name("Daft Punk", "One More Time", "7"), "Daft Punk - One More Time");
/// assert_eq!(safe_name("", "Untitled?", "7"), "Untitled");
/// assert_eq!(safe_name("", "", "7"), "track_7");
/// ```
#[must_use]
pub fn safe_name(artist: &str, title: &str, id: &str) -> String {
    let artist = sanitize_component(artist);
    let title = sanitize_component(title);

    let name = match (artist.is_empty(), title.is_empty()) {
        (false, false) => format!("{artist} - {title}"),
        (_, false) => title,
        _ => format!("track_{}", sanitize_component(id)),
    };

    truncate_chars(&name, MAX_SAFE_NAME_CHARS)
}

/// Truncates to at most `max` characters without splitting a code point.
fn truncate_chars(value: &str, max: usize) -> String {
    match value.char_indices().nth(max) {
        Some((cut, _)) => value[..cut].trim_end().to_string(),
        None => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORBIDDEN: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

    #[test]
    fn test_safe_name_joins_artist_and_title() {
        assert_eq!(safe_name("Artist", "Title", "1"), "Artist - Title");
    }

    #[test]
    fn test_safe_name_strips_forbidden_characters() {
        let name = safe_name(r#"A<r>t:i"s/t"#, r"T\i|t?l*e", "1");
        assert_eq!(name, "Artist - Title");
        assert!(!name.contains(FORBIDDEN));
    }

    #[test]
    fn test_safe_name_collapses_irregular_whitespace() {
        let name = safe_name("  The \t  Band ", "Song\n\nName   ", "1");
        assert_eq!(name, "The Band - Song Name");
        assert!(!name.contains("  "));
    }

    #[test]
    fn test_safe_name_title_only_when_artist_empty() {
        assert_eq!(safe_name("", "Just Title", "1"), "Just Title");
        assert_eq!(safe_name("???", "Just Title", "1"), "Just Title");
    }

    #[test]
    fn test_safe_name_falls_back_to_track_id() {
        assert_eq!(safe_name("", "", "12345"), "track_12345");
        assert_eq!(safe_name("  ", "<>", "12345"), "track_12345");
    }

    #[test]
    fn test_safe_name_artist_without_title_uses_track_id() {
        assert_eq!(safe_name("Artist", "", "9"), "track_9");
    }

    #[test]
    fn test_safe_name_truncates_to_max_chars() {
        let long_title = "x".repeat(400);
        let name = safe_name("Artist", &long_title, "1");
        assert_eq!(name.chars().count(), MAX_SAFE_NAME_CHARS);
        assert!(name.starts_with("Artist - xxx"));
    }

    #[test]
    fn test_safe_name_truncation_respects_multibyte_chars() {
        let title = "日本語".repeat(100);
        let name = safe_name("", &title, "1");
        assert_eq!(name.chars().count(), MAX_SAFE_NAME_CHARS);
    }

    #[test]
    fn test_safe_name_truncation_does_not_leave_trailing_space() {
        // "Art - " + 143 chars puts the space on the last kept character
        let title = format!("{} tail", "y".repeat(143));
        let name = safe_name("Art", &title, "1");
        assert!(!name.ends_with(' '));
        assert_eq!(name.chars().count(), MAX_SAFE_NAME_CHARS - 1);
    }

    #[test]
    fn test_safe_name_mixed_hostile_input_satisfies_all_bounds() {
        let artist = "a:b ".repeat(60);
        let title = "c?d\t\t".repeat(60);
        let name = safe_name(&artist, &title, "1");
        assert!(!name.contains(FORBIDDEN));
        assert!(!name.contains("  "));
        assert!(name.chars().count() <= MAX_SAFE_NAME_CHARS);
    }
}
