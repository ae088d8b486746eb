//! Destination filename rules for media URLs.
//!
//! The destination name is the last path segment of the URL with any query
//! string stripped (media hosts tack cache-buster parameters onto otherwise
//! stable names). Files without an extension, or with an extension on the
//! configured deny-list, are never dispatched.

use url::Url;

/// Extracts the destination filename from a media URL.
///
/// Returns the last path segment with the query string stripped, or `None`
/// when the URL is unparseable or has no usable segment.
#[must_use]
pub fn filename_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).next_back()?;
    if segment.is_empty() {
        return None;
    }
    Some(segment.to_string())
}

/// Returns the lowercase extension of a filename, including the leading dot.
///
/// A trailing dot or a dotless name yields `None`.
#[must_use]
pub fn extension_from_name(name: &str) -> Option<String> {
    let dot_index = name.rfind('.')?;
    let ext = &name[dot_index..];
    if ext.len() <= 1 {
        return None;
    }
    Some(ext.to_lowercase())
}

/// Checks a filename's extension against the configured deny-list.
///
/// Entries are matched case-insensitively and must include the leading dot
/// (e.g. `".webm"`).
#[must_use]
pub fn is_excluded_extension(name: &str, exclude: &[String]) -> bool {
    match extension_from_name(name) {
        Some(ext) => exclude.iter().any(|e| e.eq_ignore_ascii_case(&ext)),
        None => false,
    }
}
