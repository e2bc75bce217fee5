//! Storage key derivation for site/page pairs.

use percent_encoding::percent_decode_str;
use url::{ParseError, Url};

use crate::constants::storage::{
    DEFAULT_SITE_TOKEN, KEY_SEPARATOR, RELATIVE_URL_BASE, UNSAFE_CHAR_REPLACEMENT,
    URI_FORBIDDEN_CHARS,
};
use crate::types::StorageKey;

/// Derive the storage key for `site_id` and `page_url`.
///
/// The key is the sanitized site token, optionally followed by `_` and the
/// first non-blank segment of the percent-decoded path of `page_url`. Pages
/// sharing a leading path segment map onto the same key. Malformed urls,
/// including raw whitespace, `|`, braces, or broken `%` escapes, degrade to
/// the site token.
///
/// ```
/// use link_ledger::key::derive_key;
///
/// assert_eq!(
///     derive_key(Some("bloomberg"), Some("https://example.com/news/item-1")),
///     "bloomberg_news"
/// );
/// assert_eq!(derive_key(None, None), "default");
/// ```
pub fn derive_key(site_id: Option<&str>, page_url: Option<&str>) -> StorageKey {
    let site = match site_id {
        Some(value) if !value.trim().is_empty() => sanitize_file_token(value),
        _ => DEFAULT_SITE_TOKEN.to_string(),
    };
    let Some(page_url) = page_url.filter(|value| !value.trim().is_empty()) else {
        return site;
    };
    match first_path_segment(page_url) {
        Some(segment) => format!("{site}{KEY_SEPARATOR}{segment}"),
        None => site,
    }
}

/// Replace every character outside `[A-Za-z0-9._-]` with `_`.
///
/// A blank result falls back to the default site token.
pub fn sanitize_file_token(value: &str) -> String {
    let sanitized: String = value
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
                ch
            } else {
                UNSAFE_CHAR_REPLACEMENT
            }
        })
        .collect();
    if sanitized.trim().is_empty() {
        DEFAULT_SITE_TOKEN.to_string()
    } else {
        sanitized
    }
}

fn first_path_segment(page_url: &str) -> Option<String> {
    if !is_strict_uri(page_url) {
        return None;
    }
    let url = parse_page_url(page_url)?;
    if url.cannot_be_a_base() {
        return None;
    }
    let path = percent_decode_str(url.path()).decode_utf8_lossy();
    path.split('/')
        .find(|segment| !segment.trim().is_empty())
        .map(sanitize_file_token)
}

/// Rejects input the WHATWG parser would quietly repair: whitespace, control
/// characters, RFC 3986 excluded characters, and `%` not followed by two hex digits.
fn is_strict_uri(page_url: &str) -> bool {
    if page_url
        .chars()
        .any(|ch| ch.is_whitespace() || ch.is_control() || URI_FORBIDDEN_CHARS.contains(&ch))
    {
        return false;
    }
    let bytes = page_url.as_bytes();
    bytes.iter().enumerate().all(|(idx, byte)| {
        *byte != b'%'
            || (bytes.get(idx + 1).is_some_and(u8::is_ascii_hexdigit)
                && bytes.get(idx + 2).is_some_and(u8::is_ascii_hexdigit))
    })
}

fn parse_page_url(page_url: &str) -> Option<Url> {
    match Url::parse(page_url) {
        Ok(url) => Some(url),
        Err(ParseError::RelativeUrlWithoutBase) => {
            let base = Url::parse(RELATIVE_URL_BASE).ok()?;
            base.join(page_url).ok()
        }
        Err(_) => None,
    }
}
