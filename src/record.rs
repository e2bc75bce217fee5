use serde::{Deserialize, Serialize};

use crate::constants::storage::MEMBERSHIP_KEY_DELIMITER;
use crate::errors::LinkLedgerError;
use crate::types::{Href, MembershipKey, PageUrl, SiteId};

/// One persisted link observation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRecord {
    /// Sanitized site id (empty allowed, never absent).
    pub site_id: SiteId,
    /// Page the link was first seen on (empty when unknown).
    pub page_url: PageUrl,
    /// Link target; always non-blank once persisted.
    pub href: Href,
    /// Display text captured with the link.
    pub text: String,
    /// Free-form publication timestamp as supplied by the host.
    pub published_at: String,
    /// Ingestion time in epoch milliseconds, stamped by the store.
    pub timestamp_millis: i64,
}

impl LinkRecord {
    /// Key used for `(site_id, href)` uniqueness checks.
    pub fn membership_key(&self) -> MembershipKey {
        membership_key(&self.site_id, &self.href)
    }
}

/// Incoming link observation, not yet deduplicated.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkCandidate {
    /// Link target; candidates without a non-blank href are skipped.
    #[serde(default)]
    pub href: Option<String>,
    /// Display text.
    #[serde(default)]
    pub text: Option<String>,
    /// Publication timestamp string, passed through unvalidated.
    #[serde(default)]
    pub published_at: Option<String>,
}

impl LinkCandidate {
    /// Candidate with only an href.
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: Some(href.into()),
            ..Self::default()
        }
    }

    /// Attach display text.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Attach a publication timestamp string.
    pub fn with_published_at(mut self, published_at: impl Into<String>) -> Self {
        self.published_at = Some(published_at.into());
        self
    }

    /// The href when it is present and non-blank.
    pub fn usable_href(&self) -> Option<&str> {
        self.href
            .as_deref()
            .filter(|href| !href.trim().is_empty())
    }
}

/// Decoded request tuple handed over by the dispatch layer.
///
/// Only the fields the persistence layer needs are kept; any other request
/// fields (buttons, strategy hints) are ignored while decoding.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    /// Site the page belongs to.
    #[serde(default)]
    pub site_id: Option<String>,
    /// Url of the page the links were extracted from.
    #[serde(default, rename = "url")]
    pub page_url: Option<String>,
    /// Extracted links.
    #[serde(default)]
    pub links: Vec<LinkCandidate>,
}

impl IngestRequest {
    /// Decode one JSON request line.
    pub fn from_json_line(line: &str) -> Result<Self, LinkLedgerError> {
        serde_json::from_str(line.trim()).map_err(|err| LinkLedgerError::Request(err.to_string()))
    }
}

/// Map an absent value to the empty string; present values pass through unchanged.
pub fn sanitize(value: Option<&str>) -> String {
    value.map(str::to_string).unwrap_or_default()
}

/// Join a site id and href into a membership key.
pub fn membership_key(site_id: &str, href: &str) -> MembershipKey {
    format!("{site_id}{MEMBERSHIP_KEY_DELIMITER}{href}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_keeps_values_verbatim() {
        assert_eq!(sanitize(None), "");
        assert_eq!(sanitize(Some("  padded  ")), "  padded  ");
        assert_eq!(sanitize(Some("")), "");
    }

    #[test]
    fn usable_href_rejects_blank_and_missing() {
        assert_eq!(LinkCandidate::default().usable_href(), None);
        assert_eq!(LinkCandidate::new("   ").usable_href(), None);
        assert_eq!(LinkCandidate::new("https://a").usable_href(), Some("https://a"));
    }

    #[test]
    fn request_decodes_host_payload_and_ignores_extra_fields() {
        let line = r#"{
            "siteId": "bloomberg",
            "url": "https://www.bloomberg.com/markets",
            "buttons": [{"title": "Load more"}],
            "links": [
                {"href": "https://a", "text": "A", "publishedAt": "2025-02-25"},
                {"href": "https://b"},
                {"text": "no href"}
            ]
        }"#;
        let request = IngestRequest::from_json_line(line).unwrap();
        assert_eq!(request.site_id.as_deref(), Some("bloomberg"));
        assert_eq!(
            request.page_url.as_deref(),
            Some("https://www.bloomberg.com/markets")
        );
        assert_eq!(request.links.len(), 3);
        assert_eq!(request.links[0].published_at.as_deref(), Some("2025-02-25"));
        assert_eq!(request.links[1].text, None);
        assert_eq!(request.links[2].usable_href(), None);
    }

    #[test]
    fn request_without_links_decodes_to_empty_batch() {
        let request = IngestRequest::from_json_line(r#"{"siteId": null}"#).unwrap();
        assert!(request.site_id.is_none());
        assert!(request.links.is_empty());
    }

    #[test]
    fn malformed_request_line_is_reported() {
        let err = IngestRequest::from_json_line("{not json").unwrap_err();
        assert!(matches!(err, LinkLedgerError::Request(_)));
    }

    #[test]
    fn membership_key_joins_site_and_href() {
        let record = LinkRecord {
            site_id: "site".to_string(),
            page_url: String::new(),
            href: "https://a".to_string(),
            text: String::new(),
            published_at: String::new(),
            timestamp_millis: 0,
        };
        assert_eq!(record.membership_key(), "site|https://a");
        assert_eq!(membership_key("", "https://a"), "|https://a");
    }
}
