//! Data models for harvested news documents.
//!
//! This module defines the core data structures used throughout the application:
//! - [`Candidate`]: a raw record as produced by a source adapter
//! - [`Document`]: the enriched record persisted to the bronze layer
//! - [`ExtractMethod`]: the tag recording which extraction strategy produced `text`
//!
//! A [`Document`] is born from a [`Candidate`] and then enriched by the
//! pipeline stages, each of which owns a disjoint set of fields:
//!
//! | Stage | Fields |
//! |-------|--------|
//! | adapter | `url`, `url_hash`, `title`, `description`, `published_at`, `source_*`, `crawl_method` |
//! | fetch | `http_status`, `paywall` |
//! | extract | `text`, `content_hash`, `extract_method` |
//! | normalize | `published_at`, `language` |

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Sentinel stored in `http_status` when fetching or extraction failed.
pub const HTTP_STATUS_ERROR: &str = "error";

/// Stable hex digest of a URL, used as the dedup identity key.
///
/// Depends on the URL bytes only, so the same URL always hashes the same no
/// matter which adapter produced it.
pub fn url_hash(url: &str) -> String {
    format!("{:x}", md5::compute(url.as_bytes()))
}

/// Hex digest of extracted text, `None` when there is no text.
pub fn content_hash(text: &str) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(format!("{:x}", md5::compute(text.as_bytes())))
    }
}

/// The extraction strategy that produced a document's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractMethod {
    Trafilatura,
    JsonLd,
    CssSelectors,
    Readability,
    Fallback,
    None,
}

impl ExtractMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractMethod::Trafilatura => "trafilatura",
            ExtractMethod::JsonLd => "json-ld",
            ExtractMethod::CssSelectors => "css-selectors",
            ExtractMethod::Readability => "readability",
            ExtractMethod::Fallback => "fallback",
            ExtractMethod::None => "none",
        }
    }
}

impl fmt::Display for ExtractMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw candidate record produced by a source adapter.
///
/// Carries only what the upstream listing knows about an article; the
/// pipeline turns it into a [`Document`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Candidate {
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub published_at: Option<String>,
    pub source_id: String,
    pub source_name: String,
    pub crawl_method: String,
    /// Paywall flag asserted by the adapter itself.
    pub paywall: bool,
    /// Language reported by the upstream API, if any.
    pub language: Option<String>,
}

/// A news document as stored in the bronze layer.
///
/// Every field is optional on the way in so that older or hand-edited day
/// files still load; fields this version does not know about are kept in
/// `extra` and written back out unchanged.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub url_hash: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub source_name: Option<String>,
    #[serde(default)]
    pub crawl_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    /// Kept as a string so unfamiliar extractor names survive a round trip.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract_method: Option<String>,
    #[serde(default)]
    pub paywall: Option<bool>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Document {
    /// The dedup identity key: `url_hash` when present, else the raw URL.
    pub fn identity_key(&self) -> &str {
        match self.url_hash.as_deref() {
            Some(h) if !h.is_empty() => h,
            _ => &self.url,
        }
    }

    /// Length of `text` in characters, zero when absent.
    pub fn text_len(&self) -> usize {
        self.text.as_deref().map(|t| t.chars().count()).unwrap_or(0)
    }

    pub fn is_error(&self) -> bool {
        self.http_status.as_deref() == Some(HTTP_STATUS_ERROR)
    }
}

impl From<Candidate> for Document {
    fn from(c: Candidate) -> Self {
        Document {
            url_hash: Some(url_hash(&c.url)),
            url: c.url,
            title: c.title,
            description: c.description,
            published_at: c.published_at,
            source_id: Some(c.source_id),
            source_name: Some(c.source_name),
            crawl_method: Some(c.crawl_method),
            paywall: Some(c.paywall),
            language: c.language,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(url: &str) -> Candidate {
        Candidate {
            url: url.to_string(),
            title: Some("Title".to_string()),
            source_id: "src".to_string(),
            source_name: "Source".to_string(),
            crawl_method: "rss".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_url_hash_is_pure_function_of_url() {
        let a = url_hash("https://example.com/a");
        let b = url_hash("https://example.com/a");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);

        let mut other = candidate("https://example.com/a");
        other.title = Some("Completely different".to_string());
        let d1 = Document::from(candidate("https://example.com/a"));
        let d2 = Document::from(other);
        assert_eq!(d1.url_hash, d2.url_hash);
    }

    #[test]
    fn test_url_hash_distinct_urls() {
        let urls = [
            "https://example.com/a",
            "https://example.com/b",
            "https://example.com/a/",
            "http://example.com/a",
            "https://example.com/a?x=1",
        ];
        let hashes: std::collections::HashSet<_> = urls.iter().map(|u| url_hash(u)).collect();
        assert_eq!(hashes.len(), urls.len());
    }

    #[test]
    fn test_content_hash_null_iff_empty() {
        assert_eq!(content_hash(""), None);
        assert!(content_hash("body").is_some());
    }

    #[test]
    fn test_extract_method_serde_names() {
        let json = serde_json::to_string(&ExtractMethod::CssSelectors).unwrap();
        assert_eq!(json, "\"css-selectors\"");
        assert_eq!(ExtractMethod::JsonLd.as_str(), "json-ld");
        let m: ExtractMethod = serde_json::from_str("\"trafilatura\"").unwrap();
        assert_eq!(m, ExtractMethod::Trafilatura);
    }

    #[test]
    fn test_document_keeps_unknown_fields() {
        let line = r#"{"url":"https://x.test/1","title":"T","extract_method":"boilerpipe","custom":42}"#;
        let doc: Document = serde_json::from_str(line).unwrap();
        assert_eq!(doc.extract_method.as_deref(), Some("boilerpipe"));
        assert_eq!(doc.extra.get("custom"), Some(&Value::from(42)));

        let out = serde_json::to_string(&doc).unwrap();
        assert!(out.contains("\"custom\":42"));
    }

    #[test]
    fn test_identity_key_falls_back_to_url() {
        let mut doc = Document::from(candidate("https://x.test/1"));
        assert_eq!(doc.identity_key(), url_hash("https://x.test/1"));
        doc.url_hash = None;
        assert_eq!(doc.identity_key(), "https://x.test/1");
    }

    #[test]
    fn test_text_len_counts_chars() {
        let doc = Document {
            text: Some("日本語".to_string()),
            ..Default::default()
        };
        assert_eq!(doc.text_len(), 3);
        assert_eq!(Document::default().text_len(), 0);
    }
}
