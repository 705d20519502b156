//! RSS 2.0 and Atom feeds.
//!
//! A feed is a single page: the whole document is downloaded through the
//! retrying fetcher, parsed with `feed-rs`, and every `<item>` / `<entry>`
//! with a link becomes a candidate.

use super::Source;
use crate::config::FeedConfig;
use crate::fetcher::{Fetch, FetchOptions};
use crate::models::Candidate;
use crate::normalizer::format_timestamp;
use crate::utils::collapse_whitespace;
use feed_rs::model::Entry;
use feed_rs::parser::{self, ParseFeedError};
use std::error::Error;
use tracing::{debug, info, instrument};

pub const CRAWL_METHOD: &str = "rss";

/// Parse an RSS 2.0, Atom or JSON Feed document.
///
/// # Arguments
/// * `body` - Raw feed bytes as downloaded; the parser honours the XML
///   encoding declaration.
///
/// # Returns
/// * The entries in document order.
///
/// # Errors
/// * `ParseFeedError` when the bytes are not a recognisable feed.
pub fn parse_feed(body: &[u8]) -> Result<Vec<Entry>, ParseFeedError> {
    Ok(parser::parse(body)?.entries)
}

/// The link pointing at the article itself: the first one without a `rel`
/// or with `rel="alternate"`, else a permalink-style entry id.
fn entry_url(entry: &Entry) -> Option<String> {
    entry
        .links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .map(|l| l.href.trim().to_string())
        .filter(|href| !href.is_empty())
        .or_else(|| entry.id.starts_with("http").then(|| entry.id.clone()))
}

fn non_empty(raw: &str) -> Option<String> {
    let cleaned = collapse_whitespace(raw);
    (!cleaned.is_empty()).then_some(cleaned)
}

/// A configured feed, enumerated once.
pub struct RssSource<'a, F> {
    feed: FeedConfig,
    fetcher: &'a F,
    options: FetchOptions,
    exhausted: bool,
}

impl<'a, F: Fetch> RssSource<'a, F> {
    pub fn new(feed: FeedConfig, fetcher: &'a F) -> Self {
        Self {
            feed,
            fetcher,
            options: FetchOptions::default(),
            exhausted: false,
        }
    }

    pub fn with_options(mut self, options: FetchOptions) -> Self {
        self.options = options;
        self
    }

    fn to_candidate(&self, entry: Entry) -> Option<Candidate> {
        let url = entry_url(&entry)?;
        let summary = entry.summary.and_then(|t| non_empty(&t.content));
        let content = entry
            .content
            .and_then(|c| c.body)
            .and_then(|b| non_empty(&b));
        Some(Candidate {
            url,
            title: entry.title.and_then(|t| non_empty(&t.content)),
            description: summary.or(content),
            published_at: entry.published.or(entry.updated).map(format_timestamp),
            source_id: self.feed.id.clone(),
            source_name: self.feed.name.clone(),
            crawl_method: CRAWL_METHOD.to_string(),
            paywall: false,
            language: None,
        })
    }
}

impl<F: Fetch> Source for RssSource<'_, F> {
    fn source_id(&self) -> &str {
        &self.feed.id
    }

    fn source_name(&self) -> &str {
        &self.feed.name
    }

    #[instrument(level = "info", skip_all, fields(feed = %self.feed.id))]
    async fn next_page(&mut self) -> Result<Option<Vec<Candidate>>, Box<dyn Error>> {
        if self.exhausted {
            return Ok(None);
        }
        self.exhausted = true;

        let fetched = self.fetcher.fetch(&self.feed.url, &self.options).await?;
        let entries = parse_feed(&fetched.body)?;
        let total = entries.len();
        let candidates: Vec<_> = entries
            .into_iter()
            .filter_map(|e| self.to_candidate(e))
            .collect();
        if candidates.len() < total {
            debug!(skipped = total - candidates.len(), "Entries without a link");
        }
        info!(count = candidates.len(), "Parsed feed");
        Ok(Some(candidates))
    }
}
