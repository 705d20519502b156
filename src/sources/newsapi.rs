//! NewsAPI `/v2/everything`: Reuters coverage for one UTC day.
//!
//! The query first filters on `sources=reuters`. When that query yields no
//! articles at all, the same day is queried again with
//! `domains=reuters.com`. Each query is paged until the reported total, or
//! the page cap, is reached.

use super::Source;
use crate::fetcher::{Fetch, FetchOptions, RetryFetch};
use crate::models::Candidate;
use crate::utils::day_start;
use chrono::{Duration, NaiveDate, SecondsFormat};
use serde::Deserialize;
use std::error::Error;
use std::time::Duration as StdDuration;
use tokio::time::sleep;
use tracing::{info, instrument, warn};
use url::Url;

pub const NEWSAPI_EVERYTHING: &str = "https://newsapi.org/v2/everything";
pub const SOURCE_ID: &str = "newsapi_reuters";
pub const SOURCE_NAME: &str = "Reuters via NewsAPI";
pub const CRAWL_METHOD: &str = "newsapi";
pub const PAGE_SIZE: u32 = 100;
const CLIENT_AGENT: &str = "fintext-harvester/1.0";
const API_TIMEOUT: StdDuration = StdDuration::from_secs(30);

/// Query variants, tried in order until one yields articles.
const QUERIES: &[(&str, &str)] = &[("sources", "reuters"), ("domains", "reuters.com")];

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Everything {
    #[serde(default)]
    total_results: u64,
    #[serde(default)]
    articles: Vec<Article>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Article {
    url: Option<String>,
    title: Option<String>,
    description: Option<String>,
    published_at: Option<String>,
}

/// Pages to request for one query, given the first page.
///
/// A zero total with articles on the first page still counts as one page.
pub fn page_count(total_results: u64, first_page_len: usize, max_pages: u32, page_size: u32) -> u32 {
    let page_size = u64::from(page_size.max(1));
    let total = total_results.min(u64::from(max_pages) * page_size);
    if total > 0 {
        total.div_ceil(page_size).min(u64::from(max_pages)) as u32
    } else if first_page_len > 0 {
        1
    } else {
        0
    }
}

/// One UTC day of Reuters articles.
pub struct NewsApiSource<'a, F> {
    api_key: Option<String>,
    day: NaiveDate,
    fetcher: &'a RetryFetch<F>,
    base_url: String,
    max_pages: u32,
    page_size: u32,
    page_pause: StdDuration,
    query: usize,
    page: u32,
    pages: Option<u32>,
    found: usize,
    exhausted: bool,
}

impl<'a, F: Fetch> NewsApiSource<'a, F> {
    /// # Arguments
    /// * `api_key` - The NewsAPI key. `None` or blank makes the first
    ///   [`Source::next_page`] call fail.
    /// * `day` - The UTC day covered by the `from`/`to` window.
    /// * `max_pages` - Cap on pages requested per query.
    /// * `fetcher` - Retrying fetcher; HTTP 429 is retried with backoff.
    pub fn new(api_key: Option<String>, day: NaiveDate, max_pages: u32, fetcher: &'a RetryFetch<F>) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            day,
            fetcher,
            base_url: NEWSAPI_EVERYTHING.to_string(),
            max_pages,
            page_size: PAGE_SIZE,
            page_pause: StdDuration::from_millis(200),
            query: 0,
            page: 1,
            pages: None,
            found: 0,
            exhausted: false,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_page_pause(mut self, pause: StdDuration) -> Self {
        self.page_pause = pause;
        self
    }

    pub fn page_url(&self, query: usize, page: u32) -> Result<Url, Box<dyn Error>> {
        let (filter, value) = QUERIES.get(query).ok_or("no such NewsAPI query")?;
        let start = day_start(self.day);
        let end = start + Duration::days(1) - Duration::seconds(1);
        let url = Url::parse_with_params(
            &self.base_url,
            &[
                ("from", start.to_rfc3339_opts(SecondsFormat::Secs, false)),
                ("to", end.to_rfc3339_opts(SecondsFormat::Secs, false)),
                ("language", "en".to_string()),
                ("sortBy", "publishedAt".to_string()),
                (*filter, value.to_string()),
                ("page", page.to_string()),
                ("pageSize", self.page_size.to_string()),
            ],
        )?;
        Ok(url)
    }

    fn to_candidate(article: Article) -> Option<Candidate> {
        let url = article.url.filter(|u| !u.is_empty())?;
        Some(Candidate {
            url,
            title: article.title,
            description: article.description,
            published_at: article.published_at,
            source_id: SOURCE_ID.to_string(),
            source_name: SOURCE_NAME.to_string(),
            crawl_method: CRAWL_METHOD.to_string(),
            paywall: false,
            language: None,
        })
    }

    /// Move to the next query variant, or finish when the current one found
    /// articles or none are left.
    fn finish_query(&mut self) {
        if self.found > 0 || self.query + 1 >= QUERIES.len() {
            self.exhausted = true;
            return;
        }
        warn!(query = QUERIES[self.query].0, "No articles; trying fallback query");
        self.query += 1;
        self.page = 1;
        self.pages = None;
    }
}

impl<F: Fetch> Source for NewsApiSource<'_, F> {
    fn source_id(&self) -> &str {
        SOURCE_ID
    }

    fn source_name(&self) -> &str {
        SOURCE_NAME
    }

    #[instrument(level = "info", skip_all, fields(day = %self.day))]
    async fn next_page(&mut self) -> Result<Option<Vec<Candidate>>, Box<dyn Error>> {
        loop {
            if self.exhausted {
                return Ok(None);
            }
            if self.pages.is_some_and(|pages| self.page > pages) {
                self.finish_query();
                continue;
            }
            let Some(key) = self.api_key.clone() else {
                self.exhausted = true;
                return Err("NEWSAPI_KEY is empty".into());
            };

            if self.page > 1 && !self.page_pause.is_zero() {
                sleep(self.page_pause).await;
            }
            let url = self.page_url(self.query, self.page)?;
            let opts = FetchOptions::with_timeout(API_TIMEOUT)
                .header("X-Api-Key", &key)
                .header("User-Agent", CLIENT_AGENT);
            let block: Everything = match self.fetcher.fetch_json(url.as_str(), &opts).await {
                Ok(block) => block,
                Err(e) => {
                    self.exhausted = true;
                    return Err(e.into());
                }
            };

            if self.pages.is_none() {
                let pages = page_count(block.total_results, block.articles.len(), self.max_pages, self.page_size);
                info!(total = block.total_results, pages, "NewsAPI query sized");
                self.pages = Some(pages);
            }
            self.page += 1;

            let candidates: Vec<_> = block
                .articles
                .into_iter()
                .filter_map(Self::to_candidate)
                .collect();
            self.found += candidates.len();
            return Ok(Some(candidates));
        }
    }
}
