//! GDELT DOC 2.0 article lists, one domain over one UTC day.
//!
//! The day is cut into time slices and each slice is one page, since the API
//! caps a response at 250 records. Slice bounds are inclusive to the second.

use super::Source;
use crate::fetcher::{Fetch, FetchOptions, RetryFetch};
use crate::models::Candidate;
use crate::normalizer::{format_timestamp, language_from_name, parse_timestamp};
use crate::utils::day_start;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Deserialize;
use std::error::Error;
use std::time::Duration as StdDuration;
use tracing::{debug, instrument};
use url::Url;

pub const GDELT_DOC_API: &str = "https://api.gdeltproject.org/api/v2/doc/doc";
pub const MAX_RECORDS: u32 = 250;
pub const CRAWL_METHOD: &str = "gdelt";

const API_TIMEOUT: StdDuration = StdDuration::from_secs(30);
const STAMP: &str = "%Y%m%d%H%M%S";

/// The built-in domain list for backfills.
pub fn default_domains() -> Vec<String> {
    [
        "cnbc.com",
        "finance.yahoo.com",
        "marketwatch.com",
        "nasdaq.com",
        "nyse.com",
        "ecb.europa.eu",
        "federalreserve.gov",
        "bankofengland.co.uk",
        "boj.or.jp",
        "sec.gov",
        "cftc.gov",
        "bis.org",
        "imf.org",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Parse a comma-separated domain list, dropping blanks.
pub fn parse_domains(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(String::from)
        .collect()
}

/// Each list may be absent or `null`; both read as empty.
#[derive(Debug, Default, Deserialize)]
struct ArtList {
    #[serde(default)]
    articles: Option<Vec<Article>>,
    #[serde(default)]
    artlist: Option<Vec<Article>>,
    #[serde(default)]
    data: Option<Vec<Article>>,
}

impl ArtList {
    /// The first non-empty list among the shapes the API has used.
    fn into_items(self) -> Vec<Article> {
        [self.articles, self.artlist, self.data]
            .into_iter()
            .flatten()
            .find(|l| !l.is_empty())
            .unwrap_or_default()
    }
}

#[derive(Debug, Default, Deserialize)]
struct Article {
    url: Option<String>,
    link: Option<String>,
    title: Option<String>,
    seendate: Option<String>,
    date: Option<String>,
    published: Option<String>,
    language: Option<String>,
}

/// `[start, end]` windows covering `day`. The step is `24 / slices` whole
/// hours, at least one; the last window ends at 23:59:59.
pub fn day_slices(day: NaiveDate, slices_per_day: u32) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    let step = Duration::hours(i64::from((24 / slices_per_day.max(1)).max(1)));
    let second = Duration::seconds(1);
    let mut start = day_start(day);
    let end_of_day = start + Duration::days(1) - second;

    let mut slices = Vec::new();
    while start <= end_of_day {
        let end = (start + step - second).min(end_of_day);
        slices.push((start, end));
        start += step;
    }
    slices
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    At(usize),
    Exhausted,
}

/// All GDELT-seen articles of one domain on one UTC day.
pub struct GdeltSource<'a, F> {
    domain: String,
    id: String,
    name: String,
    fetcher: &'a RetryFetch<F>,
    base_url: String,
    slices: Vec<(DateTime<Utc>, DateTime<Utc>)>,
    cursor: Cursor,
    options: FetchOptions,
}

impl<'a, F: Fetch> GdeltSource<'a, F> {
    /// # Arguments
    /// * `domain` - Bare domain for the `domain:` query, e.g. `sec.gov`.
    /// * `day` - The UTC day to list.
    /// * `slices_per_day` - Number of windows the day is split into; see
    ///   [`day_slices`].
    /// * `fetcher` - Retrying fetcher; undecodable JSON is retried like a
    ///   transport error.
    pub fn new(domain: &str, day: NaiveDate, slices_per_day: u32, fetcher: &'a RetryFetch<F>) -> Self {
        Self {
            domain: domain.to_string(),
            id: format!("gdelt_{}", domain.replace('.', "_")),
            name: format!("{domain} via GDELT"),
            fetcher,
            base_url: GDELT_DOC_API.to_string(),
            slices: day_slices(day, slices_per_day),
            cursor: Cursor::At(0),
            options: FetchOptions::with_timeout(API_TIMEOUT),
        }
    }

    pub fn slice_url(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Url, url::ParseError> {
        Url::parse_with_params(
            &self.base_url,
            &[
                ("query", format!("domain:{}", self.domain)),
                ("mode", "artlist".to_string()),
                ("format", "json".to_string()),
                ("sort", "DateAsc".to_string()),
                ("maxrecords", MAX_RECORDS.to_string()),
                ("startdatetime", start.format(STAMP).to_string()),
                ("enddatetime", end.format(STAMP).to_string()),
            ],
        )
    }

    fn to_candidate(&self, article: Article) -> Option<Candidate> {
        let url = article.url.or(article.link).filter(|u| !u.is_empty())?;
        let published = article
            .seendate
            .or(article.date)
            .or(article.published)
            .as_deref()
            .and_then(parse_timestamp)
            .map(format_timestamp);
        Some(Candidate {
            url,
            description: article.title.clone(),
            title: article.title,
            published_at: published,
            source_id: self.id.clone(),
            source_name: self.name.clone(),
            crawl_method: CRAWL_METHOD.to_string(),
            paywall: false,
            language: article.language.as_deref().and_then(language_from_name),
        })
    }
}

impl<F: Fetch> Source for GdeltSource<'_, F> {
    fn source_id(&self) -> &str {
        &self.id
    }

    fn source_name(&self) -> &str {
        &self.name
    }

    #[instrument(level = "info", skip_all, fields(domain = %self.domain))]
    async fn next_page(&mut self) -> Result<Option<Vec<Candidate>>, Box<dyn Error>> {
        let Cursor::At(idx) = self.cursor else {
            return Ok(None);
        };
        let Some(&(start, end)) = self.slices.get(idx) else {
            self.cursor = Cursor::Exhausted;
            return Ok(None);
        };

        let url = self.slice_url(start, end)?;
        let list: ArtList = match self.fetcher.fetch_json(url.as_str(), &self.options).await {
            Ok(list) => list,
            Err(e) => {
                self.cursor = Cursor::Exhausted;
                return Err(e.into());
            }
        };
        self.cursor = Cursor::At(idx + 1);

        let candidates: Vec<_> = list
            .into_items()
            .into_iter()
            .filter_map(|a| self.to_candidate(a))
            .collect();
        debug!(slice = idx, %start, count = candidates.len(), "GDELT slice");
        Ok(Some(candidates))
    }
}
