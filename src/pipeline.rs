//! Per-record processing and per-source runs.
//!
//! For every candidate: fetch → paywall sniff → extract → normalize. The
//! steps for one record run in sequence; up to `concurrency` records of a
//! page are in flight at once and results keep the source's order.
//!
//! A failure on one record never stops the batch. The record is kept with
//! `http_status = "error"` and the fields the adapter gave it, so it can be
//! re-fetched later. Only a failure of the source listing itself ends a
//! source, and then nothing from that source is written for the run.

use crate::extractor;
use crate::fetcher::{Fetch, FetchOptions};
use crate::models::{Candidate, Document, HTTP_STATUS_ERROR};
use crate::normalizer::normalize;
use crate::paywall::PaywallPolicy;
use crate::sources::Source;
use crate::storage::DayStore;
use crate::utils::truncate_for_log;
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use std::error::Error;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use tracing::{debug, error, info, instrument, warn};

/// Outcome of one source for one day.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceOutcome {
    Saved {
        saved: usize,
        failed: usize,
        path: PathBuf,
    },
    /// The source listed nothing.
    NoData,
    /// Listing or persisting failed; nothing from this source was kept.
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceReport {
    pub day: NaiveDate,
    pub source_id: String,
    pub outcome: SourceOutcome,
}

impl SourceReport {
    pub fn saved(&self) -> usize {
        match self.outcome {
            SourceOutcome::Saved { saved, .. } => saved,
            _ => 0,
        }
    }
}

impl fmt::Display for SourceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}][{}] ", self.day, self.source_id)?;
        match &self.outcome {
            SourceOutcome::Saved { saved, failed, .. } => {
                write!(f, "saved: {saved} (failed: {failed})")
            }
            SourceOutcome::NoData => write!(f, "no data"),
            SourceOutcome::Failed { error } => write!(f, "error: {error}"),
        }
    }
}

/// Wires a fetcher, paywall policy and bronze store together.
pub struct Pipeline<'a, F, P> {
    fetcher: &'a F,
    paywall: &'a P,
    store: &'a DayStore,
    options: FetchOptions,
    concurrency: usize,
}

impl<'a, F: Fetch, P: PaywallPolicy> Pipeline<'a, F, P> {
    pub fn new(fetcher: &'a F, paywall: &'a P, store: &'a DayStore) -> Self {
        Self {
            fetcher,
            paywall,
            store,
            options: FetchOptions::default(),
            concurrency: 8,
        }
    }

    pub fn with_options(mut self, options: FetchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Enumerate `source` to exhaustion, process every candidate and append
    /// the batch to the bronze file for `day` in one call.
    #[instrument(level = "info", skip_all, fields(source = %source.source_id(), %day))]
    pub async fn run_source<S: Source>(&self, source: &mut S, day: NaiveDate) -> SourceReport {
        let source_id = source.source_id().to_string();
        let report = |outcome| SourceReport {
            day,
            source_id: source_id.clone(),
            outcome,
        };

        let mut batch = Vec::new();
        loop {
            match source.next_page().await {
                Ok(Some(candidates)) => {
                    debug!(count = candidates.len(), "Processing page");
                    batch.extend(self.process_page(candidates).await);
                }
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, discarded = batch.len(), "Source listing failed");
                    return report(SourceOutcome::Failed {
                        error: e.to_string(),
                    });
                }
            }
        }

        if batch.is_empty() {
            info!("Source produced no records");
            return report(SourceOutcome::NoData);
        }

        let failed = batch.iter().filter(|d| d.is_error()).count();
        match self.store.append(&batch, day).await {
            Ok(path) => {
                info!(saved = batch.len(), failed, "Source batch saved");
                report(SourceOutcome::Saved {
                    saved: batch.len(),
                    failed,
                    path,
                })
            }
            Err(e) => {
                error!(error = %e, "Failed to append batch");
                report(SourceOutcome::Failed {
                    error: e.to_string(),
                })
            }
        }
    }

    async fn process_page(&self, candidates: Vec<Candidate>) -> Vec<Document> {
        let fetcher = self.fetcher;
        let paywall = self.paywall;
        let options = &self.options;
        stream::iter(candidates)
            .map(move |c| process_record(fetcher, paywall, options, c))
            .buffered(self.concurrency)
            .collect()
            .await
    }
}

/// Run one candidate through fetch → extract → normalize.
///
/// Never fails: on any error the record comes back with only its adapter
/// fields and `http_status = "error"`.
pub async fn process_record<F: Fetch, P: PaywallPolicy>(
    fetcher: &F,
    paywall: &P,
    options: &FetchOptions,
    candidate: Candidate,
) -> Document {
    let mut doc = Document::from(candidate);
    match enrich(fetcher, paywall, options, &doc).await {
        Ok(enriched) => enriched,
        Err(e) => {
            warn!(
                url = %doc.url,
                error = %truncate_for_log(&e.to_string(), 300),
                "Record failed; keeping metadata only"
            );
            doc.http_status = Some(HTTP_STATUS_ERROR.to_string());
            doc
        }
    }
}

async fn enrich<F: Fetch, P: PaywallPolicy>(
    fetcher: &F,
    paywall: &P,
    options: &FetchOptions,
    doc: &Document,
) -> Result<Document, Box<dyn Error>> {
    let fetched = fetcher.fetch(&doc.url, options).await?;

    let sniffed = paywall.is_paywalled(&fetched.body);
    let extraction = catch_unwind(AssertUnwindSafe(|| extractor::extract(&fetched.body)))
        .map_err(|_| "extractor panicked")?;

    let mut doc = doc.clone();
    doc.http_status = Some(fetched.status.to_string());
    // Never clear a paywall flag the adapter already set.
    doc.paywall = Some(doc.paywall.unwrap_or(false) || sniffed);
    doc.text = Some(extraction.text);
    doc.content_hash = extraction.content_hash;
    doc.extract_method = Some(extraction.method.as_str().to_string());
    Ok(normalize(doc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::fixtures::prose;
    use crate::fetcher::RetryFetch;
    use crate::fetcher::testing::{ScriptedFetcher, instant_policy};
    use crate::paywall::MarkerSniffer;
    use crate::sources::testing::{StaticSource, candidate};
    use crate::storage::load_day;

    fn article(body_chars: usize) -> String {
        format!("<html><body><article><p>{}</p></article></body></html>", prose(body_chars))
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, 6).unwrap()
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_record_with_error_sentinel() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DayStore::new(tmp.path());
        let fetcher = RetryFetch::new(
            ScriptedFetcher::new()
                .page("https://n.test/1", article(400))
                .failing("https://n.test/2")
                .page("https://n.test/3", article(300)),
            instant_policy(),
        );
        let paywall = MarkerSniffer::default();
        let pipeline = Pipeline::new(&fetcher, &paywall, &store).with_concurrency(2);

        let mut source = StaticSource::new(
            "feed",
            vec![vec![
                candidate("feed", "https://n.test/1", "One"),
                candidate("feed", "https://n.test/2", "Two"),
                candidate("feed", "https://n.test/3", "Three"),
            ]],
        );
        let report = pipeline.run_source(&mut source, day()).await;
        assert!(matches!(
            report.outcome,
            SourceOutcome::Saved { saved: 3, failed: 1, .. }
        ));
        assert_eq!(report.to_string(), "[2025-05-06][feed] saved: 3 (failed: 1)");

        let loaded = load_day(&store.day_file(day())).await.unwrap().records;
        assert_eq!(loaded.len(), 3);

        let failed = &loaded[1];
        assert_eq!(failed.http_status.as_deref(), Some("error"));
        assert_eq!(failed.url, "https://n.test/2");
        assert_eq!(failed.title.as_deref(), Some("Two"));
        assert_eq!(failed.text, None);
        assert_eq!(failed.extract_method, None);

        for ok in [&loaded[0], &loaded[2]] {
            assert_eq!(ok.http_status.as_deref(), Some("200"));
            assert_eq!(ok.extract_method.as_deref(), Some("trafilatura"));
            assert!(!ok.text.as_deref().unwrap_or_default().is_empty());
            assert!(ok.content_hash.is_some());
            assert_eq!(ok.published_at.as_deref(), Some("2025-05-06T08:00:00+00:00"));
            assert_eq!(ok.language.as_deref(), Some("en"));
        }
    }

    #[tokio::test]
    async fn test_failed_fetch_was_retried() {
        let fetcher = RetryFetch::new(
            ScriptedFetcher::new().failing("https://n.test/down"),
            instant_policy(),
        );
        let doc = process_record(
            &fetcher,
            &MarkerSniffer::default(),
            &FetchOptions::default(),
            candidate("feed", "https://n.test/down", "Down"),
        )
        .await;
        assert!(doc.is_error());
        assert_eq!(doc.published_at.as_deref(), Some("2025-05-06T08:00:00Z"));
    }

    #[tokio::test]
    async fn test_paywall_flag_is_ored() {
        let fetcher = ScriptedFetcher::new()
            .page("https://n.test/free", article(300))
            .page(
                "https://n.test/gated",
                format!("<html><body><div>Subscribe now</div><p>{}</p></body></html>", prose(300)),
            );
        let paywall = MarkerSniffer::default();
        let opts = FetchOptions::default();

        let free = process_record(&fetcher, &paywall, &opts, candidate("f", "https://n.test/free", "a")).await;
        assert_eq!(free.paywall, Some(false));

        let gated = process_record(&fetcher, &paywall, &opts, candidate("f", "https://n.test/gated", "b")).await;
        assert_eq!(gated.paywall, Some(true));

        let mut flagged = candidate("f", "https://n.test/free", "c");
        flagged.paywall = true;
        let flagged = process_record(&fetcher, &paywall, &opts, flagged).await;
        assert_eq!(flagged.paywall, Some(true));
    }

    #[tokio::test]
    async fn test_unextractable_page_is_not_an_error() {
        let fetcher = ScriptedFetcher::new().page("https://n.test/img", "<html><body><img src=x></body></html>");
        let doc = process_record(
            &fetcher,
            &MarkerSniffer::default(),
            &FetchOptions::default(),
            candidate("f", "https://n.test/img", "Pictures"),
        )
        .await;
        assert!(!doc.is_error());
        assert_eq!(doc.extract_method.as_deref(), Some("none"));
        assert_eq!(doc.text.as_deref(), Some(""));
        assert_eq!(doc.content_hash, None);
    }

    #[tokio::test]
    async fn test_listing_failure_discards_source_batch() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DayStore::new(tmp.path());
        let fetcher = ScriptedFetcher::new().page("https://n.test/1", article(300));
        let paywall = MarkerSniffer::default();
        let pipeline = Pipeline::new(&fetcher, &paywall, &store);

        let mut source = StaticSource::new(
            "broken",
            vec![vec![candidate("broken", "https://n.test/1", "One")]],
        )
        .failing_after("page 2 returned HTTP 500");
        let report = pipeline.run_source(&mut source, day()).await;

        assert_eq!(
            report.outcome,
            SourceOutcome::Failed {
                error: "page 2 returned HTTP 500".to_string()
            }
        );
        assert!(!store.day_file(day()).exists());
        assert_eq!(report.to_string(), "[2025-05-06][broken] error: page 2 returned HTTP 500");
    }

    #[tokio::test]
    async fn test_empty_source_reports_no_data() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DayStore::new(tmp.path());
        let fetcher = ScriptedFetcher::new();
        let paywall = MarkerSniffer::default();
        let pipeline = Pipeline::new(&fetcher, &paywall, &store);

        let mut source = StaticSource::new("quiet", vec![vec![]]);
        let report = pipeline.run_source(&mut source, day()).await;
        assert_eq!(report.outcome, SourceOutcome::NoData);
        assert_eq!(report.to_string(), "[2025-05-06][quiet] no data");
        assert!(!store.day_dir(day()).exists());
        assert!(fetcher.calls().is_empty());
    }

    #[tokio::test]
    async fn test_multiple_pages_keep_order() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DayStore::new(tmp.path());
        let mut fetcher = ScriptedFetcher::new();
        let mut pages = Vec::new();
        for p in 0..3 {
            let mut page = Vec::new();
            for i in 0..4 {
                let url = format!("https://n.test/{p}/{i}");
                fetcher = fetcher.page(&url, article(250));
                page.push(candidate("paged", &url, "x"));
            }
            pages.push(page);
        }
        let paywall = MarkerSniffer::default();
        let pipeline = Pipeline::new(&fetcher, &paywall, &store).with_concurrency(3);

        let mut source = StaticSource::new("paged", pages);
        let report = pipeline.run_source(&mut source, day()).await;
        assert_eq!(report.saved(), 12);

        let loaded = load_day(&store.day_file(day())).await.unwrap().records;
        let urls: Vec<_> = loaded.iter().map(|d| d.url.as_str()).collect();
        let want: Vec<String> = (0..3)
            .flat_map(|p| (0..4).map(move |i| format!("https://n.test/{p}/{i}")))
            .collect();
        assert_eq!(urls, want);
    }
}
