//! # News Harvest
//!
//! Harvests news articles from RSS feeds and two search APIs, downloads the
//! full pages, extracts article text and stores the records as
//! day-partitioned datasets.
//!
//! ## Usage
//!
//! ```sh
//! news_harvest --config config/sources.yaml harvest
//! news_harvest gdelt --days 7
//! news_harvest newsapi --days 3
//! news_harvest dedupe --days all
//! ```
//!
//! ## Architecture
//!
//! 1. **Listing**: a source adapter yields pages of candidate records
//! 2. **Fetching**: each candidate's page is downloaded with retries (8 at a time)
//! 3. **Extraction**: a cascade of strategies pulls the article text
//! 4. **Normalization**: timestamps to UTC ISO-8601, language identification
//! 5. **Bronze**: each source's batch is appended to `<root>/<day>/docs.jsonl`
//! 6. **Silver**: `dedupe` ranks and deduplicates a day into JSONL + Parquet snapshots

use chrono::Duration;
use clap::Parser;
use std::error::Error;
use std::time::Duration as StdDuration;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod dedup;
mod extractor;
mod fetcher;
mod models;
mod normalizer;
mod outputs;
mod paywall;
mod pipeline;
mod sources;
mod storage;
mod utils;

use cli::{Cli, Command, DedupeArgs, GdeltArgs, NewsApiArgs};
use config::{Settings, load_settings};
use dedup::{DedupOptions, repair_day};
use fetcher::{HttpFetcher, RetryFetch};
use paywall::MarkerSniffer;
use pipeline::{Pipeline, SourceOutcome};
use sources::gdelt::{GdeltSource, parse_domains};
use sources::newsapi::NewsApiSource;
use sources::rss::RssSource;
use storage::{BRONZE_FILE, DayStore};
use utils::{ensure_writable_dir, utc_today};

const DOMAIN_PAUSE: StdDuration = StdDuration::from_millis(200);
const DAY_PAUSE: StdDuration = StdDuration::from_millis(500);

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    let args = Cli::parse();
    info!(command = ?args.command, bronze_root = %args.bronze_root.display(), "news_harvest starting up");

    let settings = load_settings(args.config.as_deref())?;
    let store = DayStore::new(&args.bronze_root);

    let result = match args.command {
        Command::Harvest => harvest(&settings, &store).await,
        Command::Gdelt(gdelt) => backfill_gdelt(&settings, &store, gdelt).await,
        Command::Newsapi(newsapi) => backfill_newsapi(&settings, &store, newsapi).await,
        Command::Dedupe(dedupe) => dedupe_days(&settings, &store, dedupe).await,
    };

    let elapsed = start_time.elapsed();
    match &result {
        Ok(()) => info!(elapsed_secs = elapsed.as_secs_f64(), "news_harvest finished"),
        Err(e) => error!(error = %e, elapsed_secs = elapsed.as_secs_f64(), "news_harvest failed"),
    }
    result
}

/// Shared fetch stack for the harvesting drivers.
struct Harvester {
    fetcher: RetryFetch<HttpFetcher>,
    paywall: MarkerSniffer,
}

impl Harvester {
    async fn new(settings: &Settings, store: &DayStore) -> Result<Self, Box<dyn Error>> {
        if let Err(e) = ensure_writable_dir(store.root()).await {
            error!(
                path = %store.root().display(),
                error = %e,
                "Bronze directory is not writable (fix perms or choose a different path)"
            );
            return Err(e);
        }
        let http = HttpFetcher::new(settings.user_agents.clone())?;
        Ok(Self {
            fetcher: RetryFetch::new(http, settings.retry.policy()),
            paywall: settings.paywall_policy(),
        })
    }

    fn pipeline<'a>(
        &'a self,
        settings: &Settings,
        store: &'a DayStore,
    ) -> Pipeline<'a, RetryFetch<HttpFetcher>, MarkerSniffer> {
        Pipeline::new(&self.fetcher, &self.paywall, store)
            .with_options(settings.fetch_options())
            .with_concurrency(settings.concurrency)
    }
}

#[instrument(level = "info", skip_all)]
async fn harvest(settings: &Settings, store: &DayStore) -> Result<(), Box<dyn Error>> {
    if settings.rss_sources.is_empty() {
        warn!("No rss_sources configured; nothing to harvest");
        return Ok(());
    }
    let harvester = Harvester::new(settings, store).await?;
    let pipeline = harvester.pipeline(settings, store);

    let day = utc_today();
    let mut total = 0;
    for feed in &settings.rss_sources {
        let mut source = RssSource::new(feed.clone(), &harvester.fetcher).with_options(settings.fetch_options());
        let report = pipeline.run_source(&mut source, day).await;
        println!("{report}");
        total += report.saved();
    }
    println!("Total: {total}");
    Ok(())
}

#[instrument(level = "info", skip_all, fields(days = args.days, slices = args.slices_per_day))]
async fn backfill_gdelt(settings: &Settings, store: &DayStore, args: GdeltArgs) -> Result<(), Box<dyn Error>> {
    let domains = match parse_domains(&args.domains.join(",")) {
        d if d.is_empty() => settings.gdelt_domains.clone(),
        d => d,
    };
    let harvester = Harvester::new(settings, store).await?;
    let pipeline = harvester.pipeline(settings, store);

    let today = utc_today();
    let mut grand_total = 0;
    for back in 1..=i64::from(args.days) {
        let day = today - Duration::days(back);
        println!("=== {day} ===");
        let mut day_total = 0;
        for domain in &domains {
            let mut source = GdeltSource::new(domain, day, args.slices_per_day, &harvester.fetcher);
            let report = pipeline.run_source(&mut source, day).await;
            println!("{report}");
            day_total += report.saved();
            sleep(DOMAIN_PAUSE).await;
        }
        println!("[{day}] total: {day_total}");
        grand_total += day_total;
    }
    println!("TOTAL: {grand_total}");
    Ok(())
}

/// A source-level failure (bad key, exhausted retries) ends the backfill.
#[instrument(level = "info", skip_all, fields(days = args.days, max_pages = args.max_pages))]
async fn backfill_newsapi(settings: &Settings, store: &DayStore, args: NewsApiArgs) -> Result<(), Box<dyn Error>> {
    let harvester = Harvester::new(settings, store).await?;
    let pipeline = harvester.pipeline(settings, store);

    let today = utc_today();
    let mut total = 0;
    for back in 1..=i64::from(args.days) {
        let day = today - Duration::days(back);
        println!("=== {day} ===");
        let mut source = NewsApiSource::new(args.api_key.clone(), day, args.max_pages, &harvester.fetcher);
        let report = pipeline.run_source(&mut source, day).await;
        println!("{report}");
        if matches!(report.outcome, SourceOutcome::Failed { .. }) {
            warn!(%day, "Stopping NewsAPI backfill");
            break;
        }
        total += report.saved();
        sleep(DAY_PAUSE).await;
    }
    println!("TOTAL: {total}");
    Ok(())
}

#[instrument(level = "info", skip_all)]
async fn dedupe_days(settings: &Settings, store: &DayStore, args: DedupeArgs) -> Result<(), Box<dyn Error>> {
    let days = store.list_days().await?;
    if days.is_empty() {
        println!("No {BRONZE_FILE} found under {}", store.root().display());
        return Ok(());
    }

    let options = DedupOptions {
        min_text_chars: args.min_text_chars,
        noise_rules: if args.filter_noise {
            settings.noise_rules()?
        } else {
            Vec::new()
        },
    };

    for (day, path) in args.days.apply(days) {
        println!("=== {day} ===");
        match repair_day(&path, &options).await {
            Ok(report) => println!("{report}\n"),
            Err(e) => {
                error!(%day, error = %e, "Repair failed");
                println!("[{day}] error: {e}\n");
            }
        }
    }
    Ok(())
}
