//! Command-line interface definitions for the news harvester.
//!
//! Each run driver is a subcommand. Tuning knobs can be given as flags or
//! through the environment variables listed on each option.

use crate::storage::DaySelection;
use clap::builder::FalseyValueParser;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments for the news harvester.
///
/// # Examples
///
/// ```sh
/// # Harvest every configured feed into today's bronze day
/// news_harvest --config config/sources.yaml harvest
///
/// # Backfill a week of GDELT article lists for two domains
/// news_harvest gdelt --days 7 --domains cnbc.com,sec.gov
///
/// # Rebuild the silver snapshots for every bronze day
/// DEDUPE_DAYS=all news_harvest dedupe
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML settings file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Root directory of the day-partitioned bronze layer
    #[arg(short, long, env = "BRONZE_ROOT", default_value = "data/bronze", global = true)]
    pub bronze_root: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Harvest every configured RSS feed into today's UTC day
    Harvest,
    /// Backfill GDELT article lists for a set of domains
    Gdelt(GdeltArgs),
    /// Backfill Reuters coverage from NewsAPI
    Newsapi(NewsApiArgs),
    /// Deduplicate bronze days into silver snapshots
    Dedupe(DedupeArgs),
}

#[derive(Args, Debug)]
pub struct GdeltArgs {
    /// Days to backfill, starting yesterday
    #[arg(long, env = "GDELT_BACKFILL_DAYS", default_value_t = 30)]
    pub days: u32,

    /// Time slices per day; each slice is one API request
    #[arg(long, env = "GDELT_SLICES_PER_DAY", default_value_t = 24)]
    pub slices_per_day: u32,

    /// Comma-separated domains; defaults to the settings file list
    #[arg(long, env = "GDELT_DOMAINS", value_delimiter = ',')]
    pub domains: Vec<String>,
}

#[derive(Args, Debug)]
pub struct NewsApiArgs {
    /// NewsAPI key
    #[arg(long, env = "NEWSAPI_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Days to backfill, starting yesterday and walking backwards
    #[arg(long, env = "NEWSAPI_BACKFILL_DAYS", default_value_t = 30)]
    pub days: u32,

    /// Page cap per day and query
    #[arg(long, env = "NEWSAPI_MAX_PAGES_PER_DAY", default_value_t = 3)]
    pub max_pages: u32,
}

#[derive(Args, Debug)]
pub struct DedupeArgs {
    /// `all`, a number of most recent days, or anything else for the latest day
    #[arg(long, env = "DEDUPE_DAYS", default_value = "latest")]
    pub days: DaySelection,

    /// Drop records with fewer text characters (0 keeps everything)
    #[arg(long, env = "MIN_TEXT_CHARS", default_value_t = 0)]
    pub min_text_chars: usize,

    /// Apply the noise rules from the settings file
    #[arg(long, env = "FILTER_YH_NEWS", value_parser = FalseyValueParser::new())]
    pub filter_noise: bool,
}
