//! Dedup and repair: bronze day file → silver snapshots.
//!
//! For one day: drop noise and too-short records, order the rest so the best
//! copy of each document comes first, keep the first record per identity key,
//! then write the JSONL and Parquet snapshots next to the bronze file.
//!
//! "Best" means, in order: the most trusted extraction method (lowest
//! [`method_rank`]), the longest text, the earliest publication time. Records
//! without a timestamp lose the last tie-break. The sort is stable, so fully
//! tied records keep their bronze order.

use crate::models::Document;
use crate::normalizer::parse_timestamp;
use crate::outputs::jsonl::write_jsonl;
use crate::outputs::parquet::write_parquet;
use crate::outputs::{SILVER_JSONL, SILVER_PARQUET, SilverRecord};
use crate::storage::load_day;
use itertools::Itertools;
use regex::Regex;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

/// Rank of an extraction method; lower is more trusted.
///
/// Unknown, missing and empty methods all rank 5.
pub fn method_rank(method: Option<&str>) -> u8 {
    match method {
        Some("trafilatura") => 0,
        Some("readability") => 1,
        Some("boilerpipe") => 2,
        Some("justext") => 3,
        Some("fallback") => 9,
        _ => 5,
    }
}

/// Drops URLs matching `deny` unless they also match `allow`.
#[derive(Debug, Clone)]
pub struct NoiseRule {
    deny: Regex,
    allow: Option<Regex>,
}

impl NoiseRule {
    pub fn new(deny: &str, allow: Option<&str>) -> Result<Self, regex::Error> {
        Ok(Self {
            deny: Regex::new(deny)?,
            allow: allow.map(Regex::new).transpose()?,
        })
    }

    pub fn is_noise(&self, url: &str) -> bool {
        self.deny.is_match(url) && !self.allow.as_ref().is_some_and(|a| a.is_match(url))
    }
}

/// Pre-filters applied before dedup.
#[derive(Debug, Clone, Default)]
pub struct DedupOptions {
    /// Records with fewer text characters are dropped; 0 disables the filter.
    pub min_text_chars: usize,
    /// Empty disables noise filtering.
    pub noise_rules: Vec<NoiseRule>,
}

/// Counts for one repaired day.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DedupReport {
    pub input: usize,
    pub deduped: usize,
    pub skipped_lines: usize,
    pub by_source_before: BTreeMap<String, usize>,
    pub by_source_after: BTreeMap<String, usize>,
    pub outputs: Vec<PathBuf>,
}

impl DedupReport {
    pub fn removed(&self) -> usize {
        self.input - self.deduped
    }
}

impl fmt::Display for DedupReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Input: {}  →  Deduped: {}  (removed: {})",
            self.input,
            self.deduped,
            self.removed()
        )?;
        writeln!(f, "By source (before):")?;
        for (source, n) in &self.by_source_before {
            writeln!(f, "  {source:<32} {n}")?;
        }
        writeln!(f, "By source (after):")?;
        for (source, n) in &self.by_source_after {
            writeln!(f, "  {source:<32} {n}")?;
        }
        if !self.outputs.is_empty() {
            let saved = self.outputs.iter().map(|p| p.display().to_string()).join("  &  ");
            write!(f, "Saved: {saved}")?;
        }
        Ok(())
    }
}

fn count_by_source<'a>(docs: impl Iterator<Item = &'a Document>) -> BTreeMap<String, usize> {
    docs.filter_map(|d| d.source_id.clone())
        .counts()
        .into_iter()
        .collect()
}

fn compare(a: &SilverRecord, b: &SilverRecord) -> Ordering {
    a.method_rank
        .cmp(&b.method_rank)
        .then_with(|| b.text_len.cmp(&a.text_len))
        .then_with(|| match (a.published, b.published) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
}

/// Filter, rank and dedupe one day's records.
///
/// # Arguments
/// * `records` - One day's bronze records, in file order.
/// * `options` - Noise rules and the minimum text length.
///
/// # Returns
/// * The surviving records, at most one per identity key (`url_hash`, else
///   `url`), sorted by method rank, then longest text, then earliest
///   publication with missing timestamps last. Ties keep file order.
pub fn dedupe(records: Vec<Document>, options: &DedupOptions) -> Vec<SilverRecord> {
    let mut ranked: Vec<SilverRecord> = records
        .into_iter()
        .filter(|d| !options.noise_rules.iter().any(|r| r.is_noise(&d.url)))
        .map(|d| {
            let published = d.published_at.as_deref().and_then(parse_timestamp);
            let rank = method_rank(d.extract_method.as_deref());
            SilverRecord::new(d, published, rank)
        })
        .filter(|r| r.text_len >= options.min_text_chars)
        .collect();

    ranked.sort_by(compare);

    let mut seen = HashSet::new();
    ranked.retain(|r| seen.insert(r.doc.identity_key().to_string()));
    ranked
}

/// Repair one bronze day file.
///
/// # Arguments
/// * `bronze_file` - Path to `<day>/docs.jsonl`; it is only read.
/// * `options` - Passed through to [`dedupe`].
///
/// # Returns
/// * A [`DedupReport`] with the before and after counts and the paths of
///   the silver JSONL and Parquet snapshots, both written (or overwritten)
///   next to the bronze file.
///
/// # Errors
/// * Reading the bronze file, building the Parquet batch or writing either
///   snapshot fails.
#[instrument(level = "info", skip_all, fields(path = %bronze_file.display()))]
pub async fn repair_day(bronze_file: &Path, options: &DedupOptions) -> Result<DedupReport, Box<dyn Error>> {
    let day_dir = bronze_file
        .parent()
        .ok_or_else(|| format!("{} has no parent directory", bronze_file.display()))?;

    let loaded = load_day(bronze_file).await?;
    if loaded.skipped > 0 {
        warn!(skipped = loaded.skipped, "Bronze file had malformed lines");
    }

    let input = loaded.records.len();
    let by_source_before = count_by_source(loaded.records.iter());

    let silver = dedupe(loaded.records, options);
    let by_source_after = count_by_source(silver.iter().map(|r| &r.doc));

    let jsonl_path = day_dir.join(SILVER_JSONL);
    let parquet_path = day_dir.join(SILVER_PARQUET);
    write_parquet(&silver, &parquet_path).await?;
    write_jsonl(&silver, &jsonl_path).await?;

    info!(input, deduped = silver.len(), "Repaired day");
    Ok(DedupReport {
        input,
        deduped: silver.len(),
        skipped_lines: loaded.skipped,
        by_source_before,
        by_source_after,
        outputs: vec![jsonl_path, parquet_path],
    })
}
