//! Upstream sources that produce raw candidate records.
//!
//! Every adapter implements [`Source`], a one-shot cursor over pages of
//! [`Candidate`]s. A source is finite: once it returns `Ok(None)` it is
//! exhausted and keeps returning `Ok(None)`. It cannot be rewound; build a new
//! one to enumerate again.
//!
//! # Supported Sources
//!
//! | Source | Module | Method | Notes |
//! |--------|--------|--------|-------|
//! | RSS / Atom feeds | [`rss`] | feed XML | One page per feed |
//! | GDELT DOC 2.0 | [`gdelt`] | JSON API | One page per time slice of a UTC day |
//! | NewsAPI | [`newsapi`] | JSON API | Page cursor, `sources=` then `domains=` fallback |
//!
//! An error from [`Source::next_page`] means the listing itself failed and
//! ends that source's contribution to the run.

use crate::models::Candidate;
use std::error::Error;

pub mod gdelt;
pub mod newsapi;
pub mod rss;

/// A finite, non-restartable producer of candidate records.
pub trait Source {
    /// Stable identifier used in reports.
    fn source_id(&self) -> &str;

    /// Human-readable name stamped on every candidate.
    fn source_name(&self) -> &str;

    /// The next page of candidates, or `None` once the source is exhausted.
    async fn next_page(&mut self) -> Result<Option<Vec<Candidate>>, Box<dyn Error>>;
}
