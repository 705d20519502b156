//! Silver-layer writers.
//!
//! A repair run turns one bronze day file into two snapshots next to it:
//!
//! ```text
//! bronze_root/
//! └── 2025-05-06/
//!     ├── docs.jsonl           # bronze, append-only, never rewritten here
//!     ├── docs_dedup.jsonl     # silver, line-delimited JSON
//!     └── docs_dedup.parquet   # silver, columnar
//! ```
//!
//! Both snapshots are rewritten wholesale on every run.
//!
//! # Submodules
//!
//! - [`jsonl`]: one JSON object per line, ISO-8601 `published_at`
//! - [`parquet`]: Arrow record batch written with `ArrowWriter`

use crate::models::Document;
use crate::normalizer::format_timestamp;
use chrono::{DateTime, Utc};
use serde::Serialize;

pub mod jsonl;
pub mod parquet;

/// File name of the line-delimited silver snapshot.
pub const SILVER_JSONL: &str = "docs_dedup.jsonl";
/// File name of the columnar silver snapshot.
pub const SILVER_PARQUET: &str = "docs_dedup.parquet";

/// A deduplicated record plus the columns derived for ranking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SilverRecord {
    #[serde(flatten)]
    pub doc: Document,
    pub text_len: usize,
    pub method_rank: u8,
    #[serde(skip)]
    pub published: Option<DateTime<Utc>>,
}

impl SilverRecord {
    /// Wrap a bronze record. `published_at` is rewritten from the parsed
    /// timestamp so every snapshot carries the same canonical form.
    pub fn new(mut doc: Document, published: Option<DateTime<Utc>>, method_rank: u8) -> Self {
        doc.published_at = published.map(format_timestamp);
        // Derived columns are recomputed, never carried over.
        doc.extra.remove("text_len");
        doc.extra.remove("method_rank");
        Self {
            text_len: doc.text_len(),
            doc,
            method_rank,
            published,
        }
    }
}
