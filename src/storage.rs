//! Bronze layer: append-only, day-partitioned JSON Lines.
//!
//! # Layout
//!
//! ```text
//! bronze_root/
//! ├── 2025-05-05/
//! │   └── docs.jsonl
//! └── 2025-05-06/
//!     └── docs.jsonl
//! ```
//!
//! Files are only ever opened in append mode. Each append writes a whole
//! batch in one call while holding the store's write lock, so lines from
//! concurrent batches never interleave. Non-ASCII text is written as-is.

use crate::models::Document;
use crate::utils::day_label;
use chrono::NaiveDate;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// File name of a bronze day file.
pub const BRONZE_FILE: &str = "docs.jsonl";

/// Append-only store partitioned by UTC day.
#[derive(Debug)]
pub struct DayStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl DayStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn day_dir(&self, day: NaiveDate) -> PathBuf {
        self.root.join(day_label(day))
    }

    pub fn day_file(&self, day: NaiveDate) -> PathBuf {
        self.day_dir(day).join(BRONZE_FILE)
    }

    /// Append `records` to the file for `day`, creating the day directory if
    /// needed. Returns the file path. An empty batch touches nothing.
    #[instrument(level = "info", skip_all, fields(day = %day, count = records.len()))]
    pub async fn append(&self, records: &[Document], day: NaiveDate) -> Result<PathBuf, Box<dyn Error>> {
        let path = self.day_file(day);
        if records.is_empty() {
            debug!("Empty batch; nothing to append");
            return Ok(path);
        }

        let mut buf = String::new();
        for record in records {
            buf.push_str(&serde_json::to_string(record)?);
            buf.push('\n');
        }

        let _guard = self.write_lock.lock().await;
        fs::create_dir_all(self.day_dir(day)).await?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(buf.as_bytes()).await?;
        file.flush().await?;

        info!(path = %path.display(), "Appended records");
        Ok(path)
    }

    /// Every day directory holding a bronze file, oldest first.
    pub async fn list_days(&self) -> Result<Vec<(NaiveDate, PathBuf)>, Box<dyn Error>> {
        let mut days = Vec::new();
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(days),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(day) = name
                .to_str()
                .and_then(|n| NaiveDate::parse_from_str(n, "%Y-%m-%d").ok())
            else {
                continue;
            };
            let file = entry.path().join(BRONZE_FILE);
            if fs::try_exists(&file).await? {
                days.push((day, file));
            }
        }
        days.sort();
        Ok(days)
    }
}

/// Records read back from a day file.
#[derive(Debug, Default)]
pub struct LoadedDay {
    pub records: Vec<Document>,
    /// Lines that were not valid records.
    pub skipped: usize,
}

/// Read every record of a bronze day file. Blank lines are ignored and
/// malformed lines are counted and skipped.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn load_day(path: &Path) -> Result<LoadedDay, Box<dyn Error>> {
    let raw = fs::read_to_string(path).await?;
    let mut loaded = LoadedDay::default();
    for (lineno, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Document>(line) {
            Ok(doc) => loaded.records.push(doc),
            Err(e) => {
                warn!(line = lineno + 1, error = %e, "Skipping malformed bronze line");
                loaded.skipped += 1;
            }
        }
    }
    Ok(loaded)
}

/// Which bronze days a repair run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DaySelection {
    All,
    Last(usize),
    #[default]
    Latest,
}

impl DaySelection {
    /// Narrow an oldest-first list of days.
    pub fn apply<T>(&self, mut days: Vec<T>) -> Vec<T> {
        match *self {
            DaySelection::All => days,
            DaySelection::Last(n) => {
                let skip = days.len().saturating_sub(n);
                days.split_off(skip)
            }
            DaySelection::Latest => {
                let skip = days.len().saturating_sub(1);
                days.split_off(skip)
            }
        }
    }
}

impl FromStr for DaySelection {
    type Err = std::convert::Infallible;

    /// `all`, a number of most recent days, or anything else for the latest day.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(DaySelection::All);
        }
        match s.parse::<usize>() {
            Ok(n) => Ok(DaySelection::Last(n)),
            Err(_) => Ok(DaySelection::Latest),
        }
    }
}
