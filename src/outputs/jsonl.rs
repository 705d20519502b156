//! Line-delimited JSON snapshot.

use super::SilverRecord;
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

/// Overwrite `path` with one JSON object per record. Non-ASCII text is
/// written as-is.
#[instrument(level = "info", skip_all, fields(path = %path.display(), count = records.len()))]
pub async fn write_jsonl(records: &[SilverRecord], path: &Path) -> Result<(), Box<dyn Error>> {
    let mut buf = String::new();
    for record in records {
        buf.push_str(&serde_json::to_string(record)?);
        buf.push('\n');
    }
    fs::write(path, buf).await?;
    info!("Wrote JSONL snapshot");
    Ok(())
}
