//! Columnar snapshot.
//!
//! Unknown bronze fields only survive in the JSONL snapshot; the Parquet
//! schema is fixed.

use super::SilverRecord;
use crate::models::Document;
use ::parquet::arrow::ArrowWriter;
use arrow_array::{
    ArrayRef, BooleanArray, Int32Array, Int64Array, RecordBatch, StringArray,
    TimestampMicrosecondArray,
};
use arrow_schema::{DataType, Field, Schema, TimeUnit};
use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tracing::{info, instrument};

/// String columns in output order, each read from a [`Document`].
const STRING_COLUMNS: &[(&str, fn(&Document) -> Option<&str>)] = &[
    ("url", |d| Some(d.url.as_str())),
    ("url_hash", |d| d.url_hash.as_deref()),
    ("title", |d| d.title.as_deref()),
    ("description", |d| d.description.as_deref()),
    ("source_id", |d| d.source_id.as_deref()),
    ("source_name", |d| d.source_name.as_deref()),
    ("crawl_method", |d| d.crawl_method.as_deref()),
    ("text", |d| d.text.as_deref()),
    ("content_hash", |d| d.content_hash.as_deref()),
    ("extract_method", |d| d.extract_method.as_deref()),
    ("language", |d| d.language.as_deref()),
    ("http_status", |d| d.http_status.as_deref()),
];

pub fn silver_schema() -> Schema {
    let mut fields: Vec<Field> = STRING_COLUMNS
        .iter()
        .map(|(name, _)| Field::new(*name, DataType::Utf8, *name != "url"))
        .collect();
    fields.push(Field::new(
        "published_at",
        DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
        true,
    ));
    fields.push(Field::new("paywall", DataType::Boolean, true));
    fields.push(Field::new("text_len", DataType::Int64, false));
    fields.push(Field::new("method_rank", DataType::Int32, false));
    Schema::new(fields)
}

pub fn to_record_batch(records: &[SilverRecord]) -> Result<RecordBatch, Box<dyn Error>> {
    let mut columns: Vec<ArrayRef> = STRING_COLUMNS
        .iter()
        .map(|(_, get)| {
            let values: Vec<Option<&str>> = records.iter().map(|r| get(&r.doc)).collect();
            Arc::new(StringArray::from(values)) as ArrayRef
        })
        .collect();

    let published = TimestampMicrosecondArray::from(
        records
            .iter()
            .map(|r| r.published.map(|p| p.timestamp_micros()))
            .collect::<Vec<_>>(),
    )
    .with_timezone("UTC");
    let paywall = BooleanArray::from(records.iter().map(|r| r.doc.paywall).collect::<Vec<_>>());
    let text_len = Int64Array::from(records.iter().map(|r| r.text_len as i64).collect::<Vec<_>>());
    let rank = Int32Array::from(
        records
            .iter()
            .map(|r| i32::from(r.method_rank))
            .collect::<Vec<_>>(),
    );

    columns.push(Arc::new(published));
    columns.push(Arc::new(paywall));
    columns.push(Arc::new(text_len));
    columns.push(Arc::new(rank));

    Ok(RecordBatch::try_new(Arc::new(silver_schema()), columns)?)
}

/// Overwrite `path` with a single-row-group Parquet file.
#[instrument(level = "info", skip_all, fields(path = %path.display(), count = records.len()))]
pub async fn write_parquet(records: &[SilverRecord], path: &Path) -> Result<(), Box<dyn Error>> {
    let batch = to_record_batch(records)?;
    let mut writer = ArrowWriter::try_new(Vec::new(), batch.schema(), None)?;
    writer.write(&batch)?;
    let bytes = writer.into_inner()?;
    fs::write(path, bytes).await?;
    info!("Wrote Parquet snapshot");
    Ok(())
}
