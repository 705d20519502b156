//! Structured-data extraction from JSON-LD `<script>` blocks.
//!
//! Many dynamic news sites render an empty shell and ship the full story in
//! a `NewsArticle` JSON-LD block. A block qualifies when its `@type` names an
//! article type or when it simply carries an `articleBody`.

use super::{FALLBACK_MIN_CHARS, longer_than};
use crate::utils::collapse_whitespace;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;

static LD_JSON: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"script[type="application/ld+json"]"#).unwrap());

/// The first `articleBody` longer than 80 characters across the page's
/// JSON-LD blocks.
pub fn extract(document: &Html) -> Option<String> {
    for script in document.select(&LD_JSON) {
        let raw = script.text().collect::<String>();
        let data: Value = match serde_json::from_str(raw.trim()) {
            Ok(v) => v,
            Err(e) => {
                debug!(error = %e, "Skipping unparseable JSON-LD block");
                continue;
            }
        };
        for item in items(&data) {
            if !is_article(item) {
                continue;
            }
            let body = item
                .get("articleBody")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if let Some(text) = longer_than(collapse_whitespace(body), FALLBACK_MIN_CHARS) {
                return Some(text);
            }
        }
    }
    None
}

/// Top-level objects of a block: the value itself, the members of a
/// top-level array, and the members of any `@graph`.
fn items(data: &Value) -> Vec<&Value> {
    let top: Vec<&Value> = match data {
        Value::Array(arr) => arr.iter().collect(),
        other => vec![other],
    };
    let mut out = Vec::with_capacity(top.len());
    for item in top {
        out.push(item);
        if let Some(graph) = item.get("@graph").and_then(Value::as_array) {
            out.extend(graph.iter());
        }
    }
    out
}

fn is_article(item: &Value) -> bool {
    if item.get("articleBody").is_some() {
        return true;
    }
    match item.get("@type") {
        Some(Value::String(t)) => t.contains("Article"),
        Some(Value::Array(ts)) => ts
            .iter()
            .filter_map(Value::as_str)
            .any(|t| t.contains("Article")),
        _ => false,
    }
}
