//! Article text extraction.
//!
//! [`extract`] runs a fixed-priority cascade of strategies over a fetched
//! page and stops at the first one whose output clears that strategy's own
//! length threshold:
//!
//! | # | Strategy | Module | Accepts when |
//! |---|----------|--------|--------------|
//! | 1 | boilerplate removal | [`general`] | ≥ 200 chars |
//! | 2 | JSON-LD `articleBody` | [`json_ld`] | > 80 chars |
//! | 3 | known body containers | [`selectors`] | > 80 chars |
//! | 4 | reader mode (`readability` crate) | [`readability`] | > 80 chars |
//!
//! When every strategy declines, the result is empty text tagged
//! [`ExtractMethod::None`]. Outputs are never compared across strategies:
//! position in the cascade is the only tie-break.
//!
//! All strategies are pure functions of the parsed document, so identical
//! input bytes always give identical output.

use crate::models::{ExtractMethod, content_hash};
use crate::utils::collapse_whitespace;
use scraper::{ElementRef, Html, Node};
use tracing::debug;

pub mod general;
pub mod json_ld;
pub mod readability;
pub mod selectors;

/// Minimum length for the boilerplate-removal strategy.
pub const GENERAL_MIN_CHARS: usize = 200;
/// Strategies after the first accept strictly more than this many characters.
pub const FALLBACK_MIN_CHARS: usize = 80;

/// Output of the extraction cascade.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub text: String,
    pub content_hash: Option<String>,
    pub method: ExtractMethod,
}

impl Extraction {
    fn new(text: String, method: ExtractMethod) -> Self {
        Self {
            content_hash: content_hash(&text),
            text,
            method,
        }
    }

    fn empty() -> Self {
        Self::new(String::new(), ExtractMethod::None)
    }
}

/// A single step of the cascade: returns cleaned text only when it meets
/// the strategy's own threshold.
struct Strategy {
    method: ExtractMethod,
    run: fn(&Html) -> Option<String>,
}

const CASCADE: &[Strategy] = &[
    Strategy {
        method: ExtractMethod::Trafilatura,
        run: general::extract,
    },
    Strategy {
        method: ExtractMethod::JsonLd,
        run: json_ld::extract,
    },
    Strategy {
        method: ExtractMethod::CssSelectors,
        run: selectors::extract,
    },
    Strategy {
        method: ExtractMethod::Readability,
        run: readability::extract,
    },
];

/// Extract article text from raw HTML bytes.
///
/// # Arguments
/// * `html` - The page body as fetched. Invalid UTF-8 is replaced, never
///   rejected.
///
/// # Returns
/// * The text, its content hash and the method of the first strategy that
///   accepted, or empty text with [`ExtractMethod::None`].
pub fn extract(html: &[u8]) -> Extraction {
    let source = String::from_utf8_lossy(html);
    let document = Html::parse_document(&source);

    for strategy in CASCADE {
        if let Some(text) = (strategy.run)(&document) {
            debug!(method = %strategy.method, chars = text.chars().count(), "Extraction accepted");
            return Extraction::new(text, strategy.method);
        }
    }
    debug!("No extraction strategy produced enough text");
    Extraction::empty()
}

/// Elements whose text never counts as article content.
pub(crate) const INVISIBLE_TAGS: &[&str] = &["script", "style", "noscript", "template", "svg"];

/// Text under `el`, skipping script-like subtrees, with a space between nodes.
/// Not whitespace-normalized.
pub(crate) fn visible_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    push_visible_text(el, &mut out);
    out
}

fn push_visible_text(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(t) => {
                out.push_str(t);
                out.push(' ');
            }
            Node::Element(e) => {
                if INVISIBLE_TAGS.contains(&e.name()) {
                    continue;
                }
                if let Some(child_el) = ElementRef::wrap(child) {
                    push_visible_text(child_el, out);
                }
            }
            _ => {}
        }
    }
}

/// Whitespace-normalized visible text.
pub(crate) fn clean_text(el: ElementRef<'_>) -> String {
    collapse_whitespace(&visible_text(el))
}

/// `class` and `id` attributes joined, for pattern matching.
pub(crate) fn class_and_id(el: ElementRef<'_>) -> String {
    let v = el.value();
    format!(
        "{} {}",
        v.attr("class").unwrap_or_default(),
        v.attr("id").unwrap_or_default()
    )
}

/// Share of `el`'s text that sits inside links.
pub(crate) fn link_density(el: ElementRef<'_>, text_chars: usize) -> f64 {
    if text_chars == 0 {
        return 0.0;
    }
    let link_chars: usize = el
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|e| e.value().name() == "a")
        .map(|a| clean_text(a).chars().count())
        .sum();
    link_chars as f64 / text_chars as f64
}

/// Accept `text` when it has strictly more than `min` characters.
pub(crate) fn longer_than(text: String, min: usize) -> Option<String> {
    (text.chars().count() > min).then_some(text)
}
