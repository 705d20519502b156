//! Boilerplate-removal extraction.
//!
//! Picks the most content-like container on the page by text density, then
//! keeps the paragraph-level blocks inside it that are not navigation, page
//! chrome, or link lists.

use super::{GENERAL_MIN_CHARS, class_and_id, clean_text, link_density};
use crate::utils::collapse_whitespace;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

/// Matched against one whole `class`/`id` token. A chrome word may carry a
/// site-section prefix (`site-header`) or a suffix (`share-tools`), but a
/// state modifier such as `has-sidebar` is not chrome.
static BOILERPLATE_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^((site|page|global|top|bottom|article|post|entry|story)[-_])?(nav|navbar|navigation|menu|footer|header|masthead|sidebar|breadcrumbs?|comments?|share|sharing|social|related|recommended|promo|advert|ads?|sponsored|banner|cookie|newsletter|signup|popup|modal|widget|tags|toolbar)([-_][a-z0-9_-]*)?$",
    )
    .unwrap()
});

/// Tags whose whole subtree is page chrome.
const BOILERPLATE_TAGS: &[&str] = &[
    "nav", "header", "footer", "aside", "form", "button", "select", "iframe", "figure",
];

/// Paragraph-level blocks that carry article text.
const TEXT_BLOCKS: &[&str] = &[
    "p", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote", "pre", "li",
];

const CONTAINER_TAGS: &[&str] = &["article", "main", "section", "div"];

static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("body").unwrap());
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());
static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a").unwrap());

/// Containers scoring below this fall back to `<body>`.
const MIN_CONTAINER_SCORE: i64 = 1000;
/// A chosen container must hold at least this share of the body text.
const MIN_COVERAGE: f64 = 0.3;

/// Keep the prose blocks of the main content container.
///
/// # Arguments
/// * `document` - The parsed page.
///
/// # Returns
/// * `Some(text)` when the kept blocks hold at least 200 characters after
///   whitespace collapsing, otherwise `None`.
pub fn extract(document: &Html) -> Option<String> {
    let body = document.select(&BODY).next()?;
    let root = main_container(document, body).unwrap_or(body);

    let mut parts = Vec::new();
    for el in root.descendants().filter_map(ElementRef::wrap) {
        if !TEXT_BLOCKS.contains(&el.value().name()) {
            continue;
        }
        if nested_in_block(el, root) || in_boilerplate(el, root) {
            continue;
        }
        let text = clean_text(el);
        let chars = text.chars().count();
        if chars == 0 || link_density(el, chars) > 0.5 {
            continue;
        }
        parts.push(text);
    }

    let text = collapse_whitespace(&parts.join(" "));
    (text.chars().count() >= GENERAL_MIN_CHARS).then_some(text)
}

fn is_boilerplate_element(el: ElementRef<'_>) -> bool {
    BOILERPLATE_TAGS.contains(&el.value().name())
        || class_and_id(el)
            .split_whitespace()
            .any(|token| BOILERPLATE_TOKEN.is_match(token))
}

/// True when a chrome tag (`nav`, `aside`, ...) encloses `el` below `body`.
/// Class names above a candidate container are not consulted: theme wrappers
/// routinely carry layout classes such as `has-sidebar`.
fn under_chrome_tag(el: ElementRef<'_>, body: ElementRef<'_>) -> bool {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .take_while(|a| a.id() != body.id())
        .any(|a| BOILERPLATE_TAGS.contains(&a.value().name()))
}

/// True when `el` or any ancestor below `root` is page chrome.
fn in_boilerplate(el: ElementRef<'_>, root: ElementRef<'_>) -> bool {
    if is_boilerplate_element(el) {
        return true;
    }
    for ancestor in el.ancestors().filter_map(ElementRef::wrap) {
        if ancestor.id() == root.id() {
            return false;
        }
        if is_boilerplate_element(ancestor) {
            return true;
        }
    }
    false
}

/// True when an enclosing text block already covers `el`.
fn nested_in_block(el: ElementRef<'_>, root: ElementRef<'_>) -> bool {
    for ancestor in el.ancestors().filter_map(ElementRef::wrap) {
        if ancestor.id() == root.id() {
            return false;
        }
        if TEXT_BLOCKS.contains(&ancestor.value().name()) {
            return true;
        }
    }
    false
}

fn main_container<'a>(document: &'a Html, body: ElementRef<'a>) -> Option<ElementRef<'a>> {
    let body_chars = clean_text(body).chars().count();
    if body_chars == 0 {
        return None;
    }

    let mut best: Option<(i64, ElementRef<'a>)> = None;
    for el in document.root_element().descendants().filter_map(ElementRef::wrap) {
        if !CONTAINER_TAGS.contains(&el.value().name())
            || is_boilerplate_element(el)
            || under_chrome_tag(el, body)
        {
            continue;
        }
        let score = score_container(el, body);
        // Strictly greater keeps the first container on ties.
        if best.map_or(true, |(s, _)| score > s) {
            best = Some((score, el));
        }
    }

    let (score, el) = best?;
    if score < MIN_CONTAINER_SCORE {
        return None;
    }
    let coverage = clean_text(el).chars().count() as f64 / body_chars as f64;
    (coverage >= MIN_COVERAGE).then_some(el)
}

fn score_container(el: ElementRef<'_>, body: ElementRef<'_>) -> i64 {
    let text = clean_text(el);
    let chars = text.chars().count() as i64;
    if chars == 0 {
        return 0;
    }

    let mut p_count = 0i64;
    let mut substantive_p = 0i64;
    for p in el.select(&PARAGRAPH) {
        p_count += 1;
        if clean_text(p).chars().count() >= 100 {
            substantive_p += 1;
        }
    }
    let a_count = el.select(&LINK).count() as i64;

    let mut depth = 0i64;
    for ancestor in el.ancestors().filter_map(ElementRef::wrap) {
        if ancestor.id() == body.id() {
            break;
        }
        depth += 1;
    }

    let mut score = chars.min(8000) + p_count * 200 + substantive_p * 300 - a_count * 50 + depth * 10;
    if link_density(el, chars as usize) > 0.5 {
        score /= 2;
    }
    score
}
