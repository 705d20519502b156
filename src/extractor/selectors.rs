//! Known article-body containers.
//!
//! Each idiom is tried in order and only its first match on the page is
//! considered; a short first match moves on to the next idiom.

use super::{FALLBACK_MIN_CHARS, clean_text, longer_than};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

static BODY_CLASS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(caas-body|article-body|story-content)").unwrap());

static DIV_WITH_CLASS: Lazy<Selector> = Lazy::new(|| Selector::parse("div[class]").unwrap());
static ARTICLE: Lazy<Selector> = Lazy::new(|| Selector::parse("article").unwrap());
static ITEMPROP_BODY: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"div[itemprop="articleBody"]"#).unwrap());

pub fn extract(document: &Html) -> Option<String> {
    let candidates = [
        document
            .select(&DIV_WITH_CLASS)
            .find(|el| el.value().attr("class").is_some_and(|c| BODY_CLASS.is_match(c))),
        document.select(&ARTICLE).next(),
        document.select(&ITEMPROP_BODY).next(),
    ];
    candidates
        .into_iter()
        .flatten()
        .find_map(|el: ElementRef<'_>| longer_than(clean_text(el), FALLBACK_MIN_CHARS))
}
