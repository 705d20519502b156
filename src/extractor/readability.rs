//! Reader-mode extraction through the `readability` crate.

use super::{FALLBACK_MIN_CHARS, longer_than};
use crate::utils::collapse_whitespace;
use once_cell::sync::Lazy;
use scraper::Html;
use std::io::Cursor;
use tracing::debug;
use url::Url;

/// Base for resolving relative links inside the extracted markup. Only the
/// text is kept, so the host never matters.
static BASE_URL: Lazy<Url> = Lazy::new(|| Url::parse("http://localhost/").unwrap());

/// Run reader-mode scoring over a parsed page.
///
/// # Arguments
/// * `document` - The parsed page. It is serialized back to markup, which is
///   the input the reader-mode scorer expects.
///
/// # Returns
/// * `Some(text)` with whitespace collapsed when the winning node holds more
///   than 80 characters, otherwise `None`. A scorer failure is `None` too.
pub fn extract(document: &Html) -> Option<String> {
    let markup = document.html();
    let mut cursor = Cursor::new(markup.as_bytes());
    match ::readability::extractor::extract(&mut cursor, &BASE_URL) {
        Ok(product) => longer_than(collapse_whitespace(&product.text), FALLBACK_MIN_CHARS),
        Err(e) => {
            debug!(error = ?e, "Reader-mode extraction failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::prose;
    use super::*;

    fn run(body: &str) -> Option<String> {
        extract(&Html::parse_document(&format!("<html><body>{body}</body></html>")))
    }

    #[test]
    fn test_story_paragraph() {
        let body = format!(r#"<div id="story"><p>{}</p></div>"#, prose(120));
        assert_eq!(run(&body), Some(prose(120)));
    }

    #[test]
    fn test_prefers_content_over_comments() {
        let body = format!(
            r#"<div id="story"><p>{}</p><p>{}</p></div>
            <div class="comment-list"><p>{}</p></div>"#,
            prose(250),
            prose(250),
            "Great read, thanks for posting this."
        );
        let text = run(&body).unwrap();
        assert!(text.starts_with("Markets moved sharply"));
        assert!(!text.contains("Great read"));
    }

    #[test]
    fn test_short_page_declines() {
        assert_eq!(run("<p>tiny</p><p>also tiny</p>"), None);
    }

    #[test]
    fn test_empty_page_declines() {
        assert_eq!(extract(&Html::parse_document("")), None);
    }
}
