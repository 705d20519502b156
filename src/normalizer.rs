//! Record normalization: canonical timestamps and language identification.
//!
//! [`normalize`] never fails. An unparseable `published_at` becomes `None`,
//! and so does `language` when there is no text to classify. Running it
//! twice gives the same record as running it once.

use crate::models::Document;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use whatlang::Lang;

/// Characters of title + description + text fed to language detection.
pub const LANGUAGE_BLOB_CHARS: usize = 1000;

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%z",
    "%Y-%m-%d %H:%M:%S %z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y%m%d%H%M%S",
    "%Y%m%dT%H%M%SZ",
];

/// Normalize a record in place and hand it back.
pub fn normalize(mut doc: Document) -> Document {
    doc.published_at = doc
        .published_at
        .as_deref()
        .and_then(parse_timestamp)
        .map(format_timestamp);

    let blob = language_blob(&doc);
    doc.language = if blob.trim().is_empty() {
        None
    } else {
        detect_language(&blob)
    };
    doc
}

/// Parse the timestamp shapes seen in feeds and APIs. Values without an
/// offset are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// ISO-8601 with an explicit `+00:00` offset; sub-second digits only when present.
pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, false)
}

fn language_blob(doc: &Document) -> String {
    [
        doc.title.as_deref().unwrap_or_default(),
        doc.description.as_deref().unwrap_or_default(),
        doc.text.as_deref().unwrap_or_default(),
    ]
    .join(" ")
    .chars()
    .take(LANGUAGE_BLOB_CHARS)
    .collect()
}

/// Best-effort ISO 639-1 code, falling back to the ISO 639-3 code for
/// languages without a two-letter form in the table below.
pub fn detect_language(text: &str) -> Option<String> {
    whatlang::detect(text).map(|info| iso_code(info.lang()))
}

/// Map an English language name as reported by news APIs (`"English"`,
/// `"german"`) to the same codes [`detect_language`] emits. Two-letter codes
/// pass through lowercased; anything unrecognised is `None`.
pub fn language_from_name(name: &str) -> Option<String> {
    let name = name.trim();
    if name.len() == 2 && name.chars().all(|c| c.is_ascii_alphabetic()) {
        return Some(name.to_ascii_lowercase());
    }
    Lang::all()
        .iter()
        .find(|lang| lang.eng_name().eq_ignore_ascii_case(name))
        .map(|lang| iso_code(*lang))
}

fn iso_code(lang: Lang) -> String {
    let short = match lang.code() {
        "eng" => "en",
        "spa" => "es",
        "fra" => "fr",
        "deu" => "de",
        "ita" => "it",
        "por" => "pt",
        "rus" => "ru",
        "jpn" => "ja",
        "kor" => "ko",
        "cmn" => "zh",
        "ara" => "ar",
        "nld" => "nl",
        "tur" => "tr",
        "pol" => "pl",
        "swe" => "sv",
        "ukr" => "uk",
        "hin" => "hi",
        "vie" => "vi",
        "ind" => "id",
        "heb" => "he",
        "ell" => "el",
        "ces" => "cs",
        "dan" => "da",
        "fin" => "fi",
        "nob" => "nb",
        "ron" => "ro",
        "hun" => "hu",
        "tha" => "th",
        other => other,
    };
    short.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(title: Option<&str>, published_at: Option<&str>) -> Document {
        Document {
            url: "https://x.test/a".to_string(),
            title: title.map(str::to_string),
            published_at: published_at.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_timestamp_shapes() {
        let cases = [
            ("2024-03-05T14:30:00Z", "2024-03-05T14:30:00+00:00"),
            ("2024-03-05T16:30:00+02:00", "2024-03-05T14:30:00+00:00"),
            ("Tue, 05 Mar 2024 14:30:00 GMT", "2024-03-05T14:30:00+00:00"),
            ("Tue, 05 Mar 2024 09:30:00 -0500", "2024-03-05T14:30:00+00:00"),
            ("2024-03-05 14:30:00", "2024-03-05T14:30:00+00:00"),
            ("20240305143000", "2024-03-05T14:30:00+00:00"),
            ("2024-03-05", "2024-03-05T00:00:00+00:00"),
            ("2024-03-05T14:30:00.250Z", "2024-03-05T14:30:00.250+00:00"),
        ];
        for (raw, want) in cases {
            let got = parse_timestamp(raw).map(format_timestamp);
            assert_eq!(got.as_deref(), Some(want), "input {raw}");
        }
    }

    #[test]
    fn test_unparseable_timestamp_becomes_none() {
        let out = normalize(doc(Some("Title"), Some("yesterday-ish")));
        assert_eq!(out.published_at, None);
        let out = normalize(doc(Some("Title"), Some("   ")));
        assert_eq!(out.published_at, None);
    }

    #[test]
    fn test_language_detected_for_english() {
        let mut d = doc(Some("Central bank raises interest rates again"), None);
        d.text = Some(
            "The central bank raised its benchmark interest rate on Wednesday, \
             saying inflation remained too high and that further increases could follow."
                .to_string(),
        );
        assert_eq!(normalize(d).language.as_deref(), Some("en"));
    }

    #[test]
    fn test_empty_blob_clears_language() {
        let mut d = doc(None, None);
        d.language = Some("English".to_string());
        d.text = Some("   ".to_string());
        assert_eq!(normalize(d).language, None);
    }

    #[test]
    fn test_language_blob_is_capped() {
        let mut d = doc(Some("T"), None);
        d.text = Some("x".repeat(5000));
        assert_eq!(language_blob(&d).chars().count(), LANGUAGE_BLOB_CHARS);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let mut rich = doc(
            Some("Les marchés européens reculent"),
            Some("Tue, 05 Mar 2024 09:30:00 -0500"),
        );
        rich.text = Some(
            "Les marchés européens ont reculé mardi, les investisseurs attendant \
             la décision de la banque centrale sur les taux d'intérêt."
                .to_string(),
        );
        let records = vec![
            rich,
            doc(Some("Only a title here"), Some("2024-03-05T14:30:00.250Z")),
            doc(None, Some("garbage")),
            doc(None, None),
        ];
        for r in records {
            let once = normalize(r);
            let twice = normalize(once.clone());
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_language_from_name() {
        assert_eq!(language_from_name("English").as_deref(), Some("en"));
        assert_eq!(language_from_name("german").as_deref(), Some("de"));
        assert_eq!(language_from_name(" EN ").as_deref(), Some("en"));
        assert_eq!(language_from_name("Klingon"), None);
        assert_eq!(language_from_name(""), None);
    }
}
