// src/services/markup.rs
//! Helpers shared by the chart and table extractors.

use scraper::{ElementRef, Selector};

use crate::error::ExtractionError;

/// Zero-width and bidi control marks injected by the renderer around numbers.
const INVISIBLE_MARKS: [char; 12] = [
    '\u{200B}', '\u{200C}', '\u{200D}', '\u{200E}', '\u{200F}', '\u{202A}', '\u{202B}',
    '\u{202C}', '\u{202D}', '\u{202E}', '\u{2066}', '\u{FEFF}',
];

/// Removes invisible formatting marks (as zero-width, never as separators) and trims.
/// The Unicode minus sign is read as an ASCII hyphen.
pub fn clean_text(raw: &str) -> String {
    raw.chars()
        .filter(|c| !INVISIBLE_MARKS.contains(c) && !('\u{2067}'..='\u{2069}').contains(c))
        .map(|c| if c == '\u{2212}' { '-' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Full text content of an element, cleaned.
pub fn element_text(element: &ElementRef) -> String {
    clean_text(&element.text().collect::<String>())
}

/// Parses a rendered figure. `B` values are scaled to millions (x1000), `M` values are taken
/// as-is. Dashes and empty cells are missing, never zero.
pub fn parse_value(raw: &str) -> Option<f64> {
    let text = clean_text(raw);
    if text.is_empty() || text == "\u{2014}" || text == "-" || text == "\u{2013}" {
        return None;
    }
    let text = text.replace(',', "");
    if let Some(number) = text.strip_suffix('B') {
        return number.trim().parse::<f64>().ok().map(|v| v * 1000.0);
    }
    if let Some(number) = text.strip_suffix('M') {
        return number.trim().parse::<f64>().ok();
    }
    text.parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn selector(css: &str) -> Result<Selector, ExtractionError> {
    Selector::parse(css).map_err(|e| ExtractionError::Selector(format!("{}: {:?}", css, e)))
}

/// Class tokens of an element.
pub fn classes<'a>(element: &ElementRef<'a>) -> impl Iterator<Item = &'a str> {
    element
        .value()
        .attr("class")
        .unwrap_or("")
        .split_whitespace()
}

/// True when some class token is `prefix` followed by one or more ASCII alphanumerics.
pub fn has_class_token(element: &ElementRef, prefix: &str) -> bool {
    classes(element).any(|token| {
        token
            .strip_prefix(prefix)
            .map(|suffix| !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or(false)
    })
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    #[test]
    fn strips_directional_marks_without_splitting_digits() {
        assert_eq!(clean_text("\u{202A}1\u{200B}2.5\u{202C}"), "12.5");
        assert_eq!(clean_text("  \u{2212}0.40 "), "-0.40");
    }

    #[test]
    fn parses_magnitude_suffixes_to_millions() {
        assert_eq!(parse_value("1.5B"), Some(1500.0));
        assert_eq!(parse_value("850.2M"), Some(850.2));
        assert_eq!(parse_value("\u{202A}2.31\u{202C}"), Some(2.31));
        assert_eq!(parse_value("-0.5"), Some(-0.5));
        assert_eq!(parse_value(" 3.2 B "), Some(3200.0));
    }

    #[test]
    fn dashes_and_blanks_are_missing_not_zero() {
        assert_eq!(parse_value("\u{2014}"), None);
        assert_eq!(parse_value("-"), None);
        assert_eq!(parse_value(""), None);
        assert_eq!(parse_value("n/a"), None);
    }

    #[test]
    fn matches_hashed_class_tokens() {
        let html = Html::parse_fragment(
            r#"<div class="column-Ab12 other"></div><div class="columnWrap-x"></div>"#,
        );
        let divs = selector("div").unwrap();
        let matched: Vec<bool> = html
            .select(&divs)
            .map(|el| has_class_token(&el, "column-"))
            .collect();
        assert_eq!(matched, vec![true, false]);
    }

    #[test]
    fn rounds_to_cents() {
        assert_eq!(round2(1.23456), 1.23);
        assert_eq!(round2(-1.234), -1.23);
    }
}
