//! Canonical chapter-number extraction.
//!
//! Titles carry noise ("SIDE 1", "END", season labels), so the URL is the
//! normative signal: a trailing `chapter-<n>` or `chapter/<n>` path segment
//! wins. A non-negative source weight is the second choice; the first
//! numeric run in the title is the last resort.

use crate::clients::SourceChapter;
use regex::Regex;
use std::sync::OnceLock;

fn chapter_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\bchapter\b[/-](\d+(?:[.-]\d+)?)/?$").unwrap_or_else(|e| {
            unreachable!("chapter URL pattern is a valid literal regex: {}", e)
        })
    })
}

fn number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\d+(?:\.\d+)?")
            .unwrap_or_else(|e| unreachable!("number pattern is a valid literal regex: {}", e))
    })
}

/// Resolve the canonical chapter number for a discovered chapter item.
///
/// Priority order: trailing numeric segment of the URL path, then an
/// explicit non-negative weight, then the first numeric run in the title.
/// Returns `None` when no signal yields a number.
pub fn extract_chapter_number(chapter: &SourceChapter) -> Option<f64> {
    if let Some(number) = number_from_url(&chapter.url) {
        return Some(number);
    }

    if let Some(weight) = chapter.weight
        && weight >= 0
    {
        return Some(weight as f64);
    }

    number_from_title(&chapter.title)
}

/// Trailing `chapter-<n>` / `chapter/<n>` segment of the URL path.
///
/// Fractional chapters appear both as `chapter-36.5` and `chapter-36-5`;
/// the dash form is normalized to a decimal point.
fn number_from_url(url: &str) -> Option<f64> {
    // Anchor against the path only; queries and fragments are noise
    let path = url.split(['?', '#']).next().unwrap_or(url);

    let captures = chapter_url_pattern().captures(path)?;
    let raw = captures.get(1)?.as_str().replace('-', ".");
    raw.parse().ok()
}

/// First numeric run in the title
fn number_from_title(title: &str) -> Option<f64> {
    number_pattern()
        .find(title)
        .and_then(|m| m.as_str().parse().ok())
}
