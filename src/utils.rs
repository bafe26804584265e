//! Utility functions for HTML processing and shared helpers

use crate::errors::Ao3ApiError;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;

/// Creates a selector from provided string
///
/// Internal utility function for parsing CSS selectors.
#[inline(always)]
pub(crate) fn make_selector(
    selector: &str,
) -> Result<Selector, scraper::error::SelectorErrorKind<'_>> {
    Selector::parse(selector)
}

/// Macro to create a static LazyLock
#[macro_export]
macro_rules! make_static {
    ($expr:expr) => {{ std::sync::LazyLock::new(|| $expr) }};
}

/// Macro to select raw text from HTML document
#[macro_export]
macro_rules! select_raw_text {
    ($document:expr, $selector:expr) => {
        $document
            .select($selector)
            .map(|elem| elem.text().collect::<String>().trim().to_string())
    };
}

/// Macro to select text from HTML document, returning every match in a Vec
#[macro_export]
macro_rules! select_text {
    ($document:expr, $selector:expr) => {{
        $crate::select_raw_text!($document, $selector)
            .filter(|s: &String| !s.is_empty())
            .collect::<Vec<String>>()
    }};
}

#[macro_export]
macro_rules! define_selector {
    ($name:ident, $name_text:ident, $text:expr) => {
        static $name_text: &str = $text;

        static $name: std::sync::LazyLock<Option<scraper::Selector>> =
            $crate::make_static!($crate::utils::make_selector($text).ok());
    };
}

#[macro_export]
macro_rules! define_regex {
    ($name:ident, $name_text:ident, $text:expr) => {
        static $name_text: &str = $text;

        static $name: std::sync::LazyLock<Option<regex::Regex>> =
            $crate::make_static!(regex::Regex::new($text).ok());
    };
}

/// Borrow a selector declared with [`define_selector!`].
pub(crate) fn safe_static_selector<'a>(
    selector: &'a LazyLock<Option<Selector>>,
    text: &str,
) -> Result<&'a Selector, Ao3ApiError> {
    selector
        .as_ref()
        .ok_or_else(|| Ao3ApiError::SelectorError(format!("Failed to create CSS selector {text}")))
}

/// Borrow a regex declared with [`define_regex!`].
pub(crate) fn safe_static_regex<'a>(
    regex: &'a LazyLock<Option<Regex>>,
    text: &str,
) -> Result<&'a Regex, Ao3ApiError> {
    regex
        .as_ref()
        .ok_or_else(|| Ao3ApiError::RegexError(format!("Failed to compile regex {text}")))
}

define_selector!(
    PAGINATION_ITEM_SELECTOR,
    PAGINATION_ITEM_SELECTOR_TEXT,
    "ol.pagination li"
);

/// Parses counters such as `"12,345"`. Anything non-numeric yields `None`.
pub(crate) fn parse_count(text: &str) -> Option<u64> {
    let cleaned: String = text.trim().chars().filter(|c| *c != ',').collect();
    cleaned.parse::<u64>().ok()
}

/// Extracts the numeric id following `segment` in a URL path.
///
/// `id_from_url("/works/123/chapters/456", "chapters")` is `Some(456)`.
pub fn id_from_url(url: &str, segment: &str) -> Option<u64> {
    let mut parts = url.split('/');
    parts.find(|part| *part == segment)?;
    let raw = parts.next()?;
    let raw = raw.split(['?', '#']).next()?;
    raw.parse::<u64>().ok().filter(|id| *id > 0)
}

/// Highest page number shown in a pagination bar; 1 if the page has none.
pub(crate) fn page_count(document: &Html) -> Result<u32, Ao3ApiError> {
    let selector = safe_static_selector(&PAGINATION_ITEM_SELECTOR, PAGINATION_ITEM_SELECTOR_TEXT)?;
    Ok(document
        .select(selector)
        .filter_map(|li| li.text().collect::<String>().trim().parse::<u32>().ok())
        .max()
        .unwrap_or(1))
}

/// Collapses all whitespace runs into single spaces.
pub(crate) fn squash_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text of an element with its whitespace squashed.
pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    squash_whitespace(&element.text().collect::<String>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_come_from_the_named_segment() {
        assert_eq!(id_from_url("/works/123456", "works"), Some(123456));
        assert_eq!(
            id_from_url("https://archiveofourown.org/works/42/chapters/7?view_adult=true", "chapters"),
            Some(7)
        );
        assert_eq!(id_from_url("/works/99#comments", "works"), Some(99));
        assert_eq!(id_from_url("/series/12", "works"), None);
        assert_eq!(id_from_url("/works/new", "works"), None);
        assert_eq!(id_from_url("/works/0", "works"), None);
    }

    #[test]
    fn counts_ignore_thousands_separators() {
        assert_eq!(parse_count(" 12,345 "), Some(12345));
        assert_eq!(parse_count("?"), None);
    }

    #[test]
    fn pagination_picks_the_last_number() {
        let doc = Html::parse_document(
            r#"<ol class="pagination actions"><li>Previous</li><li>1</li><li>2</li><li>17</li><li>Next</li></ol>"#,
        );
        assert_eq!(page_count(&doc).unwrap(), 17);
        let empty = Html::parse_document("<p>nothing</p>");
        assert_eq!(page_count(&empty).unwrap(), 1);
    }
}
