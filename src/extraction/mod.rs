//! # extraction
//!
//! Raw archive markup in, typed records out.
//!
//! This is the only part of the crate that knows what the archive's HTML
//! looks like. Everything else goes through these functions, so a change in
//! the site's markup is fixed here and nowhere else. Missing optional bits
//! become `None`/empty; missing load-bearing bits become
//! [`Ao3ApiError::Parsing`].

pub mod comment;
pub mod listing;
pub mod resource;
pub mod series;
pub mod user;
pub mod work;

use crate::define_selector;
use crate::errors::Ao3ApiError;
use crate::utils::{element_text, parse_count, safe_static_selector};
use scraper::{ElementRef, Html, Selector};

define_selector!(
    AUTH_INPUT_SELECTOR,
    AUTH_INPUT_SELECTOR_TEXT,
    r#"input[name="authenticity_token"]"#
);
define_selector!(
    CSRF_META_SELECTOR,
    CSRF_META_SELECTOR_TEXT,
    r#"meta[name="csrf-token"]"#
);
define_selector!(
    PSEUD_INPUT_SELECTOR,
    PSEUD_INPUT_SELECTOR_TEXT,
    r#"input[name="comment[pseud_id]"]"#
);
define_selector!(
    PSEUD_OPTION_SELECTOR,
    PSEUD_OPTION_SELECTOR_TEXT,
    r#"select[name="comment[pseud_id]"] option[selected]"#
);
define_selector!(
    BOOKMARK_PSEUD_SELECTOR,
    BOOKMARK_PSEUD_SELECTOR_TEXT,
    r#"input[name="bookmark[pseud_id]"], select[name="bookmark[pseud_id]"] option[selected]"#
);
define_selector!(
    NOTICE_SELECTOR,
    NOTICE_SELECTOR_TEXT,
    "p.notice, div.notice, div.flash.error, div.flash.notice"
);
define_selector!(PARAGRAPH_SELECTOR, PARAGRAPH_SELECTOR_TEXT, "p");
define_selector!(
    NOT_FOUND_SELECTOR,
    NOT_FOUND_SELECTOR_TEXT,
    "h2.heading"
);

/// First element under `root` matching `selector`.
pub(crate) fn first<'a>(root: ElementRef<'a>, selector: &Selector) -> Option<ElementRef<'a>> {
    root.select(selector).next()
}

/// Whitespace-squashed text of the first match, if it is not empty.
pub(crate) fn first_text(root: ElementRef<'_>, selector: &Selector) -> Option<String> {
    first(root, selector)
        .map(element_text)
        .filter(|s| !s.is_empty())
}

/// Whitespace-squashed text of every non-empty match, in document order.
pub(crate) fn all_text(root: ElementRef<'_>, selector: &Selector) -> Vec<String> {
    root.select(selector)
        .map(element_text)
        .filter(|s| !s.is_empty())
        .collect()
}

pub(crate) fn first_count(root: ElementRef<'_>, selector: &Selector) -> Option<u64> {
    first_text(root, selector).and_then(|s| parse_count(&s))
}

/// Text of a prose block, one paragraph per line.
pub(crate) fn block_text(element: ElementRef<'_>) -> Result<String, Ao3ApiError> {
    let paragraph = safe_static_selector(&PARAGRAPH_SELECTOR, PARAGRAPH_SELECTOR_TEXT)?;
    let paragraphs: Vec<String> = element
        .select(paragraph)
        .map(|p| p.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if paragraphs.is_empty() {
        Ok(element_text(element))
    } else {
        Ok(paragraphs.join("\n"))
    }
}

/// `(label, value)` pairs of a `<dl>`; labels lowercased without their colon.
pub(crate) fn definition_pairs(dl: ElementRef<'_>) -> Vec<(String, ElementRef<'_>)> {
    let mut pairs = Vec::new();
    let mut label: Option<String> = None;
    for child in dl.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "dt" => {
                label = Some(
                    element_text(child)
                        .trim_end_matches(':')
                        .trim()
                        .to_lowercase(),
                )
            }
            "dd" => {
                if let Some(label) = label.take() {
                    pairs.push((label, child));
                }
            }
            _ => {}
        }
    }
    pairs
}

/// `"3/5"` → `(Some(3), Some(5))`; `"3/?"` → `(Some(3), None)`.
pub(crate) fn split_chapter_count(text: &str) -> (Option<u32>, Option<u32>) {
    let mut parts = text.split('/');
    let done = parts
        .next()
        .and_then(|s| parse_count(s))
        .and_then(|n| u32::try_from(n).ok());
    let expected = parts
        .next()
        .and_then(|s| parse_count(s))
        .and_then(|n| u32::try_from(n).ok());
    (done, expected)
}

/// The authenticity token embedded in a page, from a form field or the csrf meta tag.
pub fn extract_auth_token(body: &str) -> Result<Option<String>, Ao3ApiError> {
    let document = Html::parse_document(body);
    let root = document.root_element();
    let input = safe_static_selector(&AUTH_INPUT_SELECTOR, AUTH_INPUT_SELECTOR_TEXT)?;
    if let Some(value) = first(root, input).and_then(|e| e.value().attr("value")) {
        return Ok(Some(value.to_string()));
    }
    let meta = safe_static_selector(&CSRF_META_SELECTOR, CSRF_META_SELECTOR_TEXT)?;
    Ok(first(root, meta)
        .and_then(|e| e.value().attr("content"))
        .map(str::to_string))
}

pub(crate) fn csrf_token(root: ElementRef<'_>) -> Result<Option<String>, Ao3ApiError> {
    let meta = safe_static_selector(&CSRF_META_SELECTOR, CSRF_META_SELECTOR_TEXT)?;
    Ok(first(root, meta)
        .and_then(|e| e.value().attr("content"))
        .map(str::to_string))
}

/// The pseud a logged-in user comments under on this page.
pub fn extract_comment_pseud(body: &str) -> Result<Option<String>, Ao3ApiError> {
    let document = Html::parse_document(body);
    let root = document.root_element();
    let input = safe_static_selector(&PSEUD_INPUT_SELECTOR, PSEUD_INPUT_SELECTOR_TEXT)?;
    if let Some(value) = first(root, input).and_then(|e| e.value().attr("value")) {
        return Ok(Some(value.to_string()));
    }
    let option = safe_static_selector(&PSEUD_OPTION_SELECTOR, PSEUD_OPTION_SELECTOR_TEXT)?;
    Ok(first(root, option)
        .and_then(|e| e.value().attr("value"))
        .map(str::to_string))
}

/// The pseud the bookmark form on a work page would use.
pub fn extract_bookmark_pseud(body: &str) -> Result<Option<String>, Ao3ApiError> {
    let document = Html::parse_document(body);
    let selector = safe_static_selector(&BOOKMARK_PSEUD_SELECTOR, BOOKMARK_PSEUD_SELECTOR_TEXT)?;
    Ok(first(document.root_element(), selector)
        .and_then(|e| e.value().attr("value"))
        .map(str::to_string))
}

/// True when one of the archive's notice boxes says the page is for
/// registered users only. Body text quoting the phrase does not count.
pub fn is_restricted_notice(body: &str, marker: &str) -> Result<bool, Ao3ApiError> {
    if !body.contains(marker) {
        return Ok(false);
    }
    let document = Html::parse_document(body);
    let notice = safe_static_selector(&NOTICE_SELECTOR, NOTICE_SELECTOR_TEXT)?;
    Ok(document
        .select(notice)
        .any(|e| element_text(e).contains(marker)))
}

/// True for the archive's "Error 404" page served with a success status.
pub(crate) fn is_not_found_page(root: ElementRef<'_>) -> Result<bool, Ao3ApiError> {
    let heading = safe_static_selector(&NOT_FOUND_SELECTOR, NOT_FOUND_SELECTOR_TEXT)?;
    Ok(first_text(root, heading).is_some_and(|t| t.contains("Error 404")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restriction_comes_from_notice_boxes_only() {
        let marker = "only available to registered users";
        let notice = r#"<div id="main"><p class="notice">This work is only available to registered users of the Archive.</p></div>"#;
        assert!(is_restricted_notice(notice, marker).unwrap());
        let quoted = r#"<div id="chapters"><div class="userstuff"><p>The door was only available to registered users.</p></div></div>"#;
        assert!(!is_restricted_notice(quoted, marker).unwrap());
    }

    #[test]
    fn token_prefers_the_form_field() {
        let page = r#"<html><head><meta name="csrf-token" content="meta-token"></head>
            <body><form><input name="authenticity_token" value="form-token"></form></body></html>"#;
        assert_eq!(extract_auth_token(page).unwrap().as_deref(), Some("form-token"));
        let meta_only = r#"<html><head><meta name="csrf-token" content="meta-token"></head></html>"#;
        assert_eq!(extract_auth_token(meta_only).unwrap().as_deref(), Some("meta-token"));
        assert_eq!(extract_auth_token("<p>none</p>").unwrap(), None);
    }

    #[test]
    fn pseud_comes_from_input_or_selected_option() {
        let input = r#"<input name="comment[pseud_id]" value="77">"#;
        assert_eq!(extract_comment_pseud(input).unwrap().as_deref(), Some("77"));
        let select = r#"<select name="comment[pseud_id]"><option value="1">a</option><option value="2" selected="selected">b</option></select>"#;
        assert_eq!(extract_comment_pseud(select).unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn chapter_counts_split_on_slash() {
        assert_eq!(split_chapter_count("3/5"), (Some(3), Some(5)));
        assert_eq!(split_chapter_count("12/?"), (Some(12), None));
        assert_eq!(split_chapter_count("1,024/1,024"), (Some(1024), Some(1024)));
    }
}
