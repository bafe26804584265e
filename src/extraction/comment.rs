//! Comment threads.
//!
//! Threads are nested `<ol class="thread">` lists. A comment is an
//! `<li class="comment" id="comment_N">`; its replies sit in the *next*
//! sibling `<li>`, wrapped in another `ol.thread`. Deep threads are cut off
//! with a "more comments in this thread" link pointing at the reply's own page.

use super::{block_text, csrf_token, first, is_not_found_page};
use crate::errors::Ao3ApiError;
use crate::types::CommentRecord;
use crate::utils::{element_text, id_from_url, page_count, safe_static_regex, safe_static_selector};
use crate::{define_regex, define_selector};
use scraper::{ElementRef, Html};

define_selector!(
    PLACEHOLDER_THREAD_SELECTOR,
    PLACEHOLDER_THREAD_SELECTOR_TEXT,
    "div#comments_placeholder > ol.thread"
);
define_selector!(BYLINE_SELECTOR, BYLINE_SELECTOR_TEXT, "h4.heading.byline");
define_selector!(LINK_SELECTOR, LINK_SELECTOR_TEXT, "a");
define_selector!(TEXT_SELECTOR, TEXT_SELECTOR_TEXT, "blockquote.userstuff");
define_selector!(
    NAVIGATION_SELECTOR,
    NAVIGATION_SELECTOR_TEXT,
    r#"ul[id^="navigation_for_comment_"]"#
);
define_regex!(CHAPTER_ID_REGEX, CHAPTER_ID_REGEX_TEXT, r"chapter_id=(\d+)");

const TRUNCATION_MARKER: &str = "in this thread";
const PARENT_THREAD_LABEL: &str = "Parent Thread";

/// A comment with the part of its reply tree shown on one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadNode {
    pub record: CommentRecord,
    pub replies: Vec<ThreadNode>,
    /// The page cut this node's replies short; its own page has the rest.
    pub truncated: bool,
}

impl ThreadNode {
    fn find(self, id: u64) -> Option<ThreadNode> {
        if self.record.id == id {
            return Some(self);
        }
        self.replies.into_iter().find_map(|reply| reply.find(id))
    }
}

fn comment_id(li: ElementRef<'_>) -> Option<u64> {
    li.value()
        .attr("id")?
        .strip_prefix("comment_")?
        .parse::<u64>()
        .ok()
}

fn is_comment(li: ElementRef<'_>) -> bool {
    li.value().classes().any(|c| c == "comment") && comment_id(li).is_some()
}

fn child_elements<'a>(element: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    element.children().filter_map(ElementRef::wrap)
}

fn author(li: ElementRef<'_>) -> Result<Option<String>, Ao3ApiError> {
    let byline = match first(li, safe_static_selector(&BYLINE_SELECTOR, BYLINE_SELECTOR_TEXT)?) {
        Some(byline) => byline,
        None => return Ok(None),
    };
    let link = safe_static_selector(&LINK_SELECTOR, LINK_SELECTOR_TEXT)?;
    if let Some(user) = byline
        .select(link)
        .find(|a| a.value().attr("href").is_some_and(|h| h.starts_with("/users/")))
    {
        return Ok(Some(element_text(user)));
    }
    // Guests are plain text: "Name (Guest) on Chapter 2 ..."
    Ok(byline
        .text()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(|s| s.trim_end_matches("(Guest)").trim().to_string())
        .filter(|s| !s.is_empty()))
}

fn chapter_id(li: ElementRef<'_>) -> Result<Option<u64>, Ao3ApiError> {
    let link = safe_static_selector(&LINK_SELECTOR, LINK_SELECTOR_TEXT)?;
    let regex = safe_static_regex(&CHAPTER_ID_REGEX, CHAPTER_ID_REGEX_TEXT)?;
    let hrefs: Vec<&str> = li.select(link).filter_map(|a| a.value().attr("href")).collect();
    if let Some(id) = hrefs.iter().find_map(|href| {
        regex
            .captures(href)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u64>().ok())
    }) {
        return Ok(Some(id));
    }
    Ok(hrefs.iter().find_map(|href| id_from_url(href, "chapters")))
}

fn record(li: ElementRef<'_>, token: Option<&str>) -> Result<Option<CommentRecord>, Ao3ApiError> {
    let Some(id) = comment_id(li) else {
        return Ok(None);
    };
    let text = match first(li, safe_static_selector(&TEXT_SELECTOR, TEXT_SELECTOR_TEXT)?) {
        Some(block) => block_text(block)?,
        None => String::new(),
    };
    Ok(Some(CommentRecord {
        id,
        author: author(li)?,
        text,
        chapter_id: chapter_id(li)?,
        authenticity_token: token.map(str::to_string),
    }))
}

/// Walks the direct children of one `ol.thread`.
fn walk_thread(thread: ElementRef<'_>, token: Option<&str>) -> Result<Vec<ThreadNode>, Ao3ApiError> {
    let mut nodes: Vec<ThreadNode> = Vec::new();
    for li in child_elements(thread).filter(|e| e.value().name() == "li") {
        if is_comment(li) {
            if let Some(record) = record(li, token)? {
                nodes.push(ThreadNode {
                    record,
                    replies: Vec::new(),
                    truncated: false,
                });
            }
            continue;
        }
        let nested: Vec<ElementRef<'_>> = child_elements(li)
            .filter(|e| e.value().name() == "ol")
            .collect();
        let cut = li.text().any(|t| t.contains(TRUNCATION_MARKER));
        let Some(parent) = nodes.last_mut() else {
            continue;
        };
        for ol in nested {
            for reply in walk_thread(ol, token)? {
                parent.replies.push(reply);
            }
        }
        if cut && child_elements(li).all(|e| e.value().name() != "ol") {
            parent.truncated = true;
        }
    }
    Ok(nodes)
}

fn placeholder_threads(document: &Html) -> Result<Vec<ThreadNode>, Ao3ApiError> {
    let selector = safe_static_selector(&PLACEHOLDER_THREAD_SELECTOR, PLACEHOLDER_THREAD_SELECTOR_TEXT)?;
    let token = csrf_token(document.root_element())?;
    let mut nodes = Vec::new();
    for thread in document.select(selector) {
        nodes.extend(walk_thread(thread, token.as_deref())?);
    }
    Ok(nodes)
}

/// Top-level comments of one page of a work or chapter's comments.
///
/// Returns the page's top-level nodes (with whatever replies the page shows)
/// and the number of comment pages.
pub fn parse_comment_listing(body: &str) -> Result<(Vec<ThreadNode>, u32), Ao3ApiError> {
    let document = Html::parse_document(body);
    if is_not_found_page(document.root_element())? {
        return Err(Ao3ApiError::InvalidId("comment listing not found".to_string()));
    }
    Ok((placeholder_threads(&document)?, page_count(&document)?))
}

/// The thread rooted at comment `id`, from that comment's own page (`/comments/{id}`).
pub fn parse_thread(body: &str, id: u64) -> Result<ThreadNode, Ao3ApiError> {
    let document = Html::parse_document(body);
    if is_not_found_page(document.root_element())? {
        return Err(Ao3ApiError::InvalidId(format!("cannot find comment {id}")));
    }
    placeholder_threads(&document)?
        .into_iter()
        .find_map(|node| node.find(id))
        .ok_or_else(|| Ao3ApiError::parsing(format!("comment {id} is missing from its own page")))
}

/// Comment whose thread contains reply `id`, from the "Parent Thread" link
/// the archive shows on a reply's own page. `None` for a top-level comment.
pub fn parent_thread_id(body: &str, id: u64) -> Result<Option<u64>, Ao3ApiError> {
    let document = Html::parse_document(body);
    let navigation = safe_static_selector(&NAVIGATION_SELECTOR, NAVIGATION_SELECTOR_TEXT)?;
    let link = safe_static_selector(&LINK_SELECTOR, LINK_SELECTOR_TEXT)?;
    let wanted = format!("navigation_for_comment_{id}");
    Ok(document
        .select(navigation)
        .filter(|ul| ul.value().attr("id") == Some(wanted.as_str()))
        .flat_map(|ul| ul.select(link))
        .find(|a| element_text(*a) == PARENT_THREAD_LABEL)
        .and_then(|a| a.value().attr("href"))
        .and_then(|href| id_from_url(href, "comments")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(id: u64, author: &str, text: &str) -> String {
        format!(
            r#"<li class="comment group" id="comment_{id}" role="article">
  <h4 class="heading byline"><a href="/users/{author}/pseuds/{author}">{author}</a> on Chapter 1</h4>
  <blockquote class="userstuff"><p>{text}</p></blockquote>
  <ul class="actions"><li id="add_comment_reply_link_{id}"><a href="/comments/add_comment_reply?chapter_id=55&amp;id={id}">Reply</a></li></ul>
</li>"#
        )
    }

    #[test]
    fn nested_replies_follow_their_parent() {
        let page = format!(
            r#"<html><head><meta name="csrf-token" content="t"></head><body>
<div id="comments_placeholder"><ol class="thread">
{}<li><ol class="thread">{}<li><ol class="thread">{}</ol></li>{}</ol></li>
{}
</ol></div></body></html>"#,
            comment(1, "ann", "root"),
            comment(2, "bob", "first reply"),
            comment(3, "cat", "nested"),
            comment(4, "dan", "second reply"),
            comment(5, "eve", "another root"),
        );
        let (roots, pages) = parse_comment_listing(&page).unwrap();
        assert_eq!(pages, 1);
        assert_eq!(roots.len(), 2);
        assert_eq!(roots[0].record.author.as_deref(), Some("ann"));
        assert_eq!(roots[0].record.chapter_id, Some(55));
        assert_eq!(roots[0].record.authenticity_token.as_deref(), Some("t"));
        let replies: Vec<u64> = roots[0].replies.iter().map(|r| r.record.id).collect();
        assert_eq!(replies, vec![2, 4]);
        assert_eq!(roots[0].replies[0].replies[0].record.text, "nested");
        assert_eq!(roots[1].record.id, 5);
    }

    #[test]
    fn truncated_subtrees_are_flagged() {
        let page = format!(
            r#"<div id="comments_placeholder"><ol class="thread">
{}<li><ol class="thread">{}<li><a href="/comments/2">1 more comment in this thread</a></li></ol></li>
</ol></div>"#,
            comment(1, "ann", "root"),
            comment(2, "bob", "reply"),
        );
        let root = parse_thread(&page, 1).unwrap();
        assert!(!root.truncated);
        assert!(root.replies[0].truncated);
        assert!(root.replies[0].replies.is_empty());
    }

    #[test]
    fn replies_link_their_parent_thread() {
        let page = r#"<div id="comments_placeholder"><ol class="thread">
<li class="comment group" id="comment_12"><blockquote class="userstuff"><p>reply</p></blockquote>
<ul class="actions" id="navigation_for_comment_12">
  <li><a href="/comments/10">Parent Thread</a></li>
  <li><a href="/comments/add_comment_reply?chapter_id=55&amp;id=12">Reply</a></li>
</ul></li></ol></div>"#;
        assert_eq!(parent_thread_id(page, 12).unwrap(), Some(10));
        assert_eq!(parent_thread_id(page, 10).unwrap(), None);
    }

    #[test]
    fn guests_are_named_without_a_link() {
        let page = r#"<div id="comments_placeholder"><ol class="thread">
<li class="comment group" id="comment_9"><h4 class="heading byline">Wanderer (Guest) <span class="parent">on Chapter 2</span></h4>
<blockquote class="userstuff"><p>hi</p></blockquote></li></ol></div>"#;
        let node = parse_thread(page, 9).unwrap();
        assert_eq!(node.record.author.as_deref(), Some("Wanderer"));
        assert_eq!(node.record.text, "hi");
    }
}
