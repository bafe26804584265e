//! Work blurbs, the list entries shared by search results, bookmarks,
//! user work pages and series pages.

use super::{all_text, block_text, first, first_count, first_text, split_chapter_count};
use crate::errors::Ao3ApiError;
use crate::extraction::work::series_refs;
use crate::types::{Subscription, WorkSummary};
use crate::utils::{element_text, id_from_url, safe_static_regex, safe_static_selector};
use crate::{define_regex, define_selector, select_text};
use log::debug;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use scraper::{ElementRef, Html};

define_selector!(BLURB_SELECTOR, BLURB_SELECTOR_TEXT, r#"li.blurb[role="article"]"#);
define_selector!(HEADING_SELECTOR, HEADING_SELECTOR_TEXT, "h4.heading");
define_selector!(LINK_SELECTOR, LINK_SELECTOR_TEXT, "a");
define_selector!(AUTHOR_SELECTOR, AUTHOR_SELECTOR_TEXT, r#"a[rel="author"]"#);
define_selector!(FANDOM_SELECTOR, FANDOM_SELECTOR_TEXT, "h5.fandoms.heading a.tag");
define_selector!(RATING_SELECTOR, RATING_SELECTOR_TEXT, "ul.required-tags span.rating");
define_selector!(
    CATEGORY_SELECTOR,
    CATEGORY_SELECTOR_TEXT,
    "ul.required-tags span.category"
);
define_selector!(
    COMPLETE_SELECTOR,
    COMPLETE_SELECTOR_TEXT,
    "ul.required-tags span.iswip"
);
define_selector!(WARNING_SELECTOR, WARNING_SELECTOR_TEXT, "ul.tags li.warnings a.tag");
define_selector!(
    RELATIONSHIP_SELECTOR,
    RELATIONSHIP_SELECTOR_TEXT,
    "ul.tags li.relationships a.tag"
);
define_selector!(
    CHARACTER_SELECTOR,
    CHARACTER_SELECTOR_TEXT,
    "ul.tags li.characters a.tag"
);
define_selector!(FREEFORM_SELECTOR, FREEFORM_SELECTOR_TEXT, "ul.tags li.freeforms a.tag");
define_selector!(
    SUMMARY_SELECTOR,
    SUMMARY_SELECTOR_TEXT,
    "blockquote.userstuff.summary"
);
define_selector!(SERIES_SELECTOR, SERIES_SELECTOR_TEXT, "ul.series li");
define_selector!(DATETIME_SELECTOR, DATETIME_SELECTOR_TEXT, "p.datetime");
define_selector!(LANGUAGE_SELECTOR, LANGUAGE_SELECTOR_TEXT, "dl.stats dd.language");
define_selector!(WORDS_SELECTOR, WORDS_SELECTOR_TEXT, "dl.stats dd.words");
define_selector!(CHAPTERS_SELECTOR, CHAPTERS_SELECTOR_TEXT, "dl.stats dd.chapters");
define_selector!(COMMENTS_SELECTOR, COMMENTS_SELECTOR_TEXT, "dl.stats dd.comments");
define_selector!(KUDOS_SELECTOR, KUDOS_SELECTOR_TEXT, "dl.stats dd.kudos");
define_selector!(BOOKMARKS_SELECTOR, BOOKMARKS_SELECTOR_TEXT, "dl.stats dd.bookmarks");
define_selector!(HITS_SELECTOR, HITS_SELECTOR_TEXT, "dl.stats dd.hits");
define_selector!(
    RESTRICTED_SELECTOR,
    RESTRICTED_SELECTOR_TEXT,
    r#"img[title="Restricted"]"#
);
define_selector!(
    TOTAL_HEADING_SELECTOR,
    TOTAL_HEADING_SELECTOR_TEXT,
    "#main h3.heading, #main h2.heading"
);
define_selector!(
    RESULT_LIST_SELECTOR,
    RESULT_LIST_SELECTOR_TEXT,
    "ol.work.index.group"
);
define_selector!(
    NO_RESULTS_NOTICE_SELECTOR,
    NO_RESULTS_NOTICE_SELECTOR_TEXT,
    "#main > p, #main > h3.heading, #main > h4.heading"
);
define_selector!(
    SUBSCRIPTION_SELECTOR,
    SUBSCRIPTION_SELECTOR_TEXT,
    "dl.subscription.index.group > dt"
);
define_regex!(
    TOTAL_REGEX,
    TOTAL_REGEX_TEXT,
    r"([\d,]+)\s+(?:Found|Works?\b|Bookmarks?\b|Bookmarked Items?|Subscriptions?\b)"
);

const NO_RESULTS_MARKER: &str = "No results found";

/// Parses one work blurb (`<li class="... blurb ...">`).
///
/// Deleted and otherwise unlinked entries come back with `id == None`.
pub fn parse_blurb(item: &str) -> Result<WorkSummary, Ao3ApiError> {
    let document = Html::parse_fragment(item);
    let root = document.root_element();

    let heading = first(root, safe_static_selector(&HEADING_SELECTOR, HEADING_SELECTOR_TEXT)?);
    let link = match heading {
        Some(heading) => first(heading, safe_static_selector(&LINK_SELECTOR, LINK_SELECTOR_TEXT)?),
        None => None,
    };
    let id = link
        .and_then(|a| a.value().attr("href"))
        .and_then(|href| id_from_url(href, "works"));
    let title = link.map(element_text).unwrap_or_default();

    let summary = match first(root, safe_static_selector(&SUMMARY_SELECTOR, SUMMARY_SELECTOR_TEXT)?) {
        Some(block) => Some(block_text(block)?).filter(|s| !s.is_empty()),
        None => None,
    };

    let series = root
        .select(safe_static_selector(&SERIES_SELECTOR, SERIES_SELECTOR_TEXT)?)
        .map(series_refs)
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .flatten()
        .collect();

    let (chapters, expected_chapters) = first_text(
        root,
        safe_static_selector(&CHAPTERS_SELECTOR, CHAPTERS_SELECTOR_TEXT)?,
    )
    .map(|t| split_chapter_count(&t))
    .unwrap_or((None, None));

    let complete = first(root, safe_static_selector(&COMPLETE_SELECTOR, COMPLETE_SELECTOR_TEXT)?)
        .and_then(|span| span.value().attr("title"))
        .and_then(|title| match title {
            "Complete Work" => Some(true),
            "Work in Progress" => Some(false),
            _ => None,
        });

    // The category span lists every category in one comma-separated title.
    let categories = first(root, safe_static_selector(&CATEGORY_SELECTOR, CATEGORY_SELECTOR_TEXT)?)
        .and_then(|span| span.value().attr("title"))
        .map(|title| {
            title
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty() && *s != "No category")
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(WorkSummary {
        id,
        title,
        authors: select_text!(
            root,
            safe_static_selector(&AUTHOR_SELECTOR, AUTHOR_SELECTOR_TEXT)?
        ),
        fandoms: all_text(root, safe_static_selector(&FANDOM_SELECTOR, FANDOM_SELECTOR_TEXT)?),
        rating: first(root, safe_static_selector(&RATING_SELECTOR, RATING_SELECTOR_TEXT)?)
            .and_then(|span| span.value().attr("title"))
            .map(str::to_string),
        categories,
        warnings: all_text(root, safe_static_selector(&WARNING_SELECTOR, WARNING_SELECTOR_TEXT)?),
        relationships: all_text(
            root,
            safe_static_selector(&RELATIONSHIP_SELECTOR, RELATIONSHIP_SELECTOR_TEXT)?,
        ),
        characters: all_text(
            root,
            safe_static_selector(&CHARACTER_SELECTOR, CHARACTER_SELECTOR_TEXT)?,
        ),
        tags: all_text(root, safe_static_selector(&FREEFORM_SELECTOR, FREEFORM_SELECTOR_TEXT)?),
        summary,
        series,
        language: first_text(root, safe_static_selector(&LANGUAGE_SELECTOR, LANGUAGE_SELECTOR_TEXT)?),
        words: first_count(root, safe_static_selector(&WORDS_SELECTOR, WORDS_SELECTOR_TEXT)?),
        chapters,
        expected_chapters,
        comments: first_count(root, safe_static_selector(&COMMENTS_SELECTOR, COMMENTS_SELECTOR_TEXT)?),
        kudos: first_count(root, safe_static_selector(&KUDOS_SELECTOR, KUDOS_SELECTOR_TEXT)?),
        bookmarks: first_count(
            root,
            safe_static_selector(&BOOKMARKS_SELECTOR, BOOKMARKS_SELECTOR_TEXT)?,
        ),
        hits: first_count(root, safe_static_selector(&HITS_SELECTOR, HITS_SELECTOR_TEXT)?),
        restricted: first(
            root,
            safe_static_selector(&RESTRICTED_SELECTOR, RESTRICTED_SELECTOR_TEXT)?,
        )
        .is_some(),
        complete,
        date_updated: first_text(root, safe_static_selector(&DATETIME_SELECTOR, DATETIME_SELECTOR_TEXT)?),
    })
}

/// Series and user blurbs share the markup but are not works.
fn is_work_blurb(blurb: ElementRef<'_>) -> Result<bool, Ao3ApiError> {
    let heading = safe_static_selector(&HEADING_SELECTOR, HEADING_SELECTOR_TEXT)?;
    let link = safe_static_selector(&LINK_SELECTOR, LINK_SELECTOR_TEXT)?;
    let href = first(blurb, heading)
        .and_then(|h| first(h, link))
        .and_then(|a| a.value().attr("href"));
    Ok(match href {
        Some(href) => !(href.starts_with("/series/") || href.starts_with("/users/")),
        None => true,
    })
}

/// Every work blurb on a listing page, in display order.
///
/// Blurbs are parsed on the rayon pool; the order of the page is kept.
pub fn parse_listing(body: &str) -> Result<Vec<WorkSummary>, Ao3ApiError> {
    let document = Html::parse_document(body);
    let blurb = safe_static_selector(&BLURB_SELECTOR, BLURB_SELECTOR_TEXT)?;
    let mut items = Vec::new();
    for li in document.select(blurb) {
        if is_work_blurb(li)? {
            items.push(li.html());
        }
    }
    debug!("parsing {} blurbs", items.len());
    items
        .into_par_iter()
        .map(|item| parse_blurb(&item))
        .collect()
}

/// True for an empty search result page: no result list, and the
/// archive's "No results found" notice in its place.
pub fn is_empty_result(body: &str) -> Result<bool, Ao3ApiError> {
    empty_result(&Html::parse_document(body))
}

fn empty_result(document: &Html) -> Result<bool, Ao3ApiError> {
    let list = safe_static_selector(&RESULT_LIST_SELECTOR, RESULT_LIST_SELECTOR_TEXT)?;
    if document.select(list).next().is_some() {
        return Ok(false);
    }
    let notice = safe_static_selector(&NO_RESULTS_NOTICE_SELECTOR, NO_RESULTS_NOTICE_SELECTOR_TEXT)?;
    Ok(document
        .select(notice)
        .any(|e| element_text(e).starts_with(NO_RESULTS_MARKER)))
}

fn heading_total(document: &Html) -> Result<Option<u64>, Ao3ApiError> {
    let regex = safe_static_regex(&TOTAL_REGEX, TOTAL_REGEX_TEXT)?;
    let heading = safe_static_selector(&TOTAL_HEADING_SELECTOR, TOTAL_HEADING_SELECTOR_TEXT)?;
    Ok(document.select(heading).find_map(|element| {
        regex
            .captures(&element_text(element))
            .and_then(|c| c.get(1))
            .and_then(|m| crate::utils::parse_count(m.as_str()))
    }))
}

/// Size of the whole result set as announced in the listing heading.
///
/// An empty result page counts 0. Any other page without a total in its
/// heading is a [`Ao3ApiError::Parsing`] error.
pub fn parse_total_results(body: &str) -> Result<u64, Ao3ApiError> {
    let document = Html::parse_document(body);
    if empty_result(&document)? {
        return Ok(0);
    }
    heading_total(&document)?
        .ok_or_else(|| Ao3ApiError::parsing("listing heading states no total"))
}

/// Total of a user's works or bookmarks listing. A page with neither a
/// heading total nor any blurb is an empty listing.
pub fn parse_user_listing_total(body: &str) -> Result<u64, Ao3ApiError> {
    let document = Html::parse_document(body);
    if let Some(total) = heading_total(&document)? {
        return Ok(total);
    }
    let blurb = safe_static_selector(&BLURB_SELECTOR, BLURB_SELECTOR_TEXT)?;
    if document.select(blurb).next().is_none() {
        Ok(0)
    } else {
        Err(Ao3ApiError::parsing(
            "listing has entries but no total in its heading",
        ))
    }
}

/// Entries of the subscriptions page.
pub fn parse_subscriptions(body: &str) -> Result<Vec<Subscription>, Ao3ApiError> {
    let document = Html::parse_document(body);
    let entry = safe_static_selector(&SUBSCRIPTION_SELECTOR, SUBSCRIPTION_SELECTOR_TEXT)?;
    let link = safe_static_selector(&LINK_SELECTOR, LINK_SELECTOR_TEXT)?;

    let mut subscriptions = Vec::new();
    for dt in document.select(entry) {
        let mut links = dt.select(link);
        let Some(target) = links.next() else {
            continue;
        };
        let href = target.value().attr("href").unwrap_or_default();
        let name = element_text(target);
        let authors: Vec<String> = links
            .filter(|a| a.value().attr("href").is_some_and(|h| h.starts_with("/users/")))
            .map(element_text)
            .collect();

        if href.starts_with("/works/") {
            subscriptions.push(Subscription::Work {
                id: id_from_url(href, "works"),
                title: name,
                authors,
            });
        } else if let Some(id) = id_from_url(href, "series") {
            subscriptions.push(Subscription::Series {
                id,
                name,
                authors,
            });
        } else if href.starts_with("/users/") {
            subscriptions.push(Subscription::User { username: name });
        } else {
            debug!("skipping subscription entry linking to {href}");
        }
    }
    Ok(subscriptions)
}
