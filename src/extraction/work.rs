//! Work page extraction.

use super::{
    all_text, block_text, csrf_token, first, first_count, first_text, is_not_found_page,
    split_chapter_count,
};
use crate::errors::Ao3ApiError;
use crate::types::{Chapter, SeriesRef, WorkMetadata};
use crate::utils::{element_text, id_from_url, safe_static_regex, safe_static_selector};
use crate::{define_regex, define_selector};
use scraper::{ElementRef, Html};
use std::collections::BTreeMap;

define_selector!(TITLE_SELECTOR, TITLE_SELECTOR_TEXT, "h2.title.heading");
define_selector!(
    AUTHOR_SELECTOR,
    AUTHOR_SELECTOR_TEXT,
    r#"h3.byline.heading a[rel="author"]"#
);
define_selector!(RATING_SELECTOR, RATING_SELECTOR_TEXT, "dd.rating.tags a.tag");
define_selector!(WARNING_SELECTOR, WARNING_SELECTOR_TEXT, "dd.warning.tags a.tag");
define_selector!(CATEGORY_SELECTOR, CATEGORY_SELECTOR_TEXT, "dd.category.tags a.tag");
define_selector!(FANDOM_SELECTOR, FANDOM_SELECTOR_TEXT, "dd.fandom.tags a.tag");
define_selector!(
    RELATIONSHIP_SELECTOR,
    RELATIONSHIP_SELECTOR_TEXT,
    "dd.relationship.tags a.tag"
);
define_selector!(CHARACTER_SELECTOR, CHARACTER_SELECTOR_TEXT, "dd.character.tags a.tag");
define_selector!(FREEFORM_SELECTOR, FREEFORM_SELECTOR_TEXT, "dd.freeform.tags a.tag");
define_selector!(LANGUAGE_SELECTOR, LANGUAGE_SELECTOR_TEXT, "dd.language");
define_selector!(PUBLISHED_SELECTOR, PUBLISHED_SELECTOR_TEXT, "dl.stats dd.published");
define_selector!(STATUS_SELECTOR, STATUS_SELECTOR_TEXT, "dl.stats dd.status");
define_selector!(WORDS_SELECTOR, WORDS_SELECTOR_TEXT, "dl.stats dd.words");
define_selector!(CHAPTERS_SELECTOR, CHAPTERS_SELECTOR_TEXT, "dl.stats dd.chapters");
define_selector!(COMMENTS_SELECTOR, COMMENTS_SELECTOR_TEXT, "dl.stats dd.comments");
define_selector!(KUDOS_SELECTOR, KUDOS_SELECTOR_TEXT, "dl.stats dd.kudos");
define_selector!(BOOKMARKS_SELECTOR, BOOKMARKS_SELECTOR_TEXT, "dl.stats dd.bookmarks");
define_selector!(HITS_SELECTOR, HITS_SELECTOR_TEXT, "dl.stats dd.hits");
define_selector!(
    SUMMARY_SELECTOR,
    SUMMARY_SELECTOR_TEXT,
    "div.preface div.summary blockquote.userstuff"
);
define_selector!(
    NOTES_SELECTOR,
    NOTES_SELECTOR_TEXT,
    "div.preface div.notes blockquote.userstuff"
);
define_selector!(SERIES_SELECTOR, SERIES_SELECTOR_TEXT, "dd.series span.position");
define_selector!(LINK_SELECTOR, LINK_SELECTOR_TEXT, "a");
define_selector!(
    RESTRICTED_SELECTOR,
    RESTRICTED_SELECTOR_TEXT,
    r#"img[title="Restricted"]"#
);
define_selector!(DOWNLOAD_SELECTOR, DOWNLOAD_SELECTOR_TEXT, "li.download li a");
define_selector!(
    BOOKMARK_FORM_SELECTOR,
    BOOKMARK_FORM_SELECTOR_TEXT,
    "div#bookmark-form form"
);
define_selector!(
    SUBSCRIBE_FORM_SELECTOR,
    SUBSCRIBE_FORM_SELECTOR_TEXT,
    "li.subscribe form"
);
define_selector!(
    UNSUBSCRIBE_SELECTOR,
    UNSUBSCRIBE_SELECTOR_TEXT,
    r#"input[name="commit"][value="Unsubscribe"]"#
);
define_selector!(
    CHAPTER_DIV_SELECTOR,
    CHAPTER_DIV_SELECTOR_TEXT,
    "div#chapters > div.chapter"
);
define_selector!(ONESHOT_SELECTOR, ONESHOT_SELECTOR_TEXT, "div#chapters div.userstuff");
define_selector!(
    CHAPTER_TITLE_SELECTOR,
    CHAPTER_TITLE_SELECTOR_TEXT,
    "div.chapter.preface.group h3.title"
);
define_selector!(
    CHAPTER_TEXT_SELECTOR,
    CHAPTER_TEXT_SELECTOR_TEXT,
    r#"div.userstuff[role="article"]"#
);
define_selector!(
    CHAPTER_SUMMARY_SELECTOR,
    CHAPTER_SUMMARY_SELECTOR_TEXT,
    "div.chapter.preface.group div.summary blockquote.userstuff"
);
define_selector!(
    CHAPTER_NOTES_SELECTOR,
    CHAPTER_NOTES_SELECTOR_TEXT,
    "div.chapter.preface.group div.notes blockquote.userstuff"
);
define_regex!(PART_REGEX, PART_REGEX_TEXT, r"Part\s+(\d+)");

/// Series links inside `root`, with the part number when the text names one.
pub(crate) fn series_refs(root: ElementRef<'_>) -> Result<Vec<SeriesRef>, Ao3ApiError> {
    let link = safe_static_selector(&LINK_SELECTOR, LINK_SELECTOR_TEXT)?;
    let part_regex = safe_static_regex(&PART_REGEX, PART_REGEX_TEXT)?;
    let part = part_regex
        .captures(&element_text(root))
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok());
    Ok(root
        .select(link)
        .filter_map(|a| {
            let id = id_from_url(a.value().attr("href")?, "series")?;
            Some(SeriesRef {
                id,
                name: element_text(a),
                part,
            })
        })
        .collect())
}

/// Subscription id from a subscribe form, present only while subscribed.
pub(crate) fn subscription_id(root: ElementRef<'_>) -> Result<Option<u64>, Ao3ApiError> {
    let form_selector = safe_static_selector(&SUBSCRIBE_FORM_SELECTOR, SUBSCRIBE_FORM_SELECTOR_TEXT)?;
    let unsubscribe = safe_static_selector(&UNSUBSCRIBE_SELECTOR, UNSUBSCRIBE_SELECTOR_TEXT)?;
    Ok(first(root, form_selector)
        .filter(|form| form.select(unsubscribe).next().is_some())
        .and_then(|form| form.value().attr("action"))
        .and_then(|action| id_from_url(action, "subscriptions")))
}

/// Parses the work page (`/works/{id}?view_adult=true`).
pub fn parse_work(body: &str, id: u64) -> Result<WorkMetadata, Ao3ApiError> {
    let document = Html::parse_document(body);
    let root = document.root_element();
    if is_not_found_page(root)? {
        return Err(Ao3ApiError::InvalidId(format!("cannot find work {id}")));
    }

    let title = first_text(
        root,
        safe_static_selector(&TITLE_SELECTOR, TITLE_SELECTOR_TEXT)?,
    )
    .ok_or_else(|| Ao3ApiError::parsing(format!("work {id} has no title heading")))?;

    let (chapters, expected_chapters) = first_text(
        root,
        safe_static_selector(&CHAPTERS_SELECTOR, CHAPTERS_SELECTOR_TEXT)?,
    )
    .map(|t| split_chapter_count(&t))
    .unwrap_or((None, None));
    let chapters = chapters.unwrap_or(1);

    let series = root
        .select(safe_static_selector(&SERIES_SELECTOR, SERIES_SELECTOR_TEXT)?)
        .map(series_refs)
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .flatten()
        .collect();

    let download_links: BTreeMap<String, String> = root
        .select(safe_static_selector(&DOWNLOAD_SELECTOR, DOWNLOAD_SELECTOR_TEXT)?)
        .filter_map(|a| {
            let href = a.value().attr("href")?;
            Some((element_text(a).to_uppercase(), href.to_string()))
        })
        .collect();

    let bookmark_id = first(
        root,
        safe_static_selector(&BOOKMARK_FORM_SELECTOR, BOOKMARK_FORM_SELECTOR_TEXT)?,
    )
    .and_then(|form| form.value().attr("action"))
    .and_then(|action| id_from_url(action, "bookmarks"));

    let summary = match first(root, safe_static_selector(&SUMMARY_SELECTOR, SUMMARY_SELECTOR_TEXT)?) {
        Some(block) => Some(block_text(block)?),
        None => None,
    };
    let start_notes = match first(root, safe_static_selector(&NOTES_SELECTOR, NOTES_SELECTOR_TEXT)?) {
        Some(block) => Some(block_text(block)?),
        None => None,
    };

    Ok(WorkMetadata {
        id,
        title,
        authors: all_text(root, safe_static_selector(&AUTHOR_SELECTOR, AUTHOR_SELECTOR_TEXT)?),
        ratings: all_text(root, safe_static_selector(&RATING_SELECTOR, RATING_SELECTOR_TEXT)?),
        warnings: all_text(root, safe_static_selector(&WARNING_SELECTOR, WARNING_SELECTOR_TEXT)?),
        categories: all_text(
            root,
            safe_static_selector(&CATEGORY_SELECTOR, CATEGORY_SELECTOR_TEXT)?,
        ),
        fandoms: all_text(root, safe_static_selector(&FANDOM_SELECTOR, FANDOM_SELECTOR_TEXT)?),
        relationships: all_text(
            root,
            safe_static_selector(&RELATIONSHIP_SELECTOR, RELATIONSHIP_SELECTOR_TEXT)?,
        ),
        characters: all_text(
            root,
            safe_static_selector(&CHARACTER_SELECTOR, CHARACTER_SELECTOR_TEXT)?,
        ),
        tags: all_text(root, safe_static_selector(&FREEFORM_SELECTOR, FREEFORM_SELECTOR_TEXT)?),
        language: first_text(root, safe_static_selector(&LANGUAGE_SELECTOR, LANGUAGE_SELECTOR_TEXT)?),
        date_published: first_text(
            root,
            safe_static_selector(&PUBLISHED_SELECTOR, PUBLISHED_SELECTOR_TEXT)?,
        ),
        date_updated: first_text(root, safe_static_selector(&STATUS_SELECTOR, STATUS_SELECTOR_TEXT)?),
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
        summary,
        start_notes,
        series,
        restricted: first(
            root,
            safe_static_selector(&RESTRICTED_SELECTOR, RESTRICTED_SELECTOR_TEXT)?,
        )
        .is_some(),
        complete: expected_chapters == Some(chapters),
        authenticity_token: csrf_token(root)?,
        download_links,
        bookmark_id,
        subscription_id: subscription_id(root)?,
    })
}

fn chapter_from_div(div: ElementRef<'_>, number: u32) -> Result<Chapter, Ao3ApiError> {
    let link = safe_static_selector(&LINK_SELECTOR, LINK_SELECTOR_TEXT)?;
    let heading = first(
        div,
        safe_static_selector(&CHAPTER_TITLE_SELECTOR, CHAPTER_TITLE_SELECTOR_TEXT)?,
    );
    let id = heading
        .and_then(|h| first(h, link))
        .and_then(|a| a.value().attr("href"))
        .and_then(|href| id_from_url(href, "chapters"));
    let title = heading.map(element_text).unwrap_or_default();
    let text = match first(
        div,
        safe_static_selector(&CHAPTER_TEXT_SELECTOR, CHAPTER_TEXT_SELECTOR_TEXT)?,
    ) {
        Some(block) => block_text(block)?,
        None => String::new(),
    };
    let summary = match first(
        div,
        safe_static_selector(&CHAPTER_SUMMARY_SELECTOR, CHAPTER_SUMMARY_SELECTOR_TEXT)?,
    ) {
        Some(block) => Some(block_text(block)?),
        None => None,
    };
    let notes = match first(
        div,
        safe_static_selector(&CHAPTER_NOTES_SELECTOR, CHAPTER_NOTES_SELECTOR_TEXT)?,
    ) {
        Some(block) => Some(block_text(block)?),
        None => None,
    };
    Ok(Chapter {
        id,
        number,
        title,
        summary,
        notes,
        text,
    })
}

/// Parses the full-work view (`view_full_work=true`) into its chapters.
pub fn parse_chapters(body: &str) -> Result<Vec<Chapter>, Ao3ApiError> {
    let document = Html::parse_document(body);
    let root = document.root_element();
    let divs: Vec<ElementRef<'_>> = root
        .select(safe_static_selector(&CHAPTER_DIV_SELECTOR, CHAPTER_DIV_SELECTOR_TEXT)?)
        .filter(|div| div.value().attr("id").is_some_and(|id| id.starts_with("chapter-")))
        .collect();

    if divs.is_empty() {
        let text = first(root, safe_static_selector(&ONESHOT_SELECTOR, ONESHOT_SELECTOR_TEXT)?)
            .ok_or_else(|| Ao3ApiError::parsing("work page has no chapter text"))?;
        let title = first_text(root, safe_static_selector(&TITLE_SELECTOR, TITLE_SELECTOR_TEXT)?)
            .unwrap_or_default();
        return Ok(vec![Chapter {
            id: None,
            number: 1,
            title,
            summary: None,
            notes: None,
            text: block_text(text)?,
        }]);
    }

    divs.into_iter()
        .enumerate()
        .map(|(index, div)| {
            let number = div
                .value()
                .attr("id")
                .and_then(|id| id.trim_start_matches("chapter-").parse::<u32>().ok())
                .unwrap_or(index as u32 + 1);
            chapter_from_div(div, number)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORK_PAGE: &str = r#"
<html><head><meta name="csrf-token" content="tok123"></head><body><div id="main">
<ul class="work navigation actions">
  <li class="download"><a>Download</a><ul class="expandable secondary">
    <li><a href="/downloads/42/Moon.epub?updated_at=1">EPUB</a></li>
    <li><a href="/downloads/42/Moon.pdf?updated_at=1">PDF</a></li>
  </ul></li>
</ul>
<dl class="work meta group">
  <dd class="rating tags"><ul><li><a class="tag">Teen And Up Audiences</a></li></ul></dd>
  <dd class="warning tags"><ul><li><a class="tag">No Archive Warnings Apply</a></li></ul></dd>
  <dd class="category tags"><ul><li><a class="tag">F/F</a></li></ul></dd>
  <dd class="fandom tags"><ul><li><a class="tag">Original Work</a></li></ul></dd>
  <dd class="relationship tags"><ul><li><a class="tag">A/B</a></li></ul></dd>
  <dd class="character tags"><ul><li><a class="tag">A</a></li><li><a class="tag">B</a></li></ul></dd>
  <dd class="freeform tags"><ul><li><a class="tag">Fluff</a></li></ul></dd>
  <dd class="language">English</dd>
  <dd class="series"><span class="series"><span class="position">Part 2 of <a href="/series/77">Lunar</a></span></span></dd>
  <dd class="stats"><dl class="stats">
    <dd class="published">2021-03-01</dd><dd class="status">2021-04-02</dd>
    <dd class="words">12,345</dd><dd class="chapters">3/3</dd>
    <dd class="comments">10</dd><dd class="kudos">1,002</dd>
    <dd class="bookmarks"><a>55</a></dd><dd class="hits">20,000</dd>
  </dl></dd>
</dl>
<div class="preface group">
  <h2 class="title heading"> Moon River <img title="Restricted" alt="(Restricted)"></h2>
  <h3 class="byline heading"><a rel="author" href="/users/luna/pseuds/luna">luna</a></h3>
  <div class="summary module"><blockquote class="userstuff"><p>First line.</p><p>Second line.</p></blockquote></div>
</div>
</div></body></html>"#;

    #[test]
    fn work_page_fields() {
        let work = parse_work(WORK_PAGE, 42).unwrap();
        assert_eq!(work.title, "Moon River");
        assert_eq!(work.authors, vec!["luna"]);
        assert_eq!(work.ratings, vec!["Teen And Up Audiences"]);
        assert_eq!(work.characters, vec!["A", "B"]);
        assert_eq!(work.words, Some(12345));
        assert_eq!(work.kudos, Some(1002));
        assert_eq!(work.bookmarks, Some(55));
        assert_eq!(work.chapters, 3);
        assert_eq!(work.expected_chapters, Some(3));
        assert!(work.complete);
        assert!(work.restricted);
        assert_eq!(work.summary.as_deref(), Some("First line.\nSecond line."));
        assert_eq!(
            work.series,
            vec![SeriesRef {
                id: 77,
                name: "Lunar".into(),
                part: Some(2)
            }]
        );
        assert_eq!(work.authenticity_token.as_deref(), Some("tok123"));
        assert!(work.download_links["EPUB"].starts_with("/downloads/42/"));
        assert_eq!(work.date_published.as_deref(), Some("2021-03-01"));
    }

    #[test]
    fn error_page_is_an_invalid_id() {
        let page = r#"<div id="main"><h2 class="heading">Error 404</h2></div>"#;
        assert!(matches!(parse_work(page, 1), Err(Ao3ApiError::InvalidId(_))));
    }

    #[test]
    fn multi_chapter_full_view() {
        let page = r#"<div id="chapters">
  <div class="chapter" id="chapter-1">
    <div class="chapter preface group"><h3 class="title"><a href="/works/42/chapters/501">Chapter 1</a>: Start</h3></div>
    <div class="userstuff module" role="article"><h3 class="landmark heading">Chapter Text</h3><p>Once.</p><p>Twice.</p></div>
  </div>
  <div class="chapter" id="chapter-2">
    <div class="chapter preface group"><h3 class="title"><a href="/works/42/chapters/502">Chapter 2</a></h3>
      <div class="notes module"><blockquote class="userstuff"><p>Thanks!</p></blockquote></div></div>
    <div class="userstuff module" role="article"><p>End.</p></div>
  </div>
</div>"#;
        let chapters = parse_chapters(page).unwrap();
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[0].id, Some(501));
        assert_eq!(chapters[0].title, "Chapter 1: Start");
        assert_eq!(chapters[0].text, "Once.\nTwice.");
        assert_eq!(chapters[1].number, 2);
        assert_eq!(chapters[1].notes.as_deref(), Some("Thanks!"));
    }

    #[test]
    fn oneshot_has_a_single_anonymous_chapter() {
        let page = r#"<h2 class="title heading">Drabble</h2>
<div id="chapters"><div class="userstuff"><p>Short.</p></div></div>"#;
        let chapters = parse_chapters(page).unwrap();
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].id, None);
        assert_eq!(chapters[0].text, "Short.");
        assert_eq!(chapters[0].word_count(), 1);
    }
}
