use super::listing::parse_listing;
use super::work::subscription_id;
use super::{block_text, csrf_token, definition_pairs, first, first_count, first_text, is_not_found_page};
use crate::define_selector;
use crate::errors::Ao3ApiError;
use crate::types::SeriesMetadata;
use crate::utils::{element_text, safe_static_selector};
use scraper::Html;

define_selector!(NAME_SELECTOR, NAME_SELECTOR_TEXT, "#main h2.heading");
define_selector!(META_SELECTOR, META_SELECTOR_TEXT, "dl.series.meta");
define_selector!(AUTHOR_SELECTOR, AUTHOR_SELECTOR_TEXT, r#"a[rel="author"]"#);
define_selector!(USERSTUFF_SELECTOR, USERSTUFF_SELECTOR_TEXT, "blockquote.userstuff");
define_selector!(WORDS_SELECTOR, WORDS_SELECTOR_TEXT, "dl.stats dd.words");
define_selector!(WORKS_SELECTOR, WORKS_SELECTOR_TEXT, "dl.stats dd.works");
define_selector!(BOOKMARKS_SELECTOR, BOOKMARKS_SELECTOR_TEXT, "dl.stats dd.bookmarks");
define_selector!(COMPLETE_SELECTOR, COMPLETE_SELECTOR_TEXT, "dl.stats dd.complete");

/// Parses `/series/{id}`, including the work blurbs listed on it.
pub fn parse_series(body: &str, id: u64) -> Result<SeriesMetadata, Ao3ApiError> {
    let document = Html::parse_document(body);
    let root = document.root_element();
    if is_not_found_page(root)? {
        return Err(Ao3ApiError::InvalidId(format!("cannot find series {id}")));
    }
    let name = first_text(root, safe_static_selector(&NAME_SELECTOR, NAME_SELECTOR_TEXT)?)
        .ok_or_else(|| Ao3ApiError::parsing(format!("series {id} has no name heading")))?;

    let mut series = SeriesMetadata {
        id,
        name,
        words: first_count(root, safe_static_selector(&WORDS_SELECTOR, WORDS_SELECTOR_TEXT)?),
        nworks: first_count(root, safe_static_selector(&WORKS_SELECTOR, WORKS_SELECTOR_TEXT)?),
        nbookmarks: first_count(
            root,
            safe_static_selector(&BOOKMARKS_SELECTOR, BOOKMARKS_SELECTOR_TEXT)?,
        ),
        complete: first_text(root, safe_static_selector(&COMPLETE_SELECTOR, COMPLETE_SELECTOR_TEXT)?)
            .map(|t| t.eq_ignore_ascii_case("yes")),
        subscription_id: subscription_id(root)?,
        authenticity_token: csrf_token(root)?,
        ..SeriesMetadata::default()
    };

    if let Some(dl) = first(root, safe_static_selector(&META_SELECTOR, META_SELECTOR_TEXT)?) {
        let author = safe_static_selector(&AUTHOR_SELECTOR, AUTHOR_SELECTOR_TEXT)?;
        let userstuff = safe_static_selector(&USERSTUFF_SELECTOR, USERSTUFF_SELECTOR_TEXT)?;
        for (label, dd) in definition_pairs(dl) {
            match label.as_str() {
                "creator" | "creators" => {
                    series.creators = dd.select(author).map(element_text).collect();
                }
                "series begun" => series.begun = Some(element_text(dd)),
                "series updated" => series.updated = Some(element_text(dd)),
                "description" => {
                    series.description = match first(dd, userstuff) {
                        Some(block) => Some(block_text(block)?),
                        None => Some(element_text(dd)),
                    }
                }
                "notes" => {
                    series.notes = match first(dd, userstuff) {
                        Some(block) => Some(block_text(block)?),
                        None => Some(element_text(dd)),
                    }
                }
                _ => {}
            }
        }
    }

    series.works = parse_listing(body)?;
    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn series_page() {
        let page = r#"<html><body><div id="main">
<h2 class="heading">Lunar Cycle</h2>
<div class="wrapper"><dl class="series meta group">
  <dt>Creator:</dt><dd><a rel="author" href="/users/luna/pseuds/luna">luna</a>, <a rel="author" href="/users/sol/pseuds/sol">sol</a></dd>
  <dt>Series Begun:</dt><dd>2020-01-01</dd>
  <dt>Series Updated:</dt><dd>2021-05-05</dd>
  <dt>Description:</dt><dd><blockquote class="userstuff"><p>Phases.</p></blockquote></dd>
  <dt>Stats:</dt><dd><dl class="stats"><dt>Words:</dt><dd class="words">20,000</dd><dt>Works:</dt><dd class="works">2</dd>
    <dt>Complete:</dt><dd class="complete">No</dd><dt>Bookmarks:</dt><dd class="bookmarks"><a>7</a></dd></dl></dd>
</dl></div>
<ul class="series work index group">
  <li class="work blurb group" role="article"><h4 class="heading"><a href="/works/1">New Moon</a></h4></li>
  <li class="work blurb group" role="article"><h4 class="heading"><a href="/works/2">Full Moon</a></h4></li>
</ul>
</div></body></html>"#;
        let series = parse_series(page, 8).unwrap();
        assert_eq!(series.name, "Lunar Cycle");
        assert_eq!(series.creators, vec!["luna", "sol"]);
        assert_eq!(series.begun.as_deref(), Some("2020-01-01"));
        assert_eq!(series.description.as_deref(), Some("Phases."));
        assert_eq!(series.words, Some(20000));
        assert_eq!(series.nworks, Some(2));
        assert_eq!(series.nbookmarks, Some(7));
        assert_eq!(series.complete, Some(false));
        let ids: Vec<_> = series.works.iter().map(|w| w.id).collect();
        assert_eq!(ids, vec![Some(1), Some(2)]);
    }
}
