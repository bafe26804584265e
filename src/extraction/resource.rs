use crate::define_selector;
use crate::errors::Ao3ApiError;
use crate::utils::{element_text, safe_static_selector};
use scraper::Html;
use serde::{Deserialize, Serialize};

define_selector!(LANGUAGE_SELECTOR, LANGUAGE_SELECTOR_TEXT, "dl.language.index.group > dt");
define_selector!(LINK_SELECTOR, LINK_SELECTOR_TEXT, "a");
define_selector!(
    FANDOM_SELECTOR,
    FANDOM_SELECTOR_TEXT,
    "ol.alphabet.fandom.index.group a.tag"
);

/// One line of a reference list. `alias` is the short code languages are
/// searched by (`"en"`), absent for fandoms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceEntry {
    pub name: String,
    pub alias: Option<String>,
}

/// Parses `/languages`.
pub fn parse_languages(body: &str) -> Result<Vec<ResourceEntry>, Ao3ApiError> {
    let document = Html::parse_document(body);
    let link = safe_static_selector(&LINK_SELECTOR, LINK_SELECTOR_TEXT)?;
    let entries: Vec<ResourceEntry> = document
        .select(safe_static_selector(&LANGUAGE_SELECTOR, LANGUAGE_SELECTOR_TEXT)?)
        .map(|dt| ResourceEntry {
            name: element_text(dt),
            alias: dt
                .select(link)
                .next()
                .and_then(|a| a.value().attr("href"))
                .and_then(|href| href.rsplit('/').next())
                .map(str::to_string),
        })
        .collect();
    if entries.is_empty() {
        return Err(Ao3ApiError::parsing("language index is empty"));
    }
    Ok(entries)
}

/// Parses `/media/{category}/fandoms`.
pub fn parse_fandoms(body: &str) -> Result<Vec<ResourceEntry>, Ao3ApiError> {
    let document = Html::parse_document(body);
    let entries: Vec<ResourceEntry> = document
        .select(safe_static_selector(&FANDOM_SELECTOR, FANDOM_SELECTOR_TEXT)?)
        .map(|a| ResourceEntry {
            name: element_text(a),
            alias: None,
        })
        .collect();
    if entries.is_empty() {
        return Err(Ao3ApiError::parsing("fandom index is empty"));
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn languages_carry_their_alias() {
        let page = r#"<dl class="language index group">
<dt><a href="/languages/en">English</a></dt><dd>works</dd>
<dt>Klingon</dt><dd>none</dd></dl>"#;
        let langs = parse_languages(page).unwrap();
        assert_eq!(langs[0].name, "English");
        assert_eq!(langs[0].alias.as_deref(), Some("en"));
        assert_eq!(langs[1].alias, None);
    }

    #[test]
    fn fandom_index_entries() {
        let page = r#"<ol class="alphabet fandom index group"><li><ul class="tags index group">
<li><a class="tag" href="/tags/A/works">Alpha</a> (3)</li><li><a class="tag" href="/tags/B/works">Beta</a> (1)</li>
</ul></li></ol>"#;
        let names: Vec<_> = parse_fandoms(page).unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["Alpha", "Beta"]);
        assert!(parse_fandoms("<p></p>").is_err());
    }
}
