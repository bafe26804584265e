//! Work search.
//!
//! A [`SearchQuery`] is plain data; [`SearchQuery::build_query`] turns it into
//! the archive's `work_search[...]` parameters and rejects anything that
//! cannot be sent. [`Search`] runs it through a session.

use crate::errors::Ao3ApiError;
use crate::extraction::listing::{is_empty_result, parse_listing, parse_total_results};
use crate::lazy::ThreadHandle;
use crate::networking::Request;
use crate::session::Session;
use crate::types::WorkSummary;
use crate::Result;
use log::{debug, info};
use serde::Serialize;
use std::fmt;

/// Results the archive shows per search page.
pub const PAGE_SIZE: usize = 20;

/// A numeric range; an absent bound is open on that side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Constraint {
    min: Option<u64>,
    max: Option<u64>,
}

impl Constraint {
    /// Fails when both bounds are given and `min > max`.
    pub fn new(min: Option<u64>, max: Option<u64>) -> Result<Self> {
        if let (Some(lo), Some(hi)) = (min, max) {
            if lo > hi {
                return Err(Ao3ApiError::invalid_argument(format!(
                    "constraint bounds are crossed: {lo} > {hi}"
                )));
            }
        }
        Ok(Self { min, max })
    }

    pub fn between(min: u64, max: u64) -> Result<Self> {
        Self::new(Some(min), Some(max))
    }

    pub fn at_least(min: u64) -> Self {
        Self {
            min: Some(min),
            max: None,
        }
    }

    pub fn at_most(max: u64) -> Self {
        Self {
            min: None,
            max: Some(max),
        }
    }

    pub fn exactly(value: u64) -> Self {
        Self {
            min: Some(value),
            max: Some(value),
        }
    }

    pub fn min(&self) -> Option<u64> {
        self.min
    }

    pub fn max(&self) -> Option<u64> {
        self.max
    }

    pub fn contains(&self, value: u64) -> bool {
        self.min.is_none_or(|lo| value >= lo) && self.max.is_none_or(|hi| value <= hi)
    }

    /// Search parameter value; `None` when open on both sides.
    pub fn encode(&self) -> Option<String> {
        match (self.min, self.max) {
            (None, None) => None,
            (Some(lo), None) => Some(format!(">{lo}")),
            (None, Some(hi)) => Some(format!("<{hi}")),
            (Some(lo), Some(hi)) if lo == hi => Some(lo.to_string()),
            (Some(lo), Some(hi)) => Some(format!("{lo}-{hi}")),
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.encode().as_deref().unwrap_or("any"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rating {
    NotRated,
    General,
    Teen,
    Mature,
    Explicit,
}

impl Rating {
    pub fn id(self) -> u8 {
        match self {
            Rating::NotRated => 9,
            Rating::General => 10,
            Rating::Teen => 11,
            Rating::Mature => 12,
            Rating::Explicit => 13,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    BestMatch,
    Author,
    Title,
    DatePosted,
    DateUpdated,
    WordCount,
    Rating,
    Hits,
    Bookmarks,
    Comments,
    Kudos,
}

impl SortColumn {
    pub fn as_str(self) -> &'static str {
        match self {
            SortColumn::BestMatch => "_score",
            SortColumn::Author => "authors_to_sort_on",
            SortColumn::Title => "title_to_sort_on",
            SortColumn::DatePosted => "created_at",
            SortColumn::DateUpdated => "revised_at",
            SortColumn::WordCount => "word_count",
            SortColumn::Rating => "rating_ids",
            SortColumn::Hits => "hits",
            SortColumn::Bookmarks => "bookmarks_count",
            SortColumn::Comments => "comments_count",
            SortColumn::Kudos => "kudos_count",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Ascending => "asc",
            SortDirection::Descending => "desc",
        }
    }
}

/// Search filters. Empty strings and `None` are left out of the query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchQuery {
    pub any_field: String,
    pub title: String,
    pub author: String,
    pub single_chapter: bool,
    pub word_count: Option<Constraint>,
    /// Language alias, such as `"en"`.
    pub language: String,
    pub fandoms: String,
    pub characters: String,
    pub relationships: String,
    pub tags: String,
    pub rating: Option<Rating>,
    pub hits: Option<Constraint>,
    pub kudos: Option<Constraint>,
    /// `Some(false)` excludes crossovers, `Some(true)` keeps only crossovers.
    pub crossovers: Option<bool>,
    pub bookmarks: Option<Constraint>,
    pub comments: Option<Constraint>,
    pub complete: Option<bool>,
    pub sort_column: Option<SortColumn>,
    pub sort_direction: Option<SortDirection>,
    /// Relative date filter in the archive's syntax, e.g. `"< 2 weeks"`.
    pub revised_at: String,
}

macro_rules! text_setter {
    ($($name:ident),* $(,)?) => {
        $(
            pub fn $name(mut self, value: impl Into<String>) -> Self {
                self.$name = value.into();
                self
            }
        )*
    };
}

macro_rules! constraint_setter {
    ($($name:ident),* $(,)?) => {
        $(
            pub fn $name(mut self, constraint: Constraint) -> Self {
                self.$name = Some(constraint);
                self
            }
        )*
    };
}

fn flag(value: bool) -> &'static str {
    if value { "T" } else { "F" }
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    text_setter!(
        any_field,
        title,
        author,
        language,
        fandoms,
        characters,
        relationships,
        tags,
        revised_at,
    );

    constraint_setter!(word_count, hits, kudos, bookmarks, comments);

    pub fn single_chapter(mut self, single_chapter: bool) -> Self {
        self.single_chapter = single_chapter;
        self
    }

    pub fn rating(mut self, rating: Rating) -> Self {
        self.rating = Some(rating);
        self
    }

    pub fn crossovers(mut self, crossovers: bool) -> Self {
        self.crossovers = Some(crossovers);
        self
    }

    pub fn complete(mut self, complete: bool) -> Self {
        self.complete = Some(complete);
        self
    }

    pub fn sort(mut self, column: SortColumn, direction: SortDirection) -> Self {
        self.sort_column = Some(column);
        self.sort_direction = Some(direction);
        self
    }

    /// Query parameters for `page`, always in the same order.
    pub fn build_query(&self, page: u32) -> Result<Vec<(String, String)>> {
        if page == 0 {
            return Err(Ao3ApiError::invalid_argument("search pages start at 1"));
        }
        let mut params: Vec<(String, String)> = Vec::new();
        let mut push = |key: &str, value: String| {
            params.push((format!("work_search[{key}]"), value));
        };

        let any_field = if self.any_field.is_empty() {
            " ".to_string()
        } else {
            self.any_field.clone()
        };
        push("query", any_field);

        let texts = [
            ("title", &self.title),
            ("creators", &self.author),
        ];
        for (key, value) in texts {
            if !value.is_empty() {
                push(key, value.clone());
            }
        }
        if self.single_chapter {
            push("single_chapter", "1".to_string());
        }
        if let Some(value) = encode_checked(self.word_count)? {
            push("word_count", value);
        }
        let names = [
            ("language_id", &self.language),
            ("fandom_names", &self.fandoms),
            ("character_names", &self.characters),
            ("relationship_names", &self.relationships),
            ("freeform_names", &self.tags),
        ];
        for (key, value) in names {
            if !value.is_empty() {
                push(key, value.clone());
            }
        }
        if let Some(rating) = self.rating {
            push("rating_ids", rating.id().to_string());
        }
        if let Some(value) = encode_checked(self.hits)? {
            push("hits", value);
        }
        if let Some(value) = encode_checked(self.kudos)? {
            push("kudos_count", value);
        }
        if let Some(crossovers) = self.crossovers {
            push("crossover", flag(crossovers).to_string());
        }
        if let Some(value) = encode_checked(self.bookmarks)? {
            push("bookmarks_count", value);
        }
        if let Some(value) = encode_checked(self.comments)? {
            push("comments_count", value);
        }
        if let Some(complete) = self.complete {
            push("complete", flag(complete).to_string());
        }
        if let Some(column) = self.sort_column {
            push("sort_column", column.as_str().to_string());
        }
        if let Some(direction) = self.sort_direction {
            push("sort_direction", direction.as_str().to_string());
        }
        if !self.revised_at.is_empty() {
            push("revised_at", self.revised_at.clone());
        }
        if page != 1 {
            params.insert(1, ("page".to_string(), page.to_string()));
        }
        Ok(params)
    }
}

/// Re-checks a constraint, which may have been built field by field.
fn encode_checked(constraint: Option<Constraint>) -> Result<Option<String>> {
    match constraint {
        Some(c) => Ok(Constraint::new(c.min, c.max)?.encode()),
        None => Ok(None),
    }
}

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchPage {
    pub page: u32,
    /// Size of the whole result set, not just this page.
    pub total_results: u64,
    pub pages: u32,
    pub results: Vec<WorkSummary>,
}

#[derive(Debug, Clone)]
pub struct Search {
    query: SearchQuery,
    session: Session,
}

impl Search {
    pub fn new(query: SearchQuery, session: Session) -> Self {
        Self { query, session }
    }

    pub fn query(&self) -> &SearchQuery {
        &self.query
    }

    /// Runs the search and parses result page `page` (1-indexed).
    pub fn execute(&self, page: u32) -> Result<SearchPage> {
        let params = self.query.build_query(page)?;
        let request = Request::get("/works/search").queries(params);
        let body = self.session.fetch(&request)?.text();

        if is_empty_result(&body)? {
            info!("search page {page} has no results");
            return Ok(SearchPage {
                page,
                ..SearchPage::default()
            });
        }
        let mut results = parse_listing(&body)?;
        results.truncate(PAGE_SIZE);
        let total_results = parse_total_results(&body)?;
        let pages = u32::try_from(total_results.div_ceil(PAGE_SIZE as u64)).unwrap_or(u32::MAX);
        debug!(
            "search page {page}/{pages}: {} of {total_results} results",
            results.len()
        );
        Ok(SearchPage {
            page,
            total_results,
            pages,
            results,
        })
    }

    pub fn execute_threaded(&self, page: u32) -> ThreadHandle<SearchPage> {
        let this = self.clone();
        ThreadHandle::spawn(move || this.execute(page))
    }
}
