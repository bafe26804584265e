//! Plain records produced by the extraction layer.
//!
//! These are snapshots: nothing in here talks to the network.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A series a work belongs to, as shown on the work.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesRef {
    pub id: u64,
    pub name: String,
    /// Position of the work inside the series.
    pub part: Option<u32>,
}

/// One entry of a works listing (search results, bookmarks, user works, series).
///
/// The id is missing for entries the archive does not link, such as deleted
/// or anonymous works.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkSummary {
    pub id: Option<u64>,
    pub title: String,
    pub authors: Vec<String>,
    pub fandoms: Vec<String>,
    pub rating: Option<String>,
    pub categories: Vec<String>,
    pub warnings: Vec<String>,
    pub relationships: Vec<String>,
    pub characters: Vec<String>,
    pub tags: Vec<String>,
    pub summary: Option<String>,
    pub series: Vec<SeriesRef>,
    pub language: Option<String>,
    pub words: Option<u64>,
    pub chapters: Option<u32>,
    pub expected_chapters: Option<u32>,
    pub comments: Option<u64>,
    pub kudos: Option<u64>,
    pub bookmarks: Option<u64>,
    pub hits: Option<u64>,
    pub restricted: bool,
    pub complete: Option<bool>,
    pub date_updated: Option<String>,
}

/// Everything the work page shows above the text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkMetadata {
    pub id: u64,
    pub title: String,
    pub authors: Vec<String>,
    pub ratings: Vec<String>,
    pub warnings: Vec<String>,
    pub categories: Vec<String>,
    pub fandoms: Vec<String>,
    pub relationships: Vec<String>,
    pub characters: Vec<String>,
    pub tags: Vec<String>,
    pub language: Option<String>,
    pub date_published: Option<String>,
    /// Last update, or completion date for finished works.
    pub date_updated: Option<String>,
    pub words: Option<u64>,
    pub chapters: u32,
    /// `None` when the author has not announced a chapter count.
    pub expected_chapters: Option<u32>,
    pub comments: Option<u64>,
    pub kudos: Option<u64>,
    pub bookmarks: Option<u64>,
    pub hits: Option<u64>,
    pub summary: Option<String>,
    pub start_notes: Option<String>,
    pub series: Vec<SeriesRef>,
    pub restricted: bool,
    pub complete: bool,
    pub authenticity_token: Option<String>,
    /// Download label (`"EPUB"`, `"PDF"`, ...) to absolute or site-relative URL.
    pub download_links: BTreeMap<String, String>,
    pub bookmark_id: Option<u64>,
    pub subscription_id: Option<u64>,
}

impl WorkMetadata {
    pub fn is_oneshot(&self) -> bool {
        self.chapters <= 1
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    /// `None` for single-chapter works, which have no chapter page.
    pub id: Option<u64>,
    pub number: u32,
    pub title: String,
    pub summary: Option<String>,
    pub notes: Option<String>,
    pub text: String,
}

impl Chapter {
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub username: String,
    pub user_id: Option<u64>,
    pub joined: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub works: u64,
    pub bookmarks: u64,
    pub work_pages: u32,
    pub bookmark_pages: u32,
    pub subscription_id: Option<u64>,
    pub authenticity_token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesMetadata {
    pub id: u64,
    pub name: String,
    pub creators: Vec<String>,
    pub begun: Option<String>,
    pub updated: Option<String>,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub words: Option<u64>,
    pub nworks: Option<u64>,
    pub nbookmarks: Option<u64>,
    pub complete: Option<bool>,
    pub works: Vec<WorkSummary>,
    pub subscription_id: Option<u64>,
    pub authenticity_token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentRecord {
    pub id: u64,
    /// Account or guest name; `None` for deleted accounts.
    pub author: Option<String>,
    pub text: String,
    pub chapter_id: Option<u64>,
    pub authenticity_token: Option<String>,
}

/// An entry of the subscriptions page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Subscription {
    Work {
        id: Option<u64>,
        title: String,
        authors: Vec<String>,
    },
    Series {
        id: u64,
        name: String,
        authors: Vec<String>,
    },
    User {
        username: String,
    },
}
