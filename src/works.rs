//! Works and their chapters.

use crate::comments::{Comment, CommentTarget, get_comments};
use crate::errors::Ao3ApiError;
use crate::extraction::work::{parse_chapters, parse_work};
use crate::lazy::{LazyCell, Loadable, ThreadHandle};
use crate::networking::Request;
use crate::session::{BookmarkOptions, Session, SubscriptionKind};
use crate::types::{Chapter, WorkMetadata, WorkSummary};
use crate::Result;
use log::{debug, info};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Formats the archive offers downloads in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DownloadFormat {
    Azw3,
    Epub,
    Html,
    Mobi,
    Pdf,
}

impl DownloadFormat {
    pub const ALL: [DownloadFormat; 5] = [
        DownloadFormat::Azw3,
        DownloadFormat::Epub,
        DownloadFormat::Html,
        DownloadFormat::Mobi,
        DownloadFormat::Pdf,
    ];

    /// Label of the download link on the work page.
    pub fn label(self) -> &'static str {
        match self {
            DownloadFormat::Azw3 => "AZW3",
            DownloadFormat::Epub => "EPUB",
            DownloadFormat::Html => "HTML",
            DownloadFormat::Mobi => "MOBI",
            DownloadFormat::Pdf => "PDF",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            DownloadFormat::Azw3 => "azw3",
            DownloadFormat::Epub => "epub",
            DownloadFormat::Html => "html",
            DownloadFormat::Mobi => "mobi",
            DownloadFormat::Pdf => "pdf",
        }
    }
}

impl std::str::FromStr for DownloadFormat {
    type Err = Ao3ApiError;

    fn from_str(s: &str) -> Result<Self> {
        DownloadFormat::ALL
            .into_iter()
            .find(|f| f.extension().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Ao3ApiError::invalid_argument(format!("unknown download format {s}")))
    }
}

struct Inner {
    id: u64,
    session: Session,
    metadata: LazyCell<WorkMetadata>,
    chapters: LazyCell<Vec<Chapter>>,
}

/// A work on the archive.
///
/// Metadata loads on first access. Chapter text is secondary: it needs an
/// explicit [`Work::load_chapters`], which costs the full-work page.
#[derive(Clone)]
pub struct Work {
    inner: Arc<Inner>,
}

impl fmt::Debug for Work {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Work")
            .field("id", &self.inner.id)
            .field("metadata", &self.inner.metadata)
            .field("chapters", &self.inner.chapters)
            .finish()
    }
}

impl PartialEq for Work {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

/// The work page, or an `InvalidId` when the archive has no such work.
fn get_work_page(session: &Session, id: u64, path: &str) -> Result<String> {
    match session.get(path) {
        Err(Ao3ApiError::Http { status: 404, .. }) => {
            Err(Ao3ApiError::InvalidId(format!("cannot find work {id}")))
        }
        other => other,
    }
}

impl Work {
    /// An unloaded handle to work `id`.
    pub fn new(id: u64, session: Session) -> Self {
        Self {
            inner: Arc::new(Inner {
                id,
                session,
                metadata: LazyCell::new(),
                chapters: LazyCell::new(),
            }),
        }
    }

    /// A handle that is loaded before it is returned.
    pub fn load(id: u64, session: Session) -> Result<Self> {
        let work = Self::new(id, session);
        work.reload()?;
        Ok(work)
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    pub fn url(&self) -> String {
        self.inner
            .session
            .requester()
            .url(&format!("/works/{}", self.inner.id))
    }

    pub fn title(&self) -> Result<String> {
        Ok(self.record()?.title.clone())
    }

    pub fn authors(&self) -> Result<Vec<String>> {
        Ok(self.record()?.authors.clone())
    }

    pub fn words(&self) -> Result<Option<u64>> {
        Ok(self.record()?.words)
    }

    pub fn kudos(&self) -> Result<Option<u64>> {
        Ok(self.record()?.kudos)
    }

    /// Chapters published so far.
    pub fn nchapters(&self) -> Result<u32> {
        Ok(self.record()?.chapters)
    }

    pub fn is_complete(&self) -> Result<bool> {
        Ok(self.record()?.complete)
    }

    /// Fetches the full-work view and stores every chapter.
    ///
    /// The same page carries the metadata, so an unloaded work is loaded too.
    pub fn load_chapters(&self) -> Result<()> {
        let path = format!("/works/{}?view_adult=true&view_full_work=true", self.inner.id);
        let mut body = String::new();
        self.inner.chapters.reload(|| {
            body = get_work_page(&self.inner.session, self.inner.id, &path)?;
            parse_chapters(&body)
        })?;
        if !self.inner.metadata.is_loaded() {
            if let Ok(metadata) = parse_work(&body, self.inner.id) {
                self.inner.metadata.fill(metadata);
            }
        }
        debug!("loaded chapters of work {}", self.inner.id);
        Ok(())
    }

    pub fn load_chapters_threaded(&self) -> ThreadHandle<()> {
        let this = self.clone();
        ThreadHandle::spawn(move || this.load_chapters())
    }

    /// Chapters with their text. Needs [`Work::load_chapters`] first.
    pub fn chapters(&self) -> Result<Arc<Vec<Chapter>>> {
        self.inner.chapters.get_loaded("call load_chapters() first")
    }

    pub fn chapters_loaded(&self) -> bool {
        self.inner.chapters.is_loaded()
    }

    /// The whole text, chapters separated by a blank line.
    pub fn text(&self) -> Result<String> {
        Ok(self
            .chapters()?
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n"))
    }

    /// Downloads the work in `format`.
    pub fn download(&self, format: DownloadFormat) -> Result<Vec<u8>> {
        let metadata = self.record()?;
        let url = metadata
            .download_links
            .get(format.label())
            .cloned()
            .unwrap_or_else(|| format!("/downloads/{}/work.{}", self.inner.id, format.extension()));
        let response = self.inner.session.fetch(&Request::get(url))?;
        info!(
            "downloaded work {} as {} ({} bytes)",
            self.inner.id,
            format.label(),
            response.body.len()
        );
        Ok(response.body)
    }

    pub fn download_to_file(&self, format: DownloadFormat, path: impl AsRef<Path>) -> Result<()> {
        let bytes = self.download(format)?;
        fs::write(path, bytes)?;
        Ok(())
    }

    pub fn leave_kudos(&self) -> Result<bool> {
        self.inner.session.leave_kudos(self.inner.id)
    }

    /// Comments on the whole work, or on one of its chapters.
    pub fn comment(&self, text: &str, chapter_id: Option<u64>) -> Result<()> {
        self.inner
            .session
            .post_comment(self.inner.id, chapter_id, text)
    }

    pub fn bookmark(&self, options: &BookmarkOptions) -> Result<()> {
        self.inner.session.bookmark(self.inner.id, options)
    }

    /// Removes this account's bookmark, as found when the work was loaded.
    pub fn delete_bookmark(&self) -> Result<()> {
        let bookmark_id = self
            .record()?
            .bookmark_id
            .ok_or_else(|| Ao3ApiError::invalid_argument("you don't have a bookmark here"))?;
        self.inner.session.delete_bookmark(bookmark_id)
    }

    pub fn subscribe(&self) -> Result<()> {
        self.inner
            .session
            .subscribe(SubscriptionKind::Work, self.inner.id)
    }

    pub fn unsubscribe(&self) -> Result<()> {
        let subscription_id = self
            .record()?
            .subscription_id
            .ok_or_else(|| Ao3ApiError::invalid_argument("you are not subscribed to this work"))?;
        self.inner
            .session
            .unsubscribe(SubscriptionKind::Work, self.inner.id, subscription_id)
    }

    /// Top-level comments on the whole work, pages `page_start..=page_end`.
    pub fn get_comments(&self, page_start: u32, page_end: u32) -> Result<Vec<Comment>> {
        get_comments(
            &self.inner.session,
            CommentTarget::Work(self.inner.id),
            page_start,
            page_end,
        )
    }
}

impl WorkSummary {
    /// An unloaded [`Work`] for this entry; `None` for unlinked entries.
    pub fn resolve(&self, session: &Session) -> Option<Work> {
        self.id.map(|id| Work::new(id, session.clone()))
    }
}

impl Loadable for Work {
    type Record = WorkMetadata;

    fn cell(&self) -> &LazyCell<WorkMetadata> {
        &self.inner.metadata
    }

    fn fetch(&self) -> Result<WorkMetadata> {
        let path = format!("/works/{}?view_adult=true", self.inner.id);
        let body = get_work_page(&self.inner.session, self.inner.id, &path)?;
        parse_work(&body, self.inner.id)
    }
}
