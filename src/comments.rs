//! Comments and comment threads.
//!
//! Top-level comments come from the paginated listing under a work or
//! chapter. Replies are never part of that: a [`Comment`]'s reply tree is a
//! secondary field, filled by [`Comment::get_thread`], which walks the thread
//! depth-first and fetches truncated subtrees one page at a time. A reply's
//! own page links its parent thread; the tree is then taken from there.

use crate::errors::Ao3ApiError;
use crate::extraction::comment::{ThreadNode, parent_thread_id, parse_comment_listing, parse_thread};
use crate::lazy::{LazyCell, Loadable, ThreadHandle};
use crate::session::Session;
use crate::types::CommentRecord;
use crate::Result;
use log::debug;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// What a comment was left on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentTarget {
    /// A whole work, which is how one-shots are commented on.
    Work(u64),
    Chapter(u64),
}

impl CommentTarget {
    /// Page the comment form for this target lives on.
    pub fn path(&self) -> String {
        match self {
            CommentTarget::Work(id) => format!("/works/{id}"),
            CommentTarget::Chapter(id) => format!("/chapters/{id}"),
        }
    }

    fn listing_path(&self, page: u32) -> String {
        format!(
            "{}?show_comments=true&view_adult=true&page={page}",
            self.path()
        )
    }
}

struct Inner {
    id: u64,
    session: Session,
    target: Option<CommentTarget>,
    record: LazyCell<CommentRecord>,
    replies: LazyCell<Vec<Comment>>,
    parent: Mutex<Option<Comment>>,
}

#[derive(Clone)]
pub struct Comment {
    inner: Arc<Inner>,
}

impl fmt::Debug for Comment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Comment")
            .field("id", &self.inner.id)
            .field("record", &self.inner.record)
            .field("replies", &self.inner.replies)
            .finish()
    }
}

impl Comment {
    fn build(
        id: u64,
        session: Session,
        target: Option<CommentTarget>,
        record: LazyCell<CommentRecord>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                id,
                session,
                target,
                record,
                replies: LazyCell::new(),
                parent: Mutex::new(None),
            }),
        }
    }

    /// An unloaded handle to comment `id`.
    pub fn new(id: u64, session: Session) -> Self {
        Self::build(id, session, None, LazyCell::new())
    }

    fn from_record(session: Session, record: CommentRecord, target: Option<CommentTarget>) -> Self {
        let target = record.chapter_id.map(CommentTarget::Chapter).or(target);
        Self::build(record.id, session, target, LazyCell::loaded(record))
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    pub fn author(&self) -> Result<Option<String>> {
        Ok(self.record()?.author.clone())
    }

    pub fn text(&self) -> Result<String> {
        Ok(self.record()?.text.clone())
    }

    pub fn target(&self) -> Result<CommentTarget> {
        if let Some(target) = self.inner.target {
            return Ok(target);
        }
        self.record()?
            .chapter_id
            .map(CommentTarget::Chapter)
            .ok_or_else(|| Ao3ApiError::parsing(format!("comment {} has no chapter", self.id())))
    }

    /// Direct replies. Fails with [`Ao3ApiError::Unloaded`] until [`Comment::get_thread`] ran.
    pub fn replies(&self) -> Result<Arc<Vec<Comment>>> {
        self.inner.replies.get_loaded("call get_thread() first")
    }

    pub fn replies_loaded(&self) -> bool {
        self.inner.replies.is_loaded()
    }

    /// The comment this one replies to, known once [`Comment::get_thread`]
    /// followed a "Parent Thread" link.
    pub fn parent(&self) -> Option<Comment> {
        self.inner.parent.lock().clone()
    }

    /// Loads the whole reply tree under this comment.
    ///
    /// Subtrees the page cuts short are fetched from their own pages, one
    /// request at a time, in display order. For a reply, the parent's thread
    /// is walked and this comment takes the replies found there. The parent
    /// keeps its own handle for this comment.
    pub fn get_thread(&self) -> Result<()> {
        let session = self.inner.session.clone();
        let id = self.inner.id;
        let target = self.inner.target;
        let mut root: Option<ThreadNode> = None;
        let mut parent: Option<Comment> = None;
        self.inner.replies.reload(|| {
            let body = session.get(&format!("/comments/{id}"))?;
            let node = parse_thread(&body, id)?;
            let replies = match parent_thread_id(&body, id)? {
                Some(parent_id) => {
                    debug!("comment {id} is a reply, walking thread of {parent_id}");
                    let thread = Comment::build(parent_id, session.clone(), target, LazyCell::new());
                    thread.get_thread()?;
                    let found = thread.descendants()?.into_iter().find(|c| c.id() == id);
                    parent = Some(thread);
                    match found {
                        Some(copy) => (*copy.replies()?).clone(),
                        None => build_replies(&session, &node.replies, target)?,
                    }
                }
                None => build_replies(&session, &node.replies, target)?,
            };
            root = Some(node);
            Ok(replies)
        })?;
        if let Some(node) = root {
            self.inner.record.reload(|| Ok(node.record))?;
        }
        if let Some(thread) = parent {
            let direct = thread.find_parent_of(id).unwrap_or(thread);
            *self.inner.parent.lock() = Some(direct);
        }
        Ok(())
    }

    /// Loads the reply tree from this comment's own page only.
    fn load_own_thread(&self) -> Result<()> {
        let session = self.inner.session.clone();
        let id = self.inner.id;
        let target = self.inner.target;
        self.inner.replies.reload(|| {
            let body = session.get(&format!("/comments/{id}"))?;
            let node = parse_thread(&body, id)?;
            build_replies(&session, &node.replies, target)
        })?;
        Ok(())
    }

    /// The comment in this loaded tree whose direct replies include `id`.
    fn find_parent_of(&self, id: u64) -> Option<Comment> {
        let replies = self.replies().ok()?;
        if replies.iter().any(|r| r.id() == id) {
            return Some(self.clone());
        }
        replies.iter().find_map(|reply| reply.find_parent_of(id))
    }

    pub fn get_thread_threaded(&self) -> ThreadHandle<()> {
        let this = self.clone();
        ThreadHandle::spawn(move || this.get_thread())
    }

    /// Every comment below this one, depth-first in display order.
    pub fn descendants(&self) -> Result<Vec<Comment>> {
        let mut out = Vec::new();
        self.collect_descendants(&mut out)?;
        Ok(out)
    }

    fn collect_descendants(&self, out: &mut Vec<Comment>) -> Result<()> {
        for reply in self.replies()?.iter() {
            out.push(reply.clone());
            reply.collect_descendants(out)?;
        }
        Ok(())
    }

    pub fn reply(&self, text: &str) -> Result<()> {
        let target = self.target()?;
        self.inner.session.reply_to_comment(target, self.inner.id, text)
    }

    pub fn delete(&self) -> Result<()> {
        self.inner.session.delete_comment(self.inner.id)
    }
}

fn build_replies(
    session: &Session,
    nodes: &[ThreadNode],
    target: Option<CommentTarget>,
) -> Result<Vec<Comment>> {
    let mut replies = Vec::with_capacity(nodes.len());
    for node in nodes {
        let comment = Comment::from_record(session.clone(), node.record.clone(), target);
        if node.truncated {
            debug!("comment {} is truncated, fetching its own page", node.record.id);
            comment.load_own_thread()?;
        } else {
            let children = build_replies(session, &node.replies, target)?;
            comment.inner.replies.fill(children);
        }
        replies.push(comment);
    }
    Ok(replies)
}

impl Loadable for Comment {
    type Record = CommentRecord;

    fn cell(&self) -> &LazyCell<CommentRecord> {
        &self.inner.record
    }

    fn fetch(&self) -> Result<CommentRecord> {
        let body = self.inner.session.get(&format!("/comments/{}", self.inner.id))?;
        Ok(parse_thread(&body, self.inner.id)?.record)
    }
}

/// Top-level comments on pages `page_start..=page_end` of `target`.
///
/// Pages are fetched one after another and the walk stops at the last page
/// that exists. Replies are left unloaded.
pub fn get_comments(
    session: &Session,
    target: CommentTarget,
    page_start: u32,
    page_end: u32,
) -> Result<Vec<Comment>> {
    if page_start == 0 {
        return Err(Ao3ApiError::invalid_argument("comment pages start at 1"));
    }
    if page_start > page_end {
        return Err(Ao3ApiError::invalid_argument(format!(
            "page range {page_start}..={page_end} is empty"
        )));
    }
    let mut comments = Vec::new();
    for page in page_start..=page_end {
        let body = session.get(&target.listing_path(page))?;
        let (nodes, pages) = parse_comment_listing(&body)?;
        debug!("{target:?} comment page {page}/{pages}: {} threads", nodes.len());
        comments.extend(
            nodes
                .into_iter()
                .map(|node| Comment::from_record(session.clone(), node.record, Some(target))),
        );
        if page >= pages {
            break;
        }
    }
    Ok(comments)
}
