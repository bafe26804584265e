//! Guest and logged-in sessions.
//!
//! A [`Session`] is a cheap, cloneable handle: entities keep a clone and every
//! request they make goes through it, so they share its cookie jar, its auth
//! token and the process-wide rate limiter of its [`Requester`].

use crate::comments::CommentTarget;
use crate::config::ClientConfig;
use crate::errors::Ao3ApiError;
use crate::extraction::listing::{parse_listing, parse_subscriptions, parse_user_listing_total};
use crate::extraction::{extract_auth_token, extract_bookmark_pseud, extract_comment_pseud};
use crate::lazy::ThreadHandle;
use crate::networking::{LoginInfo, Request, Requester, Response, login};
use crate::types::{Subscription, WorkSummary};
use crate::utils::page_count;
use crate::Result;
use log::{debug, info, warn};
use parking_lot::RwLock;
use reqwest::Url;
use reqwest::cookie::{CookieStore, Jar};
use scraper::Html;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

const MAX_COMMENT_LEN: usize = 10_000;

/// What a subscription points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionKind {
    Work,
    Series,
    User,
}

impl SubscriptionKind {
    fn as_str(self) -> &'static str {
        match self {
            SubscriptionKind::Work => "Work",
            SubscriptionKind::Series => "Series",
            SubscriptionKind::User => "User",
        }
    }
}

/// Fields of the bookmark form.
#[derive(Debug, Clone, Default)]
pub struct BookmarkOptions {
    pub notes: String,
    pub tags: Vec<String>,
    pub collections: Vec<String>,
    pub private: bool,
    pub recommend: bool,
    /// Pseud id to bookmark under; the work page's default when `None`.
    pub pseud: Option<String>,
}

/// Name and email a guest comments under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestIdentity {
    pub name: String,
    pub email: String,
}

struct SessionState {
    jar: Arc<Jar>,
    username: Option<String>,
    token: Option<String>,
    guest_identity: Option<GuestIdentity>,
}

struct Inner {
    requester: Requester,
    state: RwLock<SessionState>,
}

#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("Session")
            .field("username", &state.username)
            .field("has_token", &state.token.is_some())
            .field("requester", &self.inner.requester)
            .finish()
    }
}

/// Error kinds the archive reports in the JSON body of a 422.
fn json_errors(body: &str) -> Vec<String> {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return Vec::new();
    };
    match value.get("errors") {
        Some(serde_json::Value::Object(map)) => map.keys().cloned().collect(),
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(serde_json::Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}

fn stale_token() -> Ao3ApiError {
    Ao3ApiError::auth("invalid authentication token; call refresh_auth_token()")
}

impl Session {
    fn with_state(requester: Requester, state: SessionState) -> Self {
        Self {
            inner: Arc::new(Inner {
                requester,
                state: RwLock::new(state),
            }),
        }
    }

    /// An anonymous session. Only guest actions are available.
    pub fn guest(requester: Requester) -> Self {
        Self::with_state(
            requester,
            SessionState {
                jar: Arc::new(Jar::default()),
                username: None,
                token: None,
                guest_identity: None,
            },
        )
    }

    /// Guest session over a real HTTP client built from `config`.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Ok(Self::guest(Requester::from_config(config)?))
    }

    /// Logs in and returns an authenticated session.
    pub fn login(requester: Requester, username: &str, password: &str) -> Result<Self> {
        let session = Self::guest(requester);
        session.login_with(&LoginInfo::new(username, password))?;
        Ok(session)
    }

    /// Upgrades this session in place. On failure nothing about it changes.
    pub fn login_with(&self, info: &LoginInfo) -> Result<()> {
        let jar = login(&self.inner.requester, info)?;
        let mut state = self.inner.state.write();
        state.jar = jar;
        state.username = Some(info.username.to_string());
        state.token = None;
        info!("session now authenticated as {}", info.username);
        Ok(())
    }

    pub fn is_authed(&self) -> bool {
        self.inner.state.read().username.is_some()
    }

    pub fn username(&self) -> Option<String> {
        self.inner.state.read().username.clone()
    }

    pub fn requester(&self) -> &Requester {
        &self.inner.requester
    }

    pub fn jar(&self) -> Arc<Jar> {
        self.inner.state.read().jar.clone()
    }

    /// True if the jar holds any cookie for the archive.
    pub fn has_cookies(&self) -> bool {
        Url::parse(self.inner.requester.base_url())
            .ok()
            .and_then(|url| self.jar().cookies(&url))
            .is_some()
    }

    pub fn auth_token(&self) -> Option<String> {
        self.inner.state.read().token.clone()
    }

    pub fn set_auth_token(&self, token: impl Into<String>) {
        self.inner.state.write().token = Some(token.into());
    }

    pub fn set_guest_identity(&self, name: &str, email: &str) {
        self.inner.state.write().guest_identity = Some(GuestIdentity {
            name: name.to_string(),
            email: email.to_string(),
        });
    }

    /// Sends `request` with this session's cookies, following GET redirects
    /// and mapping failures to errors.
    pub fn fetch(&self, request: &Request) -> Result<Response> {
        let jar = self.jar();
        self.inner.requester.fetch(request, Some(&*jar))
    }

    /// One hop with this session's cookies; the status is left to the caller.
    pub fn send_raw(&self, request: &Request) -> Result<Response> {
        let jar = self.jar();
        self.inner.requester.send_raw(request, Some(&*jar))
    }

    /// GET a page on the archive and return its text.
    pub fn get(&self, path: &str) -> Result<String> {
        Ok(self.fetch(&Request::get(path))?.text())
    }

    fn require_user(&self) -> Result<String> {
        self.username()
            .ok_or_else(|| Ao3ApiError::auth("this action needs a logged-in session"))
    }

    fn require_token(&self) -> Result<String> {
        self.auth_token()
            .ok_or_else(|| Ao3ApiError::auth("no authentication token; call refresh_auth_token()"))
    }

    /// Reads a fresh authenticity token and keeps it for later actions.
    ///
    /// Logged-in sessions read it from their own user page; the root page's
    /// token only works for guests.
    pub fn refresh_auth_token(&self) -> Result<String> {
        let path = match self.username() {
            Some(username) => format!("/users/{username}"),
            None => "/".to_string(),
        };
        let body = self.get(&path)?;
        let token = extract_auth_token(&body)?
            .ok_or_else(|| Ao3ApiError::parsing("couldn't find an authenticity token"))?;
        debug!("refreshed authenticity token");
        self.set_auth_token(token.clone());
        Ok(token)
    }

    pub fn refresh_auth_token_threaded(&self) -> ThreadHandle<String> {
        let this = self.clone();
        ThreadHandle::spawn(move || this.refresh_auth_token())
    }

    /// Leaves kudos on a work. `Ok(false)` means this account or address already did.
    pub fn leave_kudos(&self, work_id: u64) -> Result<bool> {
        let token = self.require_token()?;
        let request = Request::post("/kudos.js")
            .header("x-csrf-token", token.as_str())
            .header("x-requested-with", "XMLHttpRequest")
            .header("referer", self.inner.requester.url(&format!("/works/{work_id}")))
            .form("authenticity_token", token)
            .form("kudo[commentable_id]", work_id.to_string())
            .form("kudo[commentable_type]", "Work");
        let response = self.send_raw(&request)?;
        match response.status {
            201 => {
                info!("left kudos on work {work_id}");
                Ok(true)
            }
            422 => {
                let errors = json_errors(&response.text());
                if errors.iter().any(|e| e == "auth_error") {
                    Err(stale_token())
                } else if errors.iter().any(|e| e == "user_id" || e == "ip_address") {
                    debug!("kudos already left on work {work_id}");
                    Ok(false)
                } else if errors.iter().any(|e| e == "no_commentable") {
                    Err(Ao3ApiError::InvalidId(format!("no work with id {work_id}")))
                } else {
                    Err(Ao3ApiError::parsing(format!(
                        "unexpected kudos response: {}",
                        response.text()
                    )))
                }
            }
            429 => Err(Ao3ApiError::RateLimit {
                retry_after: response.retry_after(),
            }),
            status => Err(Ao3ApiError::Http {
                status,
                url: response.url,
            }),
        }
    }

    pub fn leave_kudos_threaded(&self, work_id: u64) -> ThreadHandle<bool> {
        let this = self.clone();
        ThreadHandle::spawn(move || this.leave_kudos(work_id))
    }

    /// Comments on a whole work (`chapter_id == None`) or on one chapter.
    pub fn post_comment(&self, work_id: u64, chapter_id: Option<u64>, text: &str) -> Result<()> {
        let target = match chapter_id {
            Some(id) => CommentTarget::Chapter(id),
            None => CommentTarget::Work(work_id),
        };
        self.send_comment(target, None, text)
    }

    /// Replies to `comment_id`, which was left on `target`.
    pub fn reply_to_comment(&self, target: CommentTarget, comment_id: u64, text: &str) -> Result<()> {
        self.send_comment(target, Some(comment_id), text)
    }

    fn send_comment(&self, target: CommentTarget, parent: Option<u64>, text: &str) -> Result<()> {
        let length = text.chars().count();
        if length == 0 || length > MAX_COMMENT_LEN {
            return Err(Ao3ApiError::invalid_argument(format!(
                "comments must have between 1 and {MAX_COMMENT_LEN} characters, got {length}"
            )));
        }
        let token = self.require_token()?;

        let mut request = Request::post("/comments.js")
            .header("x-requested-with", "XMLHttpRequest")
            .header("x-csrf-token", token.as_str());
        request = match target {
            CommentTarget::Work(id) => request.form("work_id", id.to_string()),
            CommentTarget::Chapter(id) => request.form("chapter_id", id.to_string()),
        };
        if let Some(parent) = parent {
            request = request.form("comment_id", parent.to_string());
        }
        request = request.form("authenticity_token", token);

        if self.is_authed() {
            let page = self.get(&target.path())?;
            let pseud = extract_comment_pseud(&page)?
                .ok_or_else(|| Ao3ApiError::parsing("couldn't find your pseud's id"))?;
            request = request.form("comment[pseud_id]", pseud);
        } else {
            let identity = self.inner.state.read().guest_identity.clone().ok_or_else(|| {
                Ao3ApiError::invalid_argument("guests need a name and email; call set_guest_identity()")
            })?;
            request = request
                .form("comment[email]", identity.email)
                .form("comment[name]", identity.name);
        }
        request = request.form("comment[comment_content]", text);

        let response = self.send_raw(&request)?;
        match response.status {
            201 => {
                info!("posted comment on {target:?}");
                Ok(())
            }
            404 if response.body.is_empty() => Err(Ao3ApiError::InvalidId(format!(
                "{target:?} does not exist"
            ))),
            404 => Ok(()),
            422 => {
                if json_errors(&response.text()).iter().any(|e| e == "auth_error") {
                    Err(stale_token())
                } else {
                    Err(Ao3ApiError::parsing(format!(
                        "unexpected comment response: {}",
                        response.text()
                    )))
                }
            }
            200 => Err(Ao3ApiError::DuplicateComment(
                "you have already left this comment here".to_string(),
            )),
            429 => Err(Ao3ApiError::RateLimit {
                retry_after: response.retry_after(),
            }),
            status => Err(Ao3ApiError::Http {
                status,
                url: response.url,
            }),
        }
    }

    /// Deletes one of this account's comments.
    pub fn delete_comment(&self, comment_id: u64) -> Result<()> {
        self.require_user()?;
        let token = self.require_token()?;
        let request = Request::post(format!("/comments/{comment_id}"))
            .form("authenticity_token", token)
            .form("_method", "delete");
        let response = self.interpret_form_post(&request)?;
        let body = response.text().to_lowercase();
        if body.contains("auth error") {
            return Err(stale_token());
        }
        if body.contains("you don't have permission") {
            return Err(Ao3ApiError::auth(format!(
                "no permission to delete comment {comment_id}"
            )));
        }
        info!("deleted comment {comment_id}");
        Ok(())
    }

    /// Bookmarks a work. The pseud defaults to the one preselected on the work page.
    pub fn bookmark(&self, work_id: u64, options: &BookmarkOptions) -> Result<()> {
        self.require_user()?;
        let token = self.require_token()?;
        let pseud = match &options.pseud {
            Some(pseud) => pseud.clone(),
            None => {
                let page = self.get(&format!("/works/{work_id}"))?;
                extract_bookmark_pseud(&page)?
                    .ok_or_else(|| Ao3ApiError::parsing("couldn't find your pseud's id"))?
            }
        };
        let flag = |on: bool| if on { "1" } else { "0" };
        let request = Request::post(format!("/works/{work_id}/bookmarks"))
            .form("authenticity_token", token)
            .form("bookmark[pseud_id]", pseud)
            .form("bookmark[bookmarker_notes]", options.notes.as_str())
            .form("bookmark[tag_string]", options.tags.join(","))
            .form("bookmark[collection_names]", options.collections.join(","))
            .form("bookmark[private]", flag(options.private))
            .form("bookmark[rec]", flag(options.recommend))
            .form("commit", "Create");
        self.interpret_form_post(&request)?;
        info!("bookmarked work {work_id}");
        Ok(())
    }

    pub fn delete_bookmark(&self, bookmark_id: u64) -> Result<()> {
        self.require_user()?;
        let token = self.require_token()?;
        let request = Request::post(format!("/bookmarks/{bookmark_id}"))
            .form("authenticity_token", token)
            .form("_method", "delete");
        self.interpret_form_post(&request)?;
        info!("deleted bookmark {bookmark_id}");
        Ok(())
    }

    /// Subscribes to a work, series or user (users by their numeric user id).
    pub fn subscribe(&self, kind: SubscriptionKind, id: u64) -> Result<()> {
        let username = self.require_user()?;
        let token = self.require_token()?;
        let request = Request::post(format!("/users/{username}/subscriptions"))
            .form("authenticity_token", token)
            .form("subscription[subscribable_id]", id.to_string())
            .form("subscription[subscribable_type]", kind.as_str());
        let response = self.interpret_form_post(&request)?;
        if !response.is_redirect() {
            return Err(Ao3ApiError::InvalidId(format!(
                "cannot subscribe to {} {id}",
                kind.as_str()
            )));
        }
        info!("subscribed to {} {id}", kind.as_str());
        Ok(())
    }

    pub fn unsubscribe(&self, kind: SubscriptionKind, id: u64, subscription_id: u64) -> Result<()> {
        let username = self.require_user()?;
        let token = self.require_token()?;
        let request = Request::post(format!("/users/{username}/subscriptions/{subscription_id}"))
            .form("authenticity_token", token)
            .form("subscription[subscribable_id]", id.to_string())
            .form("subscription[subscribable_type]", kind.as_str())
            .form("_method", "delete");
        self.interpret_form_post(&request)?;
        info!("unsubscribed from {} {id}", kind.as_str());
        Ok(())
    }

    /// Sends a classic (non-XHR) form post; a bounce to `/auth_error` is a stale token.
    fn interpret_form_post(&self, request: &Request) -> Result<Response> {
        let response = self.fetch(request)?;
        if response.is_redirect()
            && response
                .location()
                .is_some_and(|l| l.contains("/users/login"))
        {
            warn!("{} bounced to the login page", request.url);
            return Err(Ao3ApiError::auth("the archive asked to log in again"));
        }
        Ok(response)
    }

    fn bookmarks_path(&self, page: u32) -> Result<String> {
        let username = self.require_user()?;
        if page == 0 {
            return Err(Ao3ApiError::invalid_argument("pages start at 1"));
        }
        Ok(format!("/users/{username}/bookmarks?page={page}"))
    }

    fn subscriptions_path(&self, page: u32) -> Result<String> {
        let username = self.require_user()?;
        if page == 0 {
            return Err(Ao3ApiError::invalid_argument("pages start at 1"));
        }
        Ok(format!("/users/{username}/subscriptions?page={page}"))
    }

    /// One page of this account's bookmarks.
    pub fn get_bookmarks(&self, page: u32) -> Result<Vec<WorkSummary>> {
        let body = self.get(&self.bookmarks_path(page)?)?;
        parse_listing(&body)
    }

    pub fn bookmark_pages(&self) -> Result<u32> {
        let body = self.get(&self.bookmarks_path(1)?)?;
        page_count(&Html::parse_document(&body))
    }

    /// Total bookmarks of this account, as the bookmarks page announces it.
    pub fn bookmark_count(&self) -> Result<u64> {
        let body = self.get(&self.bookmarks_path(1)?)?;
        parse_user_listing_total(&body)
    }

    /// Every bookmark page, one worker per page, in page order without repeats.
    pub fn get_all_bookmarks_threaded(&self) -> Result<Vec<WorkSummary>> {
        let pages = self.bookmark_pages()?;
        let handles: Vec<ThreadHandle<Vec<WorkSummary>>> = (1..=pages)
            .map(|page| {
                let this = self.clone();
                ThreadHandle::spawn(move || this.get_bookmarks(page))
            })
            .collect();
        let mut seen = HashSet::new();
        let mut all = Vec::new();
        for handle in handles {
            for work in handle.wait()? {
                if work.id.is_none_or(|id| seen.insert(id)) {
                    all.push(work);
                }
            }
        }
        Ok(all)
    }

    /// One page of this account's subscriptions.
    pub fn get_subscriptions(&self, page: u32) -> Result<Vec<Subscription>> {
        let body = self.get(&self.subscriptions_path(page)?)?;
        parse_subscriptions(&body)
    }

    pub fn subscription_pages(&self) -> Result<u32> {
        let body = self.get(&self.subscriptions_path(1)?)?;
        page_count(&Html::parse_document(&body))
    }
}
