use crate::errors::Ao3ApiError;
use crate::extraction::listing::parse_listing;
use crate::extraction::user::{parse_listing_totals, parse_profile};
use crate::lazy::{LazyCell, Loadable};
use crate::session::{Session, SubscriptionKind};
use crate::types::{UserProfile, WorkSummary};
use crate::Result;
use log::debug;
use std::fmt;
use std::sync::Arc;
use std::thread;

struct Inner {
    username: String,
    session: Session,
    profile: LazyCell<UserProfile>,
}

/// An archive account, identified by username.
#[derive(Clone)]
pub struct User {
    inner: Arc<Inner>,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("username", &self.inner.username)
            .field("profile", &self.inner.profile)
            .finish()
    }
}

fn not_found_as_invalid(result: Result<String>, username: &str) -> Result<String> {
    match result {
        Err(Ao3ApiError::Http { status: 404, .. }) => {
            Err(Ao3ApiError::InvalidId(format!("cannot find user {username}")))
        }
        other => other,
    }
}

fn join_page(handle: thread::ScopedJoinHandle<'_, Result<String>>) -> Result<String> {
    handle
        .join()
        .unwrap_or_else(|_| Err(Ao3ApiError::GenericError("worker thread panicked".to_string())))
}

impl User {
    pub fn new(username: &str, session: Session) -> Self {
        Self {
            inner: Arc::new(Inner {
                username: username.to_string(),
                session,
                profile: LazyCell::new(),
            }),
        }
    }

    pub fn load(username: &str, session: Session) -> Result<Self> {
        let user = Self::new(username, session);
        user.reload()?;
        Ok(user)
    }

    pub fn username(&self) -> &str {
        &self.inner.username
    }

    pub fn url(&self) -> String {
        self.inner
            .session
            .requester()
            .url(&format!("/users/{}", self.inner.username))
    }

    pub fn user_id(&self) -> Result<Option<u64>> {
        Ok(self.record()?.user_id)
    }

    pub fn bio(&self) -> Result<Option<String>> {
        Ok(self.record()?.bio.clone())
    }

    pub fn works(&self) -> Result<u64> {
        Ok(self.record()?.works)
    }

    pub fn bookmarks(&self) -> Result<u64> {
        Ok(self.record()?.bookmarks)
    }

    pub fn work_pages(&self) -> Result<u32> {
        Ok(self.record()?.work_pages)
    }

    pub fn bookmark_pages(&self) -> Result<u32> {
        Ok(self.record()?.bookmark_pages)
    }

    fn listing(&self, kind: &str, page: u32) -> Result<Vec<WorkSummary>> {
        if page == 0 {
            return Err(Ao3ApiError::invalid_argument("pages start at 1"));
        }
        let path = format!("/users/{}/{kind}?page={page}", self.inner.username);
        let body = not_found_as_invalid(self.inner.session.get(&path), &self.inner.username)?;
        parse_listing(&body)
    }

    /// One page of the works this user posted.
    pub fn get_works(&self, page: u32) -> Result<Vec<WorkSummary>> {
        self.listing("works", page)
    }

    /// One page of this user's public bookmarks.
    pub fn get_bookmarks(&self, page: u32) -> Result<Vec<WorkSummary>> {
        self.listing("bookmarks", page)
    }

    fn user_id_for_subscription(&self) -> Result<u64> {
        self.user_id()?
            .ok_or_else(|| Ao3ApiError::parsing("profile does not show a user id"))
    }

    pub fn subscribe(&self) -> Result<()> {
        let id = self.user_id_for_subscription()?;
        self.inner.session.subscribe(SubscriptionKind::User, id)
    }

    pub fn unsubscribe(&self) -> Result<()> {
        let id = self.user_id_for_subscription()?;
        let subscription_id = self
            .record()?
            .subscription_id
            .ok_or_else(|| Ao3ApiError::invalid_argument("you are not subscribed to this user"))?;
        self.inner
            .session
            .unsubscribe(SubscriptionKind::User, id, subscription_id)
    }
}

impl Loadable for User {
    type Record = UserProfile;

    fn cell(&self) -> &LazyCell<UserProfile> {
        &self.inner.profile
    }

    /// Profile, works and bookmarks pages, fetched side by side.
    fn fetch(&self) -> Result<UserProfile> {
        let username = self.inner.username.as_str();
        let session = &self.inner.session;
        let get = |path: String| not_found_as_invalid(session.get(&path), username);
        let (profile, works, bookmarks) = thread::scope(|scope| {
            let profile = scope.spawn(|| get(format!("/users/{username}/profile")));
            let works = scope.spawn(|| get(format!("/users/{username}/works")));
            let bookmarks = get(format!("/users/{username}/bookmarks"));
            (join_page(profile), join_page(works), bookmarks)
        });

        let mut record = parse_profile(&profile?, username)?;
        (record.works, record.work_pages) = parse_listing_totals(&works?)?;
        (record.bookmarks, record.bookmark_pages) = parse_listing_totals(&bookmarks?)?;
        debug!(
            "user {username}: {} works, {} bookmarks",
            record.works, record.bookmarks
        );
        Ok(record)
    }
}
