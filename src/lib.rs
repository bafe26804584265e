//! # ao3-api
//!
//! A blocking client for Archive of Our Own.
//!
//! Works, users, series and comments are lazy handles: each fetches its page
//! the first time a field is read and keeps the parsed snapshot until it is
//! reloaded. Every request goes through one [`Session`], which owns the
//! cookie jar, the CSRF token and a shared rate limiter.
//!
//! ## Usage
//!
//! ```no_run
//! use ao3_api::{ClientConfig, Constraint, Search, SearchQuery, Session, Work};
//!
//! let session = Session::from_config(&ClientConfig::default())?;
//! let work = Work::new(123456, session.clone());
//! println!("{} by {:?}", work.title()?, work.authors()?);
//!
//! let query = SearchQuery::new()
//!     .fandoms("Star Trek")
//!     .word_count(Constraint::between(5000, 15000)?);
//! let page = Search::new(query, session).execute(1)?;
//! println!("{} results", page.total_results);
//! # Ok::<(), ao3_api::Ao3ApiError>(())
//! ```

pub mod comments;
pub mod config;
pub mod errors;
pub mod extraction;
pub mod lazy;
pub mod networking;
pub mod resources;
pub mod search;
pub mod series;
pub mod session;
pub mod types;
pub mod users;
pub mod utils;
pub mod works;

pub type Result<T> = std::result::Result<T, Ao3ApiError>;

pub use comments::{Comment, CommentTarget, get_comments};
pub use config::{ClientConfig, RateLimitConfig};
pub use errors::Ao3ApiError;
pub use lazy::{LazyCell, LoadState, Loadable, ThreadHandle, reload_all};
pub use networking::{Requester, Transport};
pub use resources::ResourceStore;
pub use search::{Constraint, Rating, Search, SearchPage, SearchQuery, SortColumn, SortDirection};
pub use series::Series;
pub use session::{BookmarkOptions, Session, SubscriptionKind};
pub use types::*;
pub use users::User;
pub use works::{DownloadFormat, Work};
