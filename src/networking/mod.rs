//! Networking with Archive of Our Own.
//!
//! This module provides:
//! - a [`Transport`] seam with a reqwest-backed [`HttpTransport`]
//! - the process-wide [`RateLimiter`]
//! - [`Requester`], which throttles, carries cookies, follows redirects and
//!   classifies failures
//! - the login form exchange
//!
//! ## Usage
//!
//! ```no_run
//! use ao3_api::config::ClientConfig;
//! use ao3_api::networking::Requester;
//!
//! let config = ClientConfig::default().with_rate_limit(40, 60);
//! let requester = Requester::from_config(&config).expect("Failed to create client");
//! let html = requester
//!     .get_text("/works/123456", None)
//!     .expect("Failed to fetch page");
//! ```

pub mod auth;
pub mod client;
pub mod ratelimit;

pub use auth::blocking::{get_token, login};
pub use auth::{LoginInfo, Token};
pub use client::blocking::{HttpTransport, Requester, create_client};
pub use client::{Method, Request, Response, Transport};
pub use ratelimit::RateLimiter;

pub use reqwest::Error as NetworkError;
pub use reqwest::cookie::Jar;
