//! Blocking authentication implementation for AO3
use crate::errors::Ao3ApiError;
use crate::networking::client::blocking::{Request, Requester};
use crate::Result;
use log::{debug, info, warn};
use reqwest::cookie::Jar;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

const LOGIN_PATH: &str = "/users/login";
const TOKEN_DISPENSER_PATH: &str = "/token_dispenser.json";
const BAD_CREDENTIALS_MARKERS: [&str; 2] = [
    "doesn't match our records",
    "The password or user name you entered",
];

/// Login information for AO3 authentication
#[derive(Clone)]
pub struct LoginInfo {
    pub username: Box<str>,
    pub password: Box<str>,
}

impl fmt::Debug for LoginInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginInfo")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl LoginInfo {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Reads a login file: username on the first line, password on the second.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = fs::read_to_string(path)?;
        let mut lines = file.lines().map(str::trim);
        let username = lines
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Ao3ApiError::invalid_argument("username not found in login file"))?;
        let password = lines
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Ao3ApiError::invalid_argument("password not found in login file"))?;
        Ok(Self::new(username, password))
    }
}

/// Authentication token from AO3
#[derive(Deserialize, Debug)]
pub struct Token {
    pub token: String,
}

/// Get an auth token for the jar's session from the token dispenser
pub fn get_token(requester: &Requester, jar: &Jar) -> Result<String> {
    let body = requester.get_text(TOKEN_DISPENSER_PATH, Some(jar))?;
    let token: Token = serde_json::from_str(&body)?;
    debug!("received authenticity token");
    Ok(token.token)
}

/// Runs the login form exchange against a fresh cookie jar.
///
/// The jar is only handed back when the archive accepted the credentials, so a
/// failed attempt leaves no cookies behind anywhere.
pub fn login(requester: &Requester, info: &LoginInfo) -> Result<Arc<Jar>> {
    let jar = Arc::new(Jar::default());
    let token = get_token(requester, &jar)?;

    let request = Request::post(LOGIN_PATH)
        .form("authenticity_token", token)
        .form("user[login]", &*info.username)
        .form("user[password]", &*info.password)
        .form("commit", "Log In");
    let response = requester.send_raw(&request, Some(&*jar))?;

    match response.status {
        429 => Err(Ao3ApiError::RateLimit {
            retry_after: response.retry_after(),
        }),
        status if response.is_redirect() => {
            let location = response.location().unwrap_or_default();
            if location.contains(LOGIN_PATH) || location.contains("/auth_error") {
                warn!("login for {} bounced back to {location}", info.username);
                Err(Ao3ApiError::Login("Invalid username or password".to_string()))
            } else {
                info!("logged in as {} ({status})", info.username);
                Ok(jar)
            }
        }
        status if status >= 500 => Err(Ao3ApiError::Http {
            status,
            url: response.url,
        }),
        _ => {
            let body = response.text();
            if BAD_CREDENTIALS_MARKERS.iter().any(|m| body.contains(m)) {
                warn!("login for {} refused", info.username);
            } else {
                warn!(
                    "login for {} returned {} without a redirect",
                    info.username, response.status
                );
            }
            Err(Ao3ApiError::Login("Invalid username or password".to_string()))
        }
    }
}
