//! Client configuration.
//!
//! Everything here can be built in code or read from a JSON file. Credentials
//! are never part of the config file; they come from [`LoginInfo`](crate::networking::LoginInfo).

use crate::Result;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://archiveofourown.org";

/// A current desktop Firefox string; the archive serves bots a different page set.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:131.0) Gecko/20100101 Firefox/131.0";

/// Client-side throttle settings. See [`RateLimiter`](crate::networking::RateLimiter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    pub window_secs: u64,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub max_redirects: usize,
    pub rate_limit: Option<RateLimitConfig>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 60,
            max_redirects: 5,
            rate_limit: None,
        }
    }
}

impl ClientConfig {
    /// Reads a JSON config. Missing keys fall back to the defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let mut config: ClientConfig = serde_json::from_str(raw)?;
        config.base_url = config.base_url.trim_end_matches('/').to_string();
        Ok(config)
    }

    pub fn with_rate_limit(mut self, max_requests: usize, window_secs: u64) -> Self {
        self.rate_limit = Some(RateLimitConfig {
            max_requests,
            window_secs,
        });
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
