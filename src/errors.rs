use thiserror::Error;

/// Every failure the client can surface.
///
/// Nothing in the crate retries on its own: rate limiting, stale tokens and
/// unloaded secondary content are all handed back to the caller to act on.
#[derive(Error, Debug)]
pub enum Ao3ApiError {
    /// Credentials invalid, token missing or rejected, or the resource needs
    /// an authenticated session.
    #[error("authentication error: {0}")]
    Auth(String),
    /// Initial login was refused. Treated as an auth error by [`Ao3ApiError::is_auth`].
    #[error("login failed: {0}")]
    Login(String),
    /// The archive throttled us. `retry_after` is the server hint in seconds, if any.
    #[error("rate limited by the archive (retry after {retry_after:?} seconds)")]
    RateLimit { retry_after: Option<u64> },
    /// A secondary field was read before its explicit loader ran.
    #[error("not loaded: {0}")]
    Unloaded(String),
    #[error("unexpected HTTP status {status} for {url}")]
    Http { status: u16, url: String },
    /// The page did not have the shape we expected.
    #[error("parsing error: {0}")]
    Parsing(String),
    #[error("invalid id: {0}")]
    InvalidId(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("duplicate comment: {0}")]
    DuplicateComment(String),
    /// An entity is in the failed state; call `reload()` to retry.
    #[error("previous load failed: {0}")]
    LoadFailed(String),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Selector error: {0}")]
    SelectorError(String),
    #[error("regex error: {0}")]
    RegexError(String),
    #[error("serde error: {0}")]
    SerdeError(#[from] serde_json::Error),
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("{0}")]
    GenericError(String),
}

impl Ao3ApiError {
    pub fn auth(msg: impl Into<String>) -> Self {
        Ao3ApiError::Auth(msg.into())
    }

    pub fn parsing(msg: impl Into<String>) -> Self {
        Ao3ApiError::Parsing(msg.into())
    }

    pub fn unloaded(msg: impl Into<String>) -> Self {
        Ao3ApiError::Unloaded(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Ao3ApiError::InvalidArgument(msg.into())
    }

    /// True for plain auth failures and for refused logins.
    pub fn is_auth(&self) -> bool {
        matches!(self, Ao3ApiError::Auth(_) | Ao3ApiError::Login(_))
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Ao3ApiError::RateLimit { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_counts_as_auth() {
        assert!(Ao3ApiError::Login("bad password".into()).is_auth());
        assert!(Ao3ApiError::auth("no token").is_auth());
        assert!(!Ao3ApiError::parsing("x").is_auth());
    }

    #[test]
    fn rate_limit_message_carries_hint() {
        let err = Ao3ApiError::RateLimit {
            retry_after: Some(30),
        };
        assert!(err.is_rate_limit());
        assert!(err.to_string().contains("30"));
    }
}
