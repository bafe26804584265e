//! Blocking HTTP plumbing for AO3
//!
//! [`Transport`] is the raw backend (one request, one response). [`Requester`]
//! layers the process-wide throttle, the session cookie jar, manual redirect
//! handling and status classification on top of it.

use crate::config::ClientConfig;
use crate::errors::Ao3ApiError;
use crate::extraction::is_restricted_notice;
use crate::networking::ratelimit::RateLimiter;
use crate::Result;
use log::{debug, warn};
use reqwest::blocking::Client;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Url, redirect};
use std::fmt;
use std::sync::Arc;

/// Marker of the archive's throttle page, which is served with a 200 now and then.
const THROTTLE_MARKER: &str = "Retry later";
const RESTRICTED_MARKER: &str = "only available to registered users";
/// The throttle page is tiny; anything bigger is real content that may quote the marker.
const THROTTLE_PAGE_MAX_LEN: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Post => f.write_str("POST"),
        }
    }
}

/// An outgoing request. `url` may be absolute or a path on the archive.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub form: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            form: Vec::new(),
            headers: Vec::new(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn queries(mut self, pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        self.query.extend(pairs);
        self
    }

    pub fn form(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// URL with the query pairs appended, percent-encoded.
    pub fn full_url(&self) -> String {
        if self.query.is_empty() {
            return self.url.clone();
        }
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{}{}", self.url, separator, encode_pairs(&self.query))
    }

    /// `application/x-www-form-urlencoded` body of the form pairs.
    pub fn form_body(&self) -> String {
        encode_pairs(&self.form)
    }

    pub fn form_value(&self, key: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

fn encode_pairs(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// What came back from one hop.
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    /// First header with the given name, compared case-insensitively.
    pub fn header<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        self.headers_named(name).next()
    }

    pub fn headers_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 301 | 302 | 303 | 307 | 308)
    }

    pub fn location(&self) -> Option<&str> {
        self.header("location")
    }

    pub fn retry_after(&self) -> Option<u64> {
        self.header("retry-after")
            .and_then(|v| v.trim().parse::<u64>().ok())
    }
}

/// Raw request backend. Implementations do not follow redirects, keep no
/// cookies of their own, and report every status as a plain [`Response`].
pub trait Transport: Send + Sync {
    fn send(&self, request: &Request) -> Result<Response>;
}

/// Create a configured HTTP client for AO3 operations
///
/// Redirects are left to [`Requester`] and cookies to the session jar.
pub fn create_client(config: &ClientConfig) -> std::result::Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        ),
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.5"),
    );
    Client::builder()
        .redirect(redirect::Policy::none())
        .timeout(config.timeout())
        .user_agent(config.user_agent.as_str())
        .default_headers(headers)
        .build()
}

/// [`Transport`] backed by a blocking reqwest client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        Ok(Self {
            client: create_client(config)?,
        })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &Request) -> Result<Response> {
        let url = request.full_url();
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if !request.form.is_empty() {
            builder = builder
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(request.form_body());
        }
        let response = builder.send()?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
            .collect();
        let body = response.bytes()?.to_vec();
        Ok(Response {
            url,
            status,
            headers,
            body,
        })
    }
}

/// The request path every session and entity goes through.
#[derive(Clone)]
pub struct Requester {
    transport: Arc<dyn Transport>,
    limiter: Arc<RateLimiter>,
    base_url: Arc<str>,
    max_redirects: usize,
}

impl fmt::Debug for Requester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Requester")
            .field("base_url", &self.base_url)
            .field("max_redirects", &self.max_redirects)
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

impl Requester {
    pub fn new(transport: Arc<dyn Transport>, limiter: Arc<RateLimiter>) -> Self {
        let defaults = ClientConfig::default();
        Self {
            transport,
            limiter,
            base_url: defaults.base_url.into(),
            max_redirects: defaults.max_redirects,
        }
    }

    /// Real HTTP requester with a limiter built from `config.rate_limit`.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(config)?);
        let limiter = Arc::new(RateLimiter::from_config(config.rate_limit));
        Ok(Self::new(transport, limiter)
            .with_base_url(&config.base_url)
            .with_max_redirects(config.max_redirects))
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').into();
        self
    }

    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Absolute URL for a path on the archive. Absolute inputs pass through.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// One throttled hop with cookies attached and stored, no classification.
    pub fn send_raw(&self, request: &Request, jar: Option<&Jar>) -> Result<Response> {
        let mut request = request.clone();
        request.url = self.url(&request.url);
        let cookie_url = Url::parse(&request.url)
            .map_err(|e| Ao3ApiError::invalid_argument(format!("bad url {}: {e}", request.url)))?;
        if let Some(cookies) = jar.and_then(|jar| jar.cookies(&cookie_url)) {
            if let Ok(value) = cookies.to_str() {
                request.headers.push(("Cookie".to_string(), value.to_string()));
            }
        }

        self.limiter.acquire();
        debug!("{} {}", request.method, request.full_url());
        let response = self.transport.send(&request)?;
        debug!("{} -> {}", request.url, response.status);

        if let Some(jar) = jar {
            let values: Vec<HeaderValue> = response
                .headers_named("set-cookie")
                .filter_map(|v| HeaderValue::from_str(v).ok())
                .collect();
            if !values.is_empty() {
                jar.set_cookies(&mut values.iter(), &cookie_url);
            }
        }
        Ok(response)
    }

    /// Sends `request`, following redirects for GETs, and maps failures to errors.
    pub fn fetch(&self, request: &Request, jar: Option<&Jar>) -> Result<Response> {
        let mut current = request.clone();
        let mut hops = 0;
        loop {
            let response = self.send_raw(&current, jar)?;
            if current.method == Method::Post || !response.is_redirect() {
                return classify(response);
            }
            let location = response
                .location()
                .ok_or_else(|| Ao3ApiError::parsing("redirect without a location header"))?
                .to_string();
            if location.contains("/auth_error") || location.contains("/users/login") {
                return Err(Ao3ApiError::auth(format!(
                    "{} requires an authenticated session",
                    response.url
                )));
            }
            hops += 1;
            if hops > self.max_redirects {
                warn!("too many redirects starting at {}", request.url);
                return Err(Ao3ApiError::Http {
                    status: response.status,
                    url: response.url,
                });
            }
            debug!("following redirect to {location}");
            let mut next = Request::get(self.url(&location));
            next.headers = current.headers.clone();
            current = next;
        }
    }

    /// GET `path` and return the body text.
    pub fn get_text(&self, path: &str, jar: Option<&Jar>) -> Result<String> {
        Ok(self.fetch(&Request::get(path), jar)?.text())
    }
}

/// Maps throttling, auth failures and error statuses to errors.
pub(crate) fn classify(response: Response) -> Result<Response> {
    match response.status {
        429 => {
            return Err(Ao3ApiError::RateLimit {
                retry_after: response.retry_after(),
            });
        }
        401 | 403 => {
            return Err(Ao3ApiError::auth(format!(
                "access to {} was refused",
                response.url
            )));
        }
        status if status >= 400 => {
            return Err(Ao3ApiError::Http {
                status,
                url: response.url,
            });
        }
        _ => {}
    }
    if response.is_redirect()
        && response
            .location()
            .is_some_and(|l| l.contains("/auth_error"))
    {
        return Err(Ao3ApiError::auth(
            "authentication token rejected; call refresh_auth_token()",
        ));
    }
    if response.is_success() {
        let text = String::from_utf8_lossy(&response.body);
        if response.body.len() <= THROTTLE_PAGE_MAX_LEN && text.contains(THROTTLE_MARKER) {
            return Err(Ao3ApiError::RateLimit {
                retry_after: response.retry_after(),
            });
        }
        if is_restricted_notice(&text, RESTRICTED_MARKER)? {
            return Err(Ao3ApiError::auth(format!(
                "{} is only available to registered users",
                response.url
            )));
        }
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &str) -> Response {
        Response {
            url: "https://archiveofourown.org/works/1".into(),
            status,
            headers: Vec::new(),
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn query_and_form_are_percent_encoded() {
        let request = Request::post("/works/search")
            .query("work_search[query]", "a b")
            .form("user[login]", "me&you");
        assert_eq!(
            request.full_url(),
            "/works/search?work_search%5Bquery%5D=a%20b"
        );
        assert_eq!(request.form_body(), "user%5Blogin%5D=me%26you");
        assert_eq!(request.form_value("user[login]"), Some("me&you"));
    }

    #[test]
    fn throttling_is_detected_by_status_and_page() {
        let mut limited = response(429, "");
        limited.headers.push(("Retry-After".into(), "120".into()));
        assert!(matches!(
            classify(limited),
            Err(Ao3ApiError::RateLimit {
                retry_after: Some(120)
            })
        ));
        assert!(matches!(
            classify(response(200, "<h2>Retry later</h2>")),
            Err(Ao3ApiError::RateLimit { retry_after: None })
        ));
    }

    #[test]
    fn auth_failures_are_detected() {
        assert!(classify(response(403, "")).unwrap_err().is_auth());
        assert!(
            classify(response(
                200,
                r#"<p class="notice">This work is only available to registered users of the Archive.</p>"#
            ))
            .unwrap_err()
            .is_auth()
        );
    }

    #[test]
    fn story_text_quoting_the_restriction_is_content() {
        let chapter = format!(
            r#"<div id="chapters"><div class="userstuff"><p>{}</p><p>The archive was only available to registered users.</p></div></div>"#,
            "Long prose. ".repeat(1000)
        );
        assert!(classify(response(200, &chapter)).is_ok());
    }

    #[test]
    fn other_failures_keep_their_status() {
        match classify(response(404, "")) {
            Err(Ao3ApiError::Http { status, .. }) => assert_eq!(status, 404),
            other => panic!("unexpected {other:?}"),
        }
        assert!(classify(response(200, "<p>fine</p>")).is_ok());
    }
}
