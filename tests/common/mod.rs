#![allow(dead_code)]

use ao3_api::networking::{Method, RateLimiter, Request, Requester, Response, Transport};
use ao3_api::{Ao3ApiError, Session};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub const BASE_URL: &str = "https://ao3.test";

struct Route {
    method: Method,
    pattern: String,
    responses: VecDeque<Response>,
}

/// Scripted transport. Routes match on a substring of the full URL, first
/// registered wins; each route replays its responses in order and repeats
/// the last one. Unmatched requests get an empty 404.
pub struct MockTransport {
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<String>>,
    latency: Duration,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Self::with_latency(Duration::ZERO)
    }

    pub fn with_latency(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            routes: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            latency,
        })
    }

    pub fn route(&self, method: Method, pattern: &str, responses: Vec<Response>) {
        self.routes.lock().push(Route {
            method,
            pattern: pattern.to_string(),
            responses: responses.into(),
        });
    }

    pub fn get(&self, pattern: &str, response: Response) {
        self.route(Method::Get, pattern, vec![response]);
    }

    pub fn post(&self, pattern: &str, response: Response) {
        self.route(Method::Post, pattern, vec![response]);
    }

    /// Every request seen so far as `"METHOD url"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls_to(&self, pattern: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.contains(pattern))
            .count()
    }
}

impl Transport for MockTransport {
    fn send(&self, request: &Request) -> Result<Response, Ao3ApiError> {
        let url = request.full_url();
        self.calls.lock().push(format!("{} {url}", request.method));
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }
        let mut routes = self.routes.lock();
        let route = routes
            .iter_mut()
            .find(|r| r.method == request.method && url.contains(&r.pattern));
        let mut response = match route {
            Some(route) if route.responses.len() > 1 => route.responses.pop_front(),
            Some(route) => route.responses.front().cloned(),
            None => None,
        }
        .unwrap_or_else(|| status(404, ""));
        response.url = url;
        Ok(response)
    }
}

pub fn status(code: u16, body: &str) -> Response {
    Response {
        url: String::new(),
        status: code,
        headers: Vec::new(),
        body: body.as_bytes().to_vec(),
    }
}

pub fn html(body: &str) -> Response {
    status(200, body)
}

pub fn redirect(location: &str) -> Response {
    let mut response = status(302, "");
    response
        .headers
        .push(("location".to_string(), location.to_string()));
    response
}

pub fn requester(transport: Arc<MockTransport>) -> Requester {
    Requester::new(transport, Arc::new(RateLimiter::disabled())).with_base_url(BASE_URL)
}

pub fn session(transport: &Arc<MockTransport>) -> Session {
    Session::guest(requester(transport.clone()))
}

pub fn work_page(id: u64, title: &str, words: u64) -> String {
    format!(
        r#"<html><head><meta name="csrf-token" content="tok{id}"></head><body><div id="main">
<dl class="work meta group">
  <dd class="fandom tags"><ul><li><a class="tag">Original Work</a></li></ul></dd>
  <dd class="language">English</dd>
  <dd class="stats"><dl class="stats">
    <dd class="published">2022-01-01</dd>
    <dd class="words">{words}</dd><dd class="chapters">1/1</dd>
    <dd class="kudos">7</dd><dd class="hits">100</dd>
  </dl></dd>
</dl>
<div class="preface group">
  <h2 class="title heading">{title}</h2>
  <h3 class="byline heading"><a rel="author" href="/users/writer/pseuds/writer">writer</a></h3>
</div>
<div id="chapters"><div class="userstuff"><p>Text of {title}.</p></div></div>
</div></body></html>"#
    )
}

pub fn blurb(id: u64, title: &str, words: u64) -> String {
    format!(
        r#"<li id="work_{id}" class="work blurb group" role="article">
  <div class="header module">
    <h4 class="heading"><a href="/works/{id}">{title}</a> by <a rel="author" href="/users/writer/pseuds/writer">writer</a></h4>
    <h5 class="fandoms heading"><a class="tag" href="/tags/Original">Original Work</a></h5>
  </div>
  <dl class="stats">
    <dd class="language">English</dd><dd class="words">{words}</dd>
    <dd class="chapters">1/1</dd><dd class="kudos"><a>3</a></dd><dd class="hits">50</dd>
  </dl>
</li>"#
    )
}

pub fn search_page(total: u64, blurbs: &[String]) -> String {
    format!(
        r#"<html><body><div id="main"><h3 class="heading">{total} Found</h3>
<ol class="work index group">{}</ol></div></body></html>"#,
        blurbs.concat()
    )
}

pub fn comment_li(id: u64, author: &str, text: &str) -> String {
    format!(
        r#"<li class="comment group" id="comment_{id}" role="article">
  <h4 class="heading byline"><a href="/users/{author}/pseuds/{author}">{author}</a> on Chapter 1</h4>
  <blockquote class="userstuff"><p>{text}</p></blockquote>
  <ul class="actions"><li><a href="/comments/add_comment_reply?chapter_id=55&amp;id={id}">Reply</a></li></ul>
</li>"#
    )
}

/// A comment page: `body` goes inside the top-level thread list.
pub fn thread_page(body: &str) -> String {
    format!(
        r#"<html><head><meta name="csrf-token" content="t"></head><body>
<div id="comments_placeholder"><ol class="thread">{body}</ol></div></body></html>"#
    )
}

/// Wraps replies in the nested list the archive uses under a comment.
pub fn replies(items: &[String]) -> String {
    format!(r#"<li><ol class="thread">{}</ol></li>"#, items.concat())
}
