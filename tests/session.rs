mod common;

use ao3_api::networking::{Method, Response};
use ao3_api::{Ao3ApiError, BookmarkOptions, Session, Work};
use common::{MockTransport, html, redirect, requester, session, status};
use std::sync::Arc;

fn with_cookie(mut response: Response) -> Response {
    response.headers.push((
        "set-cookie".to_string(),
        "_otwarchive_session=s3cr3t; Path=/; HttpOnly".to_string(),
    ));
    response
}

fn token_dispenser(mock: &Arc<MockTransport>) {
    mock.get("/token_dispenser.json", html(r#"{"token":"login-token"}"#));
}

fn logged_in(mock: &Arc<MockTransport>) -> Session {
    token_dispenser(mock);
    mock.post("/users/login", with_cookie(redirect("https://ao3.test/")));
    Session::login(requester(mock.clone()), "reader", "correct horse").unwrap()
}

#[test]
fn bad_credentials_leave_no_trace() {
    let mock = MockTransport::new();
    token_dispenser(&mock);
    mock.post(
        "/users/login",
        with_cookie(redirect("https://ao3.test/users/login")),
    );

    let err = Session::login(requester(mock.clone()), "reader", "wrong").unwrap_err();
    assert!(matches!(err, Ao3ApiError::Login(_)));
    assert!(err.is_auth());

    let guest = session(&mock);
    assert!(guest.login_with(&ao3_api::networking::LoginInfo::new("reader", "wrong")).is_err());
    assert!(!guest.is_authed());
    assert!(!guest.has_cookies());
    assert_eq!(guest.username(), None);
}

#[test]
fn good_credentials_install_the_jar() {
    let mock = MockTransport::new();
    let session = logged_in(&mock);
    assert!(session.is_authed());
    assert!(session.has_cookies());
    assert_eq!(session.username().as_deref(), Some("reader"));
    assert_eq!(session.auth_token(), None);

    let calls = mock.calls();
    assert!(calls[0].starts_with("GET ") && calls[0].contains("/token_dispenser.json"));
    assert!(calls[1].starts_with("POST ") && calls[1].contains("/users/login"));
}

#[test]
fn guests_cannot_read_bookmarks() {
    let mock = MockTransport::new();
    let guest = session(&mock);
    assert!(matches!(guest.get_bookmarks(1), Err(Ao3ApiError::Auth(_))));
    assert!(matches!(
        guest.bookmark(1, &BookmarkOptions::default()),
        Err(Ao3ApiError::Auth(_))
    ));
    assert!(matches!(guest.get_subscriptions(1), Err(Ao3ApiError::Auth(_))));
    assert_eq!(mock.call_count(), 0);
}

#[test]
fn actions_need_a_token_first() {
    let mock = MockTransport::new();
    let session = logged_in(&mock);
    let before = mock.call_count();
    assert!(matches!(session.leave_kudos(5), Err(Ao3ApiError::Auth(_))));
    assert_eq!(mock.call_count(), before);

    mock.get(
        "/users/reader",
        html(r#"<html><head><meta name="csrf-token" content="fresh"></head></html>"#),
    );
    assert_eq!(session.refresh_auth_token().unwrap(), "fresh");
    assert_eq!(session.auth_token().as_deref(), Some("fresh"));
}

#[test]
fn kudos_outcomes() {
    let mock = MockTransport::new();
    mock.route(
        Method::Post,
        "/kudos.js",
        vec![
            status(201, "{}"),
            status(422, r#"{"errors":{"ip_address":["already left kudos"]}}"#),
            status(422, r#"{"errors":{"auth_error":["bad token"]}}"#),
            status(422, r#"{"errors":{"no_commentable":["gone"]}}"#),
            status(429, ""),
        ],
    );
    let guest = session(&mock);
    guest.set_auth_token("guest-token");

    assert!(guest.leave_kudos(7).unwrap());
    assert!(!guest.leave_kudos(7).unwrap());
    assert!(matches!(guest.leave_kudos(7), Err(Ao3ApiError::Auth(_))));
    assert!(matches!(guest.leave_kudos(7), Err(Ao3ApiError::InvalidId(_))));
    assert!(guest.leave_kudos(7).unwrap_err().is_rate_limit());
}

#[test]
fn comment_text_is_checked_before_sending() {
    let mock = MockTransport::new();
    let guest = session(&mock);
    guest.set_auth_token("t");
    guest.set_guest_identity("Wanderer", "w@example.com");
    assert!(matches!(
        guest.post_comment(1, None, ""),
        Err(Ao3ApiError::InvalidArgument(_))
    ));
    let long = "x".repeat(10_001);
    assert!(matches!(
        guest.post_comment(1, None, &long),
        Err(Ao3ApiError::InvalidArgument(_))
    ));
    assert_eq!(mock.call_count(), 0);
}

#[test]
fn guest_comment_statuses() {
    let mock = MockTransport::new();
    mock.route(
        Method::Post,
        "/comments.js",
        vec![status(201, ""), status(200, "dup"), status(404, "")],
    );
    let guest = session(&mock);
    guest.set_auth_token("t");
    assert!(matches!(
        guest.post_comment(1, Some(2), "hello"),
        Err(Ao3ApiError::InvalidArgument(_))
    ));
    guest.set_guest_identity("Wanderer", "w@example.com");

    guest.post_comment(1, Some(2), "hello").unwrap();
    assert!(matches!(
        guest.post_comment(1, Some(2), "hello"),
        Err(Ao3ApiError::DuplicateComment(_))
    ));
    assert!(matches!(
        Work::new(1, guest.clone()).comment("hello", None),
        Err(Ao3ApiError::InvalidId(_))
    ));
}

#[test]
fn throttle_page_is_a_rate_limit() {
    let mock = MockTransport::new();
    let mut throttled = status(429, "Retry later");
    throttled
        .headers
        .push(("retry-after".to_string(), "30".to_string()));
    mock.get("/works/9", throttled);
    let err = Work::new(9, session(&mock)).title().unwrap_err();
    assert!(matches!(
        err,
        Ao3ApiError::RateLimit {
            retry_after: Some(30)
        }
    ));
}
