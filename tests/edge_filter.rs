//! Edge filter behaviour over real HTTP.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;

mod common;
use common::{client, config, from_address, start_mock_backend, TestServer};

#[tokio::test]
async fn test_bot_blocked_on_pages_but_not_api() {
    let server = TestServer::start(config()).await;
    let client = client();

    let res = client
        .get(server.url("/catalog"))
        .header("user-agent", "python-requests/2.31")
        .header("x-forwarded-for", "10.0.0.1")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(res.text().await.unwrap(), "Forbidden");

    // API paths are exempt from bot detection; this one just does not exist.
    let res = client
        .get(server.url("/api/unknown"))
        .header("user-agent", "python-requests/2.31")
        .header("x-forwarded-for", "10.0.0.1")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    assert_eq!(server.state.tracker.tracked_count(), 1);
}

#[tokio::test]
async fn test_traversal_rejected() {
    let server = TestServer::start(config()).await;

    let res = client()
        .get(server.url("/download/..%2fetc%2fpasswd"))
        .headers(from_address("10.0.0.2"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(res.text().await.unwrap(), "Invalid Path");
}

#[tokio::test]
async fn test_repeat_offender_is_blocked() {
    let server = TestServer::start(config()).await;
    let client = client();

    for _ in 0..6 {
        let res = client
            .get(server.url("/a..b"))
            .headers(from_address("1.2.3.4"))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    // The seventh request is benign but the address is now blocked.
    let res = client
        .get(server.url("/"))
        .headers(from_address("1.2.3.4"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(res.text().await.unwrap(), "Access Denied");

    // Other addresses are unaffected.
    let res = client
        .get(server.url("/"))
        .headers(from_address("5.6.7.8"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let escalated = server
        .state
        .audit
        .recent(10)
        .into_iter()
        .any(|e| e.details.get("escalated").is_some());
    assert!(escalated);
}

#[tokio::test]
async fn test_pass_through_carries_security_headers() {
    let backend = start_mock_backend("storefront home").await;
    let mut config = config();
    config.upstream.enabled = true;
    config.upstream.address = backend.to_string();
    let server = TestServer::start(config).await;

    let res = client()
        .get(server.url("/products?page=2"))
        .headers(from_address("10.0.0.3"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let headers = res.headers();
    assert_eq!(headers["x-frame-options"], "DENY");
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["referrer-policy"], "no-referrer");
    assert!(headers.contains_key("x-request-id"));
    let csp = headers["content-security-policy"].to_str().unwrap();
    assert!(csp.contains("connect-src 'self' https://*.supabase.co;"));
    assert_eq!(res.text().await.unwrap(), "storefront home");
}

#[tokio::test]
async fn test_unreachable_upstream_is_bad_gateway() {
    // Bind then drop to get a port nothing listens on.
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let mut config = config();
    config.upstream.enabled = true;
    config.upstream.address = format!("127.0.0.1:{}", port);
    let server = TestServer::start(config).await;

    let res = client()
        .get(server.url("/"))
        .headers(from_address("10.0.0.4"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_admin_pages_redirect_without_session() {
    let mut config = config();
    config.filter.protect_admin = true;
    let server = TestServer::start(config).await;
    let client = client();

    let res = client
        .get(server.url("/admin/orders"))
        .headers(from_address("10.0.0.5"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(res.headers()["location"], "/login");

    let res = client
        .get(server.url("/admin/orders"))
        .headers(from_address("10.0.0.5"))
        .header("cookie", "sb-access-token=session")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_policy_reload_applies_new_bot_pattern() {
    let server = TestServer::start(config()).await;
    let client = client();
    let headless = || -> HeaderMap {
        let mut headers = from_address("10.0.0.6");
        headers.insert("user-agent", HeaderValue::from_static("HeadlessChrome/120"));
        headers
    };

    let res = client
        .get(server.url("/"))
        .headers(headless())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let mut updated = config();
    updated.filter.bot_pattern = "headless|bot".into();
    server.config_tx.send(updated).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let res = client
        .get(server.url("/"))
        .headers(headless())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}
