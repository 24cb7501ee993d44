//! Admin API over real HTTP.

use reqwest::StatusCode;
use serde_json::Value;

mod common;
use common::{client, config, from_address, TestServer, ADMIN_KEY};

fn bearer() -> String {
    format!("Bearer {}", ADMIN_KEY)
}

#[tokio::test]
async fn test_requires_bearer_key() {
    let server = TestServer::start(config()).await;
    let admin = server.start_admin().await;
    let client = client();

    let res = client
        .get(format!("http://{}/admin/status", admin))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(format!("http://{}/admin/status", admin))
        .header("authorization", "Bearer wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(format!("http://{}/admin/status", admin))
        .header("authorization", bearer())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let json: Value = res.json().await.unwrap();
    assert_eq!(json["status"], "operational");
}

#[tokio::test]
async fn test_blocked_listing_and_amnesty() {
    let server = TestServer::start(config()).await;
    let admin = server.start_admin().await;
    let client = client();

    for _ in 0..6 {
        client
            .get(server.url("/x..y"))
            .headers(from_address("9.9.9.9"))
            .send()
            .await
            .unwrap();
    }

    let blocked: Vec<String> = client
        .get(format!("http://{}/admin/blocked", admin))
        .header("authorization", bearer())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(blocked, vec!["9.9.9.9".to_string()]);

    let stats: Value = client
        .get(format!("http://{}/admin/stats", admin))
        .header("authorization", bearer())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["blocked_addresses"], 1);
    assert_eq!(stats["tracked_addresses"], 1);

    let released: Value = client
        .post(format!("http://{}/admin/amnesty", admin))
        .header("authorization", bearer())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(released["released"], 1);

    let res = client
        .get(server.url("/"))
        .headers(from_address("9.9.9.9"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_clear_rate_limit_window() {
    let server = TestServer::start(config()).await;
    let admin = server.start_admin().await;
    let client = client();

    assert!(server.state.limiter.check("login:7.7.7.7", 5, std::time::Duration::from_secs(60)));

    let url = format!("http://{}/admin/rate-limits/login:7.7.7.7", admin);
    let res = client
        .delete(&url)
        .header("authorization", bearer())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = client
        .delete(&url)
        .header("authorization", bearer())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_recent_audit_events() {
    let server = TestServer::start(config()).await;
    let admin = server.start_admin().await;
    let client = client();

    client
        .get(server.url("/shop"))
        .header("user-agent", "curl/8.4.0")
        .header("x-forwarded-for", "8.8.4.4")
        .send()
        .await
        .unwrap();

    let events: Vec<Value> = client
        .get(format!("http://{}/admin/audit?limit=5", admin))
        .header("authorization", bearer())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let bot = events
        .iter()
        .find(|e| e["action"] == "bot_detected")
        .expect("bot event recorded");
    assert_eq!(bot["ip_address"], "8.8.4.4");
    assert_eq!(bot["user_agent"], "curl/8.4.0");
    assert_eq!(bot["status"], "suspicious");
}
