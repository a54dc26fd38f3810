//! HTTP adapter tests against a mock gateway

use search_trawl::api::{ApiError, ApiSession, Credentials, HttpSearchApi, SearchApi};
use search_trawl::config::{ApiConfig, Ranking};
use search_trawl::scrape::{classify, ErrorKind};
use serde_json::json;
use std::collections::BTreeMap;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn create_test_config(base_url: &str) -> ApiConfig {
    ApiConfig {
        base_url: base_url.to_string(),
        timeout_secs: 5,
        user_agent: "search-trawl-test/1.0".to_string(),
    }
}

fn session() -> ApiSession {
    let mut cookies = BTreeMap::new();
    cookies.insert("auth_token".to_string(), "abc".to_string());
    ApiSession {
        account: "alice".to_string(),
        guest: false,
        cookies,
    }
}

#[tokio::test]
async fn test_search_sends_query_and_cookies() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "quake lang:en"))
        .and(query_param("product", "Latest"))
        .and(query_param("count", "20"))
        .and(header("cookie", "auth_token=abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "posts": [
                {
                    "id": "1757",
                    "author_name": "Quake Watch",
                    "created_at": "2024-02-06T00:17:00Z",
                    "text": "M5.1\nnear the coast",
                    "repost_count": 4,
                    "favorite_count": 9
                },
                { "id": "1756" }
            ]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let api = HttpSearchApi::new(&create_test_config(&mock_server.uri())).unwrap();
    let posts = api
        .search(&session(), "quake lang:en", Ranking::Latest, 20)
        .await
        .unwrap();

    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0].id, "1757");
    assert_eq!(posts[0].author_name.as_deref(), Some("Quake Watch"));
    assert_eq!(posts[0].repost_count, Some(4));
    assert_eq!(posts[1].text, None);
}

#[tokio::test]
async fn test_error_statuses_map_to_kinds() {
    let mock_server = MockServer::start().await;
    let cases = [
        ("rate", 429u16, json!({"error": "slow down"}), ErrorKind::RateLimit),
        ("auth", 401, json!({"error": "bad token"}), ErrorKind::FatalAccount),
        ("lock", 403, json!({"error": "account locked"}), ErrorKind::FatalAccount),
        ("gone", 400, json!({"error": "user suspended"}), ErrorKind::FatalAccount),
        ("oops", 500, json!({"error": "internal"}), ErrorKind::Transient),
    ];
    for (query, status, body, _) in &cases {
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", *query))
            .respond_with(ResponseTemplate::new(*status).set_body_json(body.clone()))
            .mount(&mock_server)
            .await;
    }

    let api = HttpSearchApi::new(&create_test_config(&mock_server.uri())).unwrap();
    for (query, status, _, kind) in &cases {
        let err = api
            .search(&session(), query, Ranking::Top, 20)
            .await
            .unwrap_err();
        assert_eq!(classify(&err), *kind, "status {} gave {:?}", status, err);
    }

    let err = api
        .search(&session(), "lock", Ranking::Top, 20)
        .await
        .unwrap_err();
    assert_eq!(err, ApiError::AccountLocked("account locked".to_string()));
}

#[tokio::test]
async fn test_login_and_guest() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(body_string_contains("\"identifier\":\"alice\""))
        .and(body_string_contains("\"secondary_identifier\":\"alice@example.com\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "account": "alice",
            "cookies": { "auth_token": "t0k3n" }
        })))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/guest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "account": "guest" })))
        .mount(&mock_server)
        .await;

    let api = HttpSearchApi::new(&create_test_config(&mock_server.uri())).unwrap();

    let mut creds = Credentials::new("alice", "pw");
    creds.secondary_identifier = Some("alice@example.com".to_string());
    let session = api.login(&creds).await.unwrap();
    assert_eq!(session.account, "alice");
    assert!(!session.guest);
    assert_eq!(session.cookies.get("auth_token").map(String::as_str), Some("t0k3n"));

    let guest = api.guest().await.unwrap();
    assert!(guest.guest);
}

#[tokio::test]
async fn test_rejected_login() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({"error": "wrong password"})))
        .mount(&mock_server)
        .await;

    let api = HttpSearchApi::new(&create_test_config(&mock_server.uri())).unwrap();
    let err = api.login(&Credentials::new("alice", "nope")).await.unwrap_err();
    assert_eq!(err, ApiError::Forbidden("wrong password".to_string()));
}

#[tokio::test]
async fn test_unreachable_gateway_is_network_error() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let uri = format!("http://127.0.0.1:{}", port);

    let api = HttpSearchApi::new(&create_test_config(&uri)).unwrap();
    let err = api
        .search(&session(), "quake", Ranking::Latest, 20)
        .await
        .unwrap_err();
    assert_eq!(classify(&err), ErrorKind::Network, "got {:?}", err);
}
