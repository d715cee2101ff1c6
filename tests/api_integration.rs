//! Integration tests for the hit and stats endpoints
//!
//! These drive the full router end to end: query parsing, validation,
//! serialized writes against a file-backed store, and the JSON payloads.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use std::sync::Arc;
use tally::api;
use tally::config::{CounterPolicy, FrontendConfig, PolicySource};
use tally::counter::CounterService;
use tally::storage::{CounterStore, FileStore};
use tempfile::TempDir;
use tower::ServiceExt;

/// Helper to create a router over a fresh file store
fn create_test_app(policy: CounterPolicy) -> (Router, TempDir) {
    let dir = TempDir::new().unwrap();
    let store: Arc<dyn CounterStore> = Arc::new(FileStore::new(dir.path().join("counts.json")));
    let counter = Arc::new(CounterService::new(store, PolicySource::Static(policy), 64));
    let router = api::create_router(counter, FrontendConfig { public_dir: None });
    (router, dir)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, String) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let (status, body) = get(app, uri).await;
    let json = serde_json::from_str(&body).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_full_regression_flow() {
    let (app, _dir) = create_test_app(CounterPolicy::default());
    let domain = "test-1700000000000.localhost";
    let project = "proj-1700000000000";

    // Initial stats are zero for both levels
    let (status, json) = get_json(&app, &format!("/stats?d={domain}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ok"], true);
    assert_eq!(json["total"], 0);
    assert_eq!(json["last"], 0);

    let (_, json) = get_json(&app, &format!("/stats?d={domain}&p={project}")).await;
    assert_eq!(json["total"], 0);
    assert_eq!(json["last"], 0);
    assert_eq!(json["project"], project);

    // Domain hits: one debug, one silent
    let (status, json) = get_json(&app, &format!("/hit?d={domain}&debug=1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ok"], true);
    assert_eq!(json["domain"], domain);
    assert!(json["project"].is_null());
    assert!(json["ts"].as_i64().unwrap() > 0);

    let (status, body) = get(&app, &format!("/hit?d={domain}")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_empty());

    // Project hits: one debug, one silent
    let (_, json) = get_json(&app, &format!("/hit?d={domain}&p={project}&debug=1")).await;
    assert_eq!(json["domain"], domain);
    assert_eq!(json["project"], project);

    let (status, _) = get(&app, &format!("/hit?d={domain}&p={project}")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // Domain total includes project hits
    let (_, json) = get_json(&app, &format!("/stats?d={domain}")).await;
    assert_eq!(json["total"], 4);
    assert!(json["last"].as_i64().unwrap() > 0);
    assert!(json.get("ips").is_none());
    assert!(json.get("projects").is_none());

    let (_, json) = get_json(&app, &format!("/stats?d={domain}&p={project}")).await;
    assert_eq!(json["total"], 2);
    assert!(json["last"].as_i64().unwrap() > 0);

    // Lightweight project overview
    let (_, json) = get_json(&app, &format!("/stats?d={domain}&includeProjects=1")).await;
    let overview = &json["projects"][project];
    assert_eq!(overview["total"], 2);
    assert!(overview["last"].as_i64().unwrap() > 0);
    assert!(overview.get("ips").is_none());

    // ips map is always an object when requested
    let (_, json) = get_json(&app, &format!("/stats?d={domain}&includeIps=1")).await;
    assert!(json["ips"].is_object());
}

#[tokio::test]
async fn test_invalid_domain_is_rejected() {
    let (app, _dir) = create_test_app(CounterPolicy::default());

    for uri in ["/stats?d=bad!!domain", "/hit?d=bad!!domain", "/hit", "/stats?d="] {
        let (status, json) = get_json(&app, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(json["ok"], false);
        assert_eq!(json["error"], "invalid_domain");
        assert!(json["msg"].is_string());
    }
}

#[tokio::test]
async fn test_invalid_project_is_rejected_and_counts_untouched() {
    let (app, _dir) = create_test_app(CounterPolicy::default());

    get(&app, "/hit?d=example.com").await;

    let (status, json) = get_json(&app, "/hit?d=example.com&p=bad/slash&debug=1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_project");

    let (status, json) = get_json(&app, "/stats?d=example.com&p=bad/slash").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_project");

    let (_, json) = get_json(&app, "/stats?d=example.com").await;
    assert_eq!(json["total"], 1);
}

#[tokio::test]
async fn test_empty_project_means_domain_level() {
    let (app, _dir) = create_test_app(CounterPolicy::default());

    let (status, json) = get_json(&app, "/hit?d=example.com&p=&debug=true").await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["project"].is_null());

    let (_, json) = get_json(&app, "/stats?d=example.com&p=").await;
    assert_eq!(json["total"], 1);
    assert!(json.get("project").is_none());
}

#[tokio::test]
async fn test_localhost_debug_hit_then_stats() {
    let (app, _dir) = create_test_app(CounterPolicy::default());

    let (_, json) = get_json(&app, "/hit?d=localhost&debug=1").await;
    assert_eq!(json["domain"], "localhost");

    let (_, json) = get_json(&app, "/stats?d=localhost").await;
    assert_eq!(json["total"], 1);
    assert!(json["last"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn test_allow_list_forbids_other_domains() {
    let policy = CounterPolicy::restricted(vec!["example.com".to_string()], false);
    let (app, _dir) = create_test_app(policy);

    let (status, _) = get(&app, "/hit?d=blog.example.com").await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, json) = get_json(&app, "/hit?d=badexample.com").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"], "domain_not_allowed");

    let (status, json) = get_json(&app, "/stats?d=other.org").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"], "domain_not_allowed");
}

#[tokio::test]
async fn test_forwarded_address_is_tracked_and_anonymized() {
    let policy = CounterPolicy {
        anonymize_ip: true,
        ..CounterPolicy::default()
    };
    let (app, _dir) = create_test_app(policy);

    let request = Request::builder()
        .uri("/hit?d=example.com&p=docs")
        .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let (_, json) = get_json(&app, "/stats?d=example.com&includeIps=1").await;
    assert_eq!(json["ips"]["203.0.113.0/24"]["count"], 1);
    assert!(json["ips"].get("203.0.113.9").is_none());

    let (_, json) = get_json(&app, "/stats?d=example.com&p=docs&includeIps=true").await;
    assert_eq!(json["ips"]["203.0.113.0/24"]["count"], 1);
}

#[tokio::test]
async fn test_beacon_post_records_hit() {
    let (app, _dir) = create_test_app(CounterPolicy::default());

    // navigator.sendBeacon posts a text/plain body
    let request = Request::builder()
        .method(Method::POST)
        .uri("/hit?d=example.com&p=blog")
        .header(header::CONTENT_TYPE, "text/plain;charset=UTF-8")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let (status, json) = get_json(&app, "/stats?d=example.com").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 1);

    let (_, json) = get_json(&app, "/stats?d=example.com&p=blog").await;
    assert_eq!(json["total"], 1);
}

#[tokio::test]
async fn test_cors_preflight_allows_post() {
    let (app, _dir) = create_test_app(CounterPolicy::default());

    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/hit?d=example.com")
        .header(header::ORIGIN, "https://example.com")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert!(response.status().is_success());

    let allowed = response.headers()[header::ACCESS_CONTROL_ALLOW_METHODS]
        .to_str()
        .unwrap();
    assert!(allowed.contains("POST"), "allowed methods: {allowed}");
}

#[tokio::test]
async fn test_repeated_query_parameter_returns_json_error() {
    let (app, _dir) = create_test_app(CounterPolicy::default());

    let (status, json) = get_json(&app, "/stats?d=a.com&d=b.com").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["ok"], false);
    assert_eq!(json["error"], "invalid_domain");
    assert!(json["msg"].as_str().is_some_and(|m| !m.is_empty()));

    let (status, json) = get_json(&app, "/hit?d=example.com&d=example.org").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_domain");

    // Nothing was counted for either domain
    let (_, json) = get_json(&app, "/stats?d=example.com").await;
    assert_eq!(json["total"], 0);
}

#[tokio::test]
async fn test_cors_headers_present() {
    let (app, _dir) = create_test_app(CounterPolicy::default());

    let request = Request::builder()
        .uri("/stats?d=example.com")
        .header(header::ORIGIN, "https://example.com")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();

    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "*"
    );
}

#[tokio::test]
async fn test_client_script_is_served() {
    let (app, _dir) = create_test_app(CounterPolicy::default());

    let (status, body) = get(&app, "/counter.js").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("/hit?"));

    let (status, _) = get(&app, "/public/counter.js").await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = get(&app, "/public/missing.js").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_check() {
    let (app, _dir) = create_test_app(CounterPolicy::default());

    let (status, json) = get_json(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "OK");
}
