// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot, with a
// fetcher that serves saved pages instead of the network.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use karatmeter::api::{create_router, AppState};
use karatmeter::config::AppConfig;
use karatmeter::ingest::fetch::{FetchedPage, PageFetcher};
use karatmeter::ingest::providers::{bhima, candere, joy_alukkas};
use karatmeter::metrics::Metrics;
use serde_json::Value as Json;
use shuttle_axum::axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use tempfile::TempDir;
use tower::ServiceExt as _; // for `oneshot`

const BODY_LIMIT: usize = 1024 * 1024;

/// Serves fixtures by exact URL; anything else is a 404.
struct FixtureFetcher {
    pages: HashMap<String, String>,
}

#[async_trait]
impl PageFetcher for FixtureFetcher {
    async fn get(&self, url: &str, _headers: &[(&str, &str)]) -> anyhow::Result<FetchedPage> {
        Ok(match self.pages.get(url) {
            Some(body) => FetchedPage {
                status: 200,
                body: body.clone(),
            },
            None => FetchedPage {
                status: 404,
                body: String::new(),
            },
        })
    }
}

fn test_router() -> (Router, TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut cfg = AppConfig::default();
    cfg.reports.dir = dir.path().to_path_buf();

    let pages = HashMap::from([
        (
            joy_alukkas::URL.to_string(),
            include_str!("fixtures/joy_alukkas.html").to_string(),
        ),
        (bhima::URL.to_string(), include_str!("fixtures/bhima.html").to_string()),
        (candere::URL.to_string(), include_str!("fixtures/candere.html").to_string()),
        (
            cfg.spot.primary_url.clone(),
            r#"{"price": 2400.0, "symbol": "XAU"}"#.to_string(),
        ),
    ]);
    let state = AppState::new(cfg, Arc::new(FixtureFetcher { pages }), None);
    (create_router(state, &Metrics::detached()), dir)
}

async fn call(app: &Router, method: &str, uri: &str) -> (StatusCode, Json) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    let resp = app.clone().oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    let json = serde_json::from_slice(&bytes).unwrap_or(Json::Null);
    (status, json)
}

#[tokio::test]
async fn health_is_ok() {
    let (app, _dir) = test_router();
    let (status, body) = call(&app, "GET", "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn config_is_exposed_without_secrets() {
    let (app, _dir) = test_router();
    let (status, body) = call(&app, "GET", "/api/config").await;
    assert_eq!(status, StatusCode::OK);
    let cfg = &body["config"];
    assert_eq!(cfg["calculations"]["denomination"], "22k");
    assert_eq!(cfg["calculations"]["customs"]["gst_rounding"], "ceil");
    let text = body.to_string().to_lowercase();
    assert!(!text.contains("smtp"));
    assert!(!text.contains("password"));
}

#[tokio::test]
async fn single_source_fetch() {
    let (app, _dir) = test_router();

    let (status, body) = call(&app, "GET", "/api/fetch/candere").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["quote"]["prices"]["22k"], 61630.0);
    assert_eq!(body["quote"]["location"], "Kerala, India");

    let (status, body) = call(&app, "GET", "/api/fetch/goldapi").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["quote"]["provider"], "Gold-API.com");
}

#[tokio::test]
async fn unknown_source_is_404_and_failing_source_is_502() {
    let (app, _dir) = test_router();
    let (status, _) = call(&app, "GET", "/api/fetch/tanishq").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // kalyan needs a webdriver, none is configured
    let (status, body) = call(&app, "GET", "/api/fetch/kalyan").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["success"], false);
    assert_eq!(body["source"], "kalyan");
    assert_eq!(body["kind"], "unreachable");
}

#[tokio::test]
async fn fetch_all_assembles_without_persisting() {
    let (app, dir) = test_router();
    let (status, body) = call(&app, "GET", "/api/fetch/all").await;
    assert_eq!(status, StatusCode::OK);

    let sources = body["report"]["sources"].as_object().unwrap();
    let mut ids: Vec<&str> = sources.keys().map(String::as_str).collect();
    ids.sort_unstable();
    assert_eq!(ids, ["bhima", "candere", "goldapi", "joy_alukkas"]);
    assert!(body["report"]["calculations"]["customs_8g_green"].is_object());
    assert!(body["report"]["calculations"]["goldapi_22k_20g"].is_object());

    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn reports_are_created_listed_and_read_back() {
    let (app, _dir) = test_router();

    let (status, created) = call(&app, "POST", "/api/reports").await;
    assert_eq!(status, StatusCode::CREATED);
    let name = created["name"].as_str().unwrap().to_string();
    assert!(name.starts_with("gold_report_"));

    let (status, listed) = call(&app, "GET", "/api/reports").await;
    assert_eq!(status, StatusCode::OK);
    let reports = listed["reports"].as_array().unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["name"], name.as_str());
    assert_eq!(reports[0]["sources_count"], 4);

    let (status, one) = call(&app, "GET", &format!("/api/reports/{name}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(one["report"]["created_at"], created["report"]["created_at"]);

    let (status, _) = call(&app, "GET", "/api/reports/gold_report_19990101_000000.json").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&app, "GET", "/api/reports/..").await;
    assert_ne!(status, StatusCode::OK);
}

#[tokio::test]
async fn metrics_endpoint_renders() {
    let (app, _dir) = test_router();
    let req = Request::builder()
        .uri("/metrics")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
