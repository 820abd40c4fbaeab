//! End-to-end checks of the HTTP API against small fixture datasets.

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use onwater::api::{self, AppState};
use onwater::config::{Config, RateLimitConfig};
use onwater::pip::DatasetSource;
use onwater::WaterClassifier;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn test_config(rate_limit: RateLimitConfig) -> Config {
    Config {
        static_dir: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("public"),
        datasets: vec![
            DatasetSource::new("seas", fixture("seas.geo.json")),
            DatasetSource::new("lakes", fixture("lakes.geo.json")),
            DatasetSource::new("rivers", fixture("rivers.geo.json")),
        ],
        rate_limit,
        ..Config::default()
    }
}

fn router_with(config: Config) -> Router {
    let classifier = WaterClassifier::load(&config.datasets).expect("fixtures load");
    let state = Arc::new(AppState::new(classifier, &config));
    api::router(state, &config)
}

fn test_router() -> Router {
    router_with(test_config(RateLimitConfig {
        enabled: false,
        ..RateLimitConfig::default()
    }))
}

struct TestResponse {
    status: StatusCode,
    headers: axum::http::HeaderMap,
    body: Vec<u8>,
}

impl TestResponse {
    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("json body")
    }

    fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

async fn send(router: &Router, request: Request<Body>) -> TestResponse {
    let response = router.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body")
        .to_vec();
    TestResponse {
        status,
        headers,
        body,
    }
}

async fn get(router: &Router, uri: &str) -> TestResponse {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .expect("request");
    send(router, request).await
}

async fn post_json(router: &Router, body: &str) -> TestResponse {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/is-on-water")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request");
    send(router, request).await
}

#[tokio::test]
async fn health_check_returns_ok() {
    let router = test_router();
    let response = get(&router, "/health").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.text(), "OK");
}

#[tokio::test]
async fn indicates_water() {
    let router = test_router();
    let response = get(&router, "/api/is-on-water?lat=20.112682&lon=-37.048647").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.json(),
        json!({ "lat": 20.112682, "lon": -37.048647, "water": true })
    );
}

#[tokio::test]
async fn indicates_no_water() {
    let router = test_router();
    let response = get(&router, "/api/is-on-water?lat=40.292097&lon=-98.613164").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.json(),
        json!({ "lat": 40.292097, "lon": -98.613164, "water": false })
    );
}

#[tokio::test]
async fn zero_coordinates_are_accepted() {
    let router = test_router();
    let response = get(&router, "/api/is-on-water?lat=0&lon=0").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json(), json!({ "lat": 0.0, "lon": 0.0, "water": true }));
}

#[tokio::test]
async fn lakes_and_rivers_count_as_water() {
    let router = test_router();

    let lake = get(&router, "/api/is-on-water?lat=43&lon=-87").await;
    assert_eq!(lake.json()["water"], json!(true));

    let island = get(&router, "/api/is-on-water?lat=44.25&lon=-86.25").await;
    assert_eq!(island.json()["water"], json!(false));

    let river = get(&router, "/api/is-on-water?lat=38&lon=-91").await;
    assert_eq!(river.json()["water"], json!(true));
}

#[tokio::test]
async fn boundary_points_count_as_water() {
    let router = test_router();
    let edge = get(&router, "/api/is-on-water?lat=20&lon=-60").await;
    assert_eq!(edge.json()["water"], json!(true));

    let antimeridian = get(&router, "/api/is-on-water?lat=0&lon=-180").await;
    assert_eq!(antimeridian.json()["water"], json!(true));
}

#[tokio::test]
async fn out_of_range_single_query_is_rejected() {
    let router = test_router();
    let response = get(&router, "/api/is-on-water?lat=200&lon=0").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let text = response.text();
    assert!(text.contains("'lat' and 'lon' query parameters required"), "{text}");
    assert!(text.contains("-180"), "{text}");
}

#[tokio::test]
async fn missing_or_malformed_single_query_is_rejected() {
    let router = test_router();
    for uri in [
        "/api/is-on-water",
        "/api/is-on-water?lat=10",
        "/api/is-on-water?lat=abc&lon=10",
        "/api/is-on-water?lat=10&lon=",
    ] {
        let response = get(&router, uri).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "{uri}");
    }
}

#[tokio::test]
async fn latitude_beyond_ninety_is_accepted() {
    let router = test_router();
    let response = get(&router, "/api/is-on-water?lat=120&lon=10").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["water"], json!(false));
}

#[tokio::test]
async fn batch_preserves_order() {
    let router = test_router();
    let response = post_json(
        &router,
        r#"[{"lat":20.112682,"lon":-37.048647},{"lat":40.292097,"lon":-98.613164}]"#,
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.json(),
        json!([
            { "lat": 20.112682, "lon": -37.048647, "water": true },
            { "lat": 40.292097, "lon": -98.613164, "water": false },
        ])
    );
}

#[tokio::test]
async fn batch_accepts_numeric_strings() {
    let router = test_router();
    let response = post_json(&router, r#"[{"lat":"0","lon":"0"},{"lat":43,"lon":"-87"}]"#).await;
    assert_eq!(response.status, StatusCode::OK);
    let water: Vec<Value> = response
        .json()
        .as_array()
        .expect("array")
        .iter()
        .map(|r| r["water"].clone())
        .collect();
    assert_eq!(water, vec![json!(true), json!(true)]);
}

#[tokio::test]
async fn empty_batch_returns_empty_array() {
    let router = test_router();
    let response = post_json(&router, "[]").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json(), json!([]));
}

#[tokio::test]
async fn batch_with_one_invalid_element_is_rejected() {
    let router = test_router();
    let response = post_json(
        &router,
        r#"[{"lat":20.112682,"lon":-37.048647},{"lat":"north","lon":1},{"lat":1,"lon":1}]"#,
    )
    .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let text = response.text();
    assert!(text.starts_with("body must be an array of objects"), "{text}");
    assert!(text.contains("index 1"), "{text}");
    assert!(!text.contains("water"), "{text}");
}

#[tokio::test]
async fn non_array_batch_is_rejected() {
    let router = test_router();
    let response = post_json(&router, r#"{"lat":1,"lon":1}"#).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.text(), "body must be an array of coordinates");
}

#[tokio::test]
async fn unparsable_batch_is_rejected() {
    let router = test_router();
    let response = post_json(&router, "[{\"lat\":").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.text(), "body must be an array of coordinates");

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/is-on-water")
        .body(Body::from("[]"))
        .expect("request");
    let response = send(&router, request).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn request_id_is_echoed_or_generated() {
    let router = test_router();

    let request = Request::builder()
        .uri("/api/is-on-water?lat=1&lon=1")
        .header("x-request-id", "req-123")
        .body(Body::empty())
        .expect("request");
    let response = send(&router, request).await;
    assert_eq!(
        response.headers.get("x-request-id").and_then(|v| v.to_str().ok()),
        Some("req-123")
    );

    let response = get(&router, "/health").await;
    let generated = response
        .headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .expect("generated request id");
    assert!(!generated.is_empty());
}

#[tokio::test]
async fn index_page_is_served_with_security_headers() {
    let router = test_router();
    let response = get(&router, "/").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.text().contains("<html"));
    assert_eq!(
        response
            .headers
            .get("x-content-type-options")
            .and_then(|v| v.to_str().ok()),
        Some("nosniff")
    );
    assert!(response.headers.contains_key("content-security-policy"));
}

#[tokio::test]
async fn rate_limit_applies_to_api_but_not_health() {
    let router = router_with(test_config(RateLimitConfig {
        enabled: true,
        window_ms: 60_000,
        max: 2,
    }));

    for _ in 0..2 {
        let response = get(&router, "/api/is-on-water?lat=1&lon=1").await;
        assert_eq!(response.status, StatusCode::OK);
    }

    let limited = get(&router, "/api/is-on-water?lat=1&lon=1").await;
    assert_eq!(limited.status, StatusCode::TOO_MANY_REQUESTS);
    assert!(limited.headers.contains_key(header::RETRY_AFTER));

    for _ in 0..5 {
        let response = get(&router, "/health").await;
        assert_eq!(response.status, StatusCode::OK);
    }
}

#[tokio::test]
async fn concurrent_queries_agree() {
    let router = test_router();

    let mut handles = Vec::new();
    for i in 0..32 {
        let router = router.clone();
        handles.push(tokio::spawn(async move {
            let uri = if i % 2 == 0 {
                "/api/is-on-water?lat=20.112682&lon=-37.048647"
            } else {
                "/api/is-on-water?lat=40.292097&lon=-98.613164"
            };
            (i, get(&router, uri).await.json()["water"].clone())
        }));
    }

    for handle in handles {
        let (i, water) = handle.await.expect("task");
        assert_eq!(water, json!(i % 2 == 0));
    }
}

#[test]
fn missing_dataset_aborts_load() {
    let mut config = test_config(RateLimitConfig::default());
    config.datasets.push(DatasetSource::new("oceans", fixture("missing.geo.json")));
    assert!(WaterClassifier::load(&config.datasets).is_err());
}
