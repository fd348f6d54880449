//! Tests for the wrapper routes and request forwarding under a prefix.

use axum::body::Body;
use axum::Router;
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{Request, StatusCode};

use tileproxy_mount::{ProxyMount, ProxyState, ScriptName};

use super::test_utils::*;

// =============================================================================
// Wrapper Routes
// =============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_status_endpoint() {
    let fixture = Fixture::new(BASIC_CONFIG);
    let router = mounted(&fixture.state(false));

    let (status, body) = get(&router, "/maps/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"status":"operational"}"#);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_docs_page_uses_title() {
    let fixture = Fixture::new(BASIC_CONFIG);
    let router = mounted(&fixture.state(false));

    let (status, body) = get(&router, "/maps/custom-docs").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Test Maps - Swagger UI"));
    assert!(body.contains("/maps/openapi.json"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_openapi_document() {
    let fixture = Fixture::new(BASIC_CONFIG);
    let router = mounted(&fixture.state(false));

    let (status, body) = get(&router, "/maps/openapi.json").await;
    assert_eq!(status, StatusCode::OK);
    let doc: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(doc["info"]["title"], "Test Maps");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_nothing_outside_prefix() {
    let fixture = Fixture::new(BASIC_CONFIG);
    let router = mounted(&fixture.state(false));

    let (status, _) = get(&router, "/status").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = get(&router, "/tms/1.0.0/").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_context_path_is_normalized() {
    let fixture = Fixture::new(BASIC_CONFIG);
    let mut settings = fixture.settings(false);
    settings.context_path = "tiles/".to_string();
    let state = ProxyState::init(settings).unwrap();

    let mut mount = ProxyMount::new(&state);
    assert_eq!(mount.prefix(), "/tiles");
    let mut router = Router::new();
    mount.mount_to(&mut router, None).unwrap();

    let (status, _) = get(&router, "/tiles/status").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_parent_routes_are_kept() {
    let fixture = Fixture::new(BASIC_CONFIG);
    let state = fixture.state(false);
    let mut router = Router::new().route("/health", axum::routing::get(|| async { "ok" }));
    ProxyMount::new(&state).mount_to(&mut router, Some("/tiles")).unwrap();

    let (_, body) = get(&router, "/health").await;
    assert_eq!(body, "ok");
    let (status, _) = get(&router, "/tiles/status").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = get(&router, "/maps/status").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// =============================================================================
// Forwarding
// =============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_forwarded_response_matches_direct_call() {
    let fixture = Fixture::new(BASIC_CONFIG);
    let state = fixture.state(false);
    let router = mounted(&state);

    let request = Request::get("/maps/tms/1.0.0/")
        .header("host", "tiles.test")
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = send(&router, request).await;

    let mut direct = Request::get("/tms/1.0.0/")
        .header("host", "tiles.test")
        .body(Bytes::new())
        .unwrap();
    direct.extensions_mut().insert(ScriptName(PREFIX.to_string()));
    let expected = state.bridge().app().call(direct);

    assert_eq!(status, expected.status());
    assert_eq!(headers.get(CONTENT_TYPE), expected.headers().get(CONTENT_TYPE));
    assert_eq!(body, *expected.body());
    assert!(text(&expected).contains("href=\"http://tiles.test/maps/tms/1.0.0/osm/GLOBAL_WEBMERCATOR\""));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_demo_page_under_prefix() {
    let fixture = Fixture::new(BASIC_CONFIG);
    let router = mounted(&fixture.state(false));

    let (status, body) = get(&router, "/maps/demo/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("OpenStreetMap"));
    assert!(body.contains("http://tiles.test/maps/tms/1.0.0/osm/GLOBAL_WEBMERCATOR"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_forwarded_headers_shape_urls() {
    let fixture = Fixture::new(BASIC_CONFIG);
    let router = mounted(&fixture.state(false));

    let request = Request::get("/maps/tms/1.0.0/")
        .header("host", "internal:8080")
        .header("x-forwarded-proto", "https")
        .header("x-forwarded-host", "maps.example.org")
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&router, request).await;
    assert_eq!(status, StatusCode::OK);
    let body = String::from_utf8_lossy(&body);
    assert!(body.contains("https://maps.example.org/maps/tms/1.0.0/osm/GLOBAL_WEBMERCATOR"));
}
