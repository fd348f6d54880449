//! End-to-end tests of the tile services behind the mount.

use http::StatusCode;

use tileproxy_mount::proxy::ErrorDetail;

use super::test_utils::*;

const TILE: &[u8] = b"\x89PNG fake tile";

const BAD_TILE_URL: &str = "/maps/tms/1.0.0/osm/GLOBAL_WEBMERCATOR/0/0/x.png";

// =============================================================================
// Tiles
// =============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_tms_and_wmts_serve_same_tile() {
    let fixture = Fixture::new(BASIC_CONFIG);
    // GLOBAL_WEBMERCATOR stores rows from the top: grid row 1 is the southern row.
    fixture.seed_tile("osm_cache", "GLOBAL_WEBMERCATOR", 1, 1, 1, TILE);
    let router = mounted(&fixture.state(false));

    let (status, body) = get_bytes(&router, "/maps/tms/1.0.0/osm/GLOBAL_WEBMERCATOR/1/1/0.png").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_ref(), TILE);

    let (status, body) = get_bytes(&router, "/maps/wmts/osm/GLOBAL_WEBMERCATOR/1/1/1.png").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_ref(), TILE);

    let (status, body) = get_bytes(
        &router,
        "/maps/service?SERVICE=WMTS&REQUEST=GetTile&LAYER=osm&TILEMATRIXSET=GLOBAL_WEBMERCATOR\
         &TILEMATRIX=1&TILECOL=1&TILEROW=1&FORMAT=image/png",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_ref(), TILE);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_uncached_tile_is_not_found() {
    let fixture = Fixture::new(BASIC_CONFIG);
    let router = mounted(&fixture.state(false));

    let (status, body) = get(&router, "/maps/tms/1.0.0/osm/GLOBAL_WEBMERCATOR/0/0/0.png").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("<TileMapServerError>"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_tile_out_of_bounds() {
    let fixture = Fixture::new(BASIC_CONFIG);
    let router = mounted(&fixture.state(false));

    let (status, _) = get(&router, "/maps/tms/1.0.0/osm/GLOBAL_WEBMERCATOR/1/2/0.png").await;
    assert!(status.is_client_error());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_wmts_capabilities() {
    let fixture = Fixture::new(BASIC_CONFIG);
    let router = mounted(&fixture.state(false));

    let (status, body) = get(&router, "/maps/wmts/1.0.0/WMTSCapabilities.xml").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("<ows:Identifier>osm</ows:Identifier>"));
    assert!(body.contains("http://tiles.test/maps/wmts/"));
}

// =============================================================================
// Debug Mode
// =============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_bad_request_without_debug() {
    let fixture = Fixture::new(BASIC_CONFIG);
    let router = mounted(&fixture.state(false));

    let (status, body) = get(&router, BAD_TILE_URL).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("<TileMapServerError>"));
    assert!(!body.contains("<h2>Request</h2>"));
    assert!(!body.contains("mapproxy.yaml"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_bad_request_with_debug() {
    let fixture = Fixture::new(BASIC_CONFIG);
    let router = mounted(&fixture.state(true));

    let (status, body) = get(&router, BAD_TILE_URL).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("<h2>Request</h2>"));
    assert!(body.contains("GET /tms/1.0.0/osm/GLOBAL_WEBMERCATOR/0/0/x.png"));
    assert!(body.contains("tiles.test"));
    assert!(body.contains("invalid_request"));
    assert!(body.contains("mapproxy.yaml"));
    assert!(body.contains("osm/GLOBAL_WEBMERCATOR"));
}

#[test]
fn test_debug_detail_on_direct_call() {
    let fixture = Fixture::new(BASIC_CONFIG);
    let request = || {
        http::Request::get("/tms/1.0.0/osm/GLOBAL_WEBMERCATOR/0/0/x.png")
            .body(bytes::Bytes::new())
            .unwrap()
    };

    let plain = fixture.state(false).bridge().app().call(request());
    let debug = fixture.state(true).bridge().app().call(request());

    assert_eq!(plain.status(), debug.status());
    let plain_detail = plain.extensions().get::<ErrorDetail>().unwrap();
    let debug_detail = debug.extensions().get::<ErrorDetail>().unwrap();
    assert_eq!(plain_detail, debug_detail);
    assert_eq!(plain_detail.service, Some("tms"));
    assert!(text(&debug).len() > text(&plain).len());
}
