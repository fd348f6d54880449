//! Test utilities for integration tests.
//!
//! Configuration fixtures in temporary directories, a seeded tile cache and
//! a log capture for asserting on emitted warnings.

use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::Router;
use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;
use tracing_subscriber::fmt::MakeWriter;

use tileproxy_mount::{ProxyMount, ProxyState, Settings};

// =============================================================================
// Configuration Fixtures
// =============================================================================

/// A complete configuration with TMS, WMTS and demo services over one cache.
pub const BASIC_CONFIG: &str = "\
services:
  tms:
  wmts:
  demo:
layers:
  - name: osm
    title: OpenStreetMap
    sources: [osm_cache]
caches:
  osm_cache:
    grids: [GLOBAL_WEBMERCATOR]
    sources: []
";

/// Valid apart from informal problems: an unknown key and a dangling source.
pub const WARNING_CONFIG: &str = "\
services:
  tms:
layers:
  - name: osm
    sources: [osm_cache]
  - name: ghost
    sources: [missing_source]
caches:
  osm_cache:
    sources: []
extra_key: 1
";

/// A hard schema error: a cache that is not a mapping.
pub const BROKEN_CONFIG: &str = "\
services:
  tms:
caches:
  osm_cache: 42
";

pub const TITLE: &str = "Test Maps";
pub const PREFIX: &str = "/maps";

/// A configuration file in its own temporary directory.
pub struct Fixture {
    pub dir: TempDir,
    pub config_path: PathBuf,
}

impl Fixture {
    pub fn new(yaml: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("mapproxy.yaml");
        std::fs::write(&config_path, yaml).unwrap();
        Self { dir, config_path }
    }

    pub fn settings(&self, debug: bool) -> Settings {
        Settings {
            config_path: self.config_path.clone(),
            context_path: PREFIX.to_string(),
            title: TITLE.to_string(),
            debug,
        }
    }

    /// Write a tile into the default TMS-layout directory of `cache`. `y` is the grid row.
    pub fn seed_tile(&self, cache: &str, grid: &str, z: u32, x: u32, y: u32, data: &[u8]) {
        let path = self
            .dir
            .path()
            .join("cache_data")
            .join(format!("{}_{}", cache, grid))
            .join(z.to_string())
            .join(x.to_string())
            .join(format!("{}.png", y));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, data).unwrap();
    }

    pub fn state(&self, debug: bool) -> ProxyState {
        ProxyState::init(self.settings(debug)).unwrap()
    }
}

// =============================================================================
// Routers and Requests
// =============================================================================

/// A parent router with the proxy mounted at the configured prefix.
pub fn mounted(state: &ProxyState) -> Router {
    let mut router = Router::new();
    ProxyMount::new(state).mount_to(&mut router, None).unwrap();
    router
}

pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, http::HeaderMap, Bytes) {
    let response = router.clone().oneshot(request).await.unwrap();
    let (parts, body) = response.into_parts();
    let body = body.collect().await.unwrap().to_bytes();
    (parts.status, parts.headers, body)
}

pub async fn get(router: &Router, uri: &str) -> (StatusCode, String) {
    let request = Request::get(uri)
        .header("host", "tiles.test")
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(router, request).await;
    (status, String::from_utf8_lossy(&body).into_owned())
}

/// GET returning the raw body, for binary tiles.
pub async fn get_bytes(router: &Router, uri: &str) -> (StatusCode, Bytes) {
    let request = Request::get(uri)
        .header("host", "tiles.test")
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(router, request).await;
    (status, body)
}

pub fn text(response: &Response<Bytes>) -> String {
    String::from_utf8_lossy(response.body()).into_owned()
}

// =============================================================================
// Log Capture
// =============================================================================

/// Collects formatted log output in memory.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    pub fn count(&self, needle: &str) -> usize {
        self.contents().matches(needle).count()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Run `f` with every log event on this thread written into the returned capture.
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, LogCapture) {
    let capture = LogCapture::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(capture.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, capture)
}
