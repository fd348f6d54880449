//! Mounting wrapper around the bridged tile proxy.
//!
//! A [`ProxyMount`] owns a router with the wrapper's own routes (status,
//! documentation, OpenAPI). [`ProxyMount::mount_to`] installs the bridged
//! tile proxy as that router's fallback and nests it into a parent router.
//!
//! # Example
//!
//! ```ignore
//! let state = ProxyState::install(ProxyState::from_env()?)?;
//! let mut app = Router::new();
//! ProxyMount::new(state).mount_to(&mut app, Some("/mapproxy"))?;
//! ```

use axum::routing::get;
use axum::Router;
use tracing::info;

use super::handlers::{docs_handler, openapi_handler, status_handler, DocsState, OPENAPI_PATH};
use crate::bridge::BlockingBridge;
use crate::config::{normalize_prefix, DEFAULT_DOCS_PATH};
use crate::error::SettingsError;
use crate::state::ProxyState;

#[derive(Debug, Clone)]
pub struct ProxyMount {
    router: Router,
    bridge: BlockingBridge,
    prefix: String,
    title: String,
    docs_path: String,
}

impl ProxyMount {
    /// Wrapper over the process state, using its context path and title.
    pub fn new(state: &ProxyState) -> Self {
        let mut mount = Self::from_bridge(state.bridge().clone(), state.settings().title.clone());
        mount.prefix = state.mount_prefix().to_string();
        mount
    }

    /// Wrapper over an explicit bridge, mounted at the root unless changed.
    pub fn from_bridge(bridge: BlockingBridge, title: impl Into<String>) -> Self {
        let title = title.into();
        let docs_path = DEFAULT_DOCS_PATH.to_string();
        Self {
            router: wrapper_routes(&title, &docs_path),
            bridge,
            prefix: String::new(),
            title,
            docs_path,
        }
    }

    pub fn with_prefix(mut self, prefix: &str) -> Result<Self, SettingsError> {
        self.prefix = normalize_prefix(prefix)?;
        Ok(self)
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self.router = wrapper_routes(&self.title, &self.docs_path);
        self
    }

    /// Path of the documentation route, relative to the prefix.
    pub fn with_docs_path(mut self, docs_path: &str) -> Result<Self, SettingsError> {
        let docs_path = normalize_prefix(docs_path)?;
        if docs_path.is_empty() || docs_path == OPENAPI_PATH || docs_path == "/status" {
            return Err(SettingsError::InvalidContextPath {
                path: docs_path,
                reason: "documentation path must not be empty or shadow another wrapper route",
            });
        }
        self.docs_path = docs_path;
        self.router = wrapper_routes(&self.title, &self.docs_path);
        Ok(self)
    }

    /// The wrapper's own router.
    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn docs_path(&self) -> &str {
        &self.docs_path
    }

    /// Mount the bridged tile proxy and nest the wrapper into `parent`.
    ///
    /// `prefix` overrides the configured prefix. At the root the wrapper is
    /// merged instead of nested, so `parent` must not have its own fallback.
    pub fn mount_to(&mut self, parent: &mut Router, prefix: Option<&str>) -> Result<(), SettingsError> {
        let prefix = match prefix {
            Some(prefix) => normalize_prefix(prefix)?,
            None => self.prefix.clone(),
        };

        self.router = std::mem::take(&mut self.router).fallback_service(self.bridge.clone());
        let wrapper = self.router.clone();
        let routes = std::mem::take(parent);
        *parent = if prefix.is_empty() {
            routes.merge(wrapper)
        } else {
            routes.nest(&prefix, wrapper)
        };

        let docs = format!("{}{}", prefix, self.docs_path);
        info!(prefix = %prefix, docs = %docs, "tile proxy mounted");
        self.prefix = prefix;
        Ok(())
    }
}

fn wrapper_routes(title: &str, docs_path: &str) -> Router {
    let state = DocsState {
        title: title.to_string(),
        docs_path: docs_path.to_string(),
    };
    Router::new()
        .route("/status", get(status_handler))
        .route(docs_path, get(docs_handler))
        .route(OPENAPI_PATH, get(openapi_handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use bytes::Bytes;
    use http::{Request, Response, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::bridge::{ScriptName, SyncApp};

    struct Echo;

    impl SyncApp for Echo {
        fn call(&self, request: Request<Bytes>) -> Response<Bytes> {
            let script = request
                .extensions()
                .get::<ScriptName>()
                .map(|s| s.0.clone())
                .unwrap_or_default();
            Response::new(Bytes::from(format!("{}|{}", script, request.uri().path())))
        }
    }

    fn mount() -> ProxyMount {
        ProxyMount::from_bridge(BlockingBridge::new(Arc::new(Echo)), "Maps")
    }

    async fn get(router: &Router, uri: &str) -> (StatusCode, String) {
        let response = router
            .clone()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mount_under_prefix() {
        let mut parent = Router::new();
        let mut mount = mount();
        mount.mount_to(&mut parent, Some("maps/")).unwrap();
        assert_eq!(mount.prefix(), "/maps");

        let (status, body) = get(&parent, "/maps/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"{"status":"operational"}"#);

        let (_, body) = get(&parent, "/maps/tms/1.0.0/").await;
        assert_eq!(body, "/maps|/tms/1.0.0/");

        let (status, body) = get(&parent, "/maps/custom-docs").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Maps - Swagger UI"));
        assert!(body.contains("\"/maps/openapi.json\""));

        let (status, _) = get(&parent, "/other").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mount_at_root() {
        let mut parent = Router::new();
        let mut mount = mount().with_docs_path("docs").unwrap();
        mount.mount_to(&mut parent, None).unwrap();

        let (_, body) = get(&parent, "/demo/").await;
        assert_eq!(body, "|/demo/");

        let (status, body) = get(&parent, "/docs").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("\"/openapi.json\""));

        let (_, body) = get(&parent, "/openapi.json").await;
        assert!(body.contains("\"/docs\""));
    }

    #[test]
    fn test_invalid_prefix() {
        assert!(mount().with_prefix("/a b").is_err());
        assert!(mount().with_docs_path("/status").is_err());
    }
}
