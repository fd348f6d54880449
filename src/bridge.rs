//! Bridge between the synchronous tile-proxy application and axum.
//!
//! The tile proxy answers requests through the blocking [`SyncApp`] trait.
//! [`BlockingBridge`] collects the request body, records the mount point as a
//! [`ScriptName`] extension and runs the call on tokio's blocking pool, so it
//! can be used anywhere axum accepts a `tower::Service`.
//!
//! # Example
//!
//! ```ignore
//! let bridge = BlockingBridge::new(app);
//! let router = Router::new().fallback_service(bridge);
//! ```

use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::OriginalUri;
use axum::response::{IntoResponse, Response};
use axum::Router;
use bytes::Bytes;
use http::{Request, StatusCode};
use tower::ServiceExt;
use tracing::{error, warn};

/// Largest request body handed to the synchronous application.
pub const DEFAULT_MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

/// A blocking request handler.
pub trait SyncApp: Send + Sync + 'static {
    fn call(&self, request: Request<Bytes>) -> http::Response<Bytes>;
}

/// Path prefix the bridged application is mounted under (`""` at the root).
///
/// Inserted as a request extension before the synchronous call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptName(pub String);

/// One-method request handling capability shared by native routers and bridged apps.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, request: Request<Body>) -> Response;
}

#[async_trait]
impl RequestHandler for Router {
    async fn handle(&self, request: Request<Body>) -> Response {
        match self.clone().oneshot(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        }
    }
}

/// Runs a [`SyncApp`] on the blocking thread pool.
#[derive(Clone)]
pub struct BlockingBridge {
    app: Arc<dyn SyncApp>,
    max_body_size: usize,
}

impl BlockingBridge {
    pub fn new(app: Arc<dyn SyncApp>) -> Self {
        Self {
            app,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }

    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    pub fn app(&self) -> &Arc<dyn SyncApp> {
        &self.app
    }
}

impl fmt::Debug for BlockingBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingBridge")
            .field("max_body_size", &self.max_body_size)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RequestHandler for BlockingBridge {
    async fn handle(&self, request: Request<Body>) -> Response {
        let (mut parts, body) = request.into_parts();

        let body = match axum::body::to_bytes(body, self.max_body_size).await {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "could not read request body");
                return (
                    StatusCode::PAYLOAD_TOO_LARGE,
                    format!("could not read request body: {}", e),
                )
                    .into_response();
            }
        };

        let mount_point = parts
            .extensions
            .get::<OriginalUri>()
            .map(|original| script_name(original.0.path(), parts.uri.path()))
            .unwrap_or_default();
        parts.extensions.insert(ScriptName(mount_point));

        let request = Request::from_parts(parts, body);
        let app = Arc::clone(&self.app);
        match tokio::task::spawn_blocking(move || app.call(request)).await {
            Ok(response) => response.map(Body::from),
            Err(e) => {
                error!(error = %e, "tile proxy application failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
            }
        }
    }
}

impl tower::Service<Request<Body>> for BlockingBridge {
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let bridge = self.clone();
        Box::pin(async move { Ok(bridge.handle(request).await) })
    }
}

/// Mount point of a request: the part of `original` that routing stripped to get `current`.
pub fn script_name(original: &str, current: &str) -> String {
    let prefix = if current == "/" {
        original
    } else {
        original.strip_suffix(current).unwrap_or("")
    };
    prefix.trim_end_matches('/').to_string()
}
