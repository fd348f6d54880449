//! Tile-proxy services.
//!
//! Each service answers one first path segment (`/tms`, `/wmts`, `/demo`)
//! and may additionally answer KVP requests on `/service` and `/ows`.
//! Errors are rendered in the protocol's own exception format.

use std::fmt;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Method, Response, StatusCode};

use crate::error::ProxyError;

mod demo;
mod tms;
mod wmts;

pub use demo::DemoService;
pub use tms::TmsService;
pub use wmts::{RestTemplate, WmtsService, DEFAULT_RESTFUL_TEMPLATE};

/// A request as seen by a service.
#[derive(Debug)]
pub struct ServiceRequest<'a> {
    pub method: &'a Method,
    /// Path segments after the service segment
    pub segments: Vec<&'a str>,
    pub query: Vec<(String, String)>,
    /// `scheme://host` plus the mount point, without trailing slash
    pub base_url: String,
}

impl ServiceRequest<'_> {
    /// Case-insensitive query parameter lookup.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Required query parameter.
    pub fn require(&self, name: &str) -> Result<&str, ProxyError> {
        self.param(name)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ProxyError::MissingParameter(name.to_string()))
    }
}

pub trait Service: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// First path segment routed to this service.
    fn path_segment(&self) -> Option<&'static str>;

    /// Entry point linked from the index page, relative to the mount point.
    fn index_path(&self) -> Option<&'static str> {
        None
    }

    /// `SERVICE=` value answered on the KVP endpoints.
    fn kvp_name(&self) -> Option<&'static str> {
        None
    }

    fn handle(&self, request: &ServiceRequest<'_>) -> Result<Response<Bytes>, ProxyError>;

    fn handle_kvp(&self, request: &ServiceRequest<'_>) -> Result<Response<Bytes>, ProxyError> {
        let _ = request;
        Err(ProxyError::NotFound(format!(
            "{} does not answer KVP requests",
            self.name()
        )))
    }

    /// Render an error in the service's exception format.
    fn render_error(&self, error: &ProxyError) -> Response<Bytes> {
        plain_error(error)
    }
}

// =============================================================================
// Response helpers
// =============================================================================

/// HTTP status for a request error.
pub fn status_of(error: &ProxyError) -> StatusCode {
    match error {
        ProxyError::NotFound(_) | ProxyError::TileNotCached { .. } => StatusCode::NOT_FOUND,
        ProxyError::InvalidRequest(_)
        | ProxyError::MissingParameter(_)
        | ProxyError::TileOutOfBounds { .. } => StatusCode::BAD_REQUEST,
        ProxyError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Short machine readable identifier for a request error.
pub fn error_type(error: &ProxyError) -> &'static str {
    match error {
        ProxyError::NotFound(_) => "not_found",
        ProxyError::InvalidRequest(_) => "invalid_request",
        ProxyError::MissingParameter(_) => "missing_parameter",
        ProxyError::TileOutOfBounds { .. } => "tile_out_of_bounds",
        ProxyError::TileNotCached { .. } => "tile_not_cached",
        ProxyError::Io { .. } => "io_error",
    }
}

/// Build a response with a body and content type.
pub fn respond(status: StatusCode, content_type: &str, body: impl Into<Bytes>) -> Response<Bytes> {
    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    let content_type = HeaderValue::from_str(content_type)
        .unwrap_or(HeaderValue::from_static("application/octet-stream"));
    response.headers_mut().insert(CONTENT_TYPE, content_type);
    response
}

/// Plain-text error response, used where no service claims the request.
pub fn plain_error(error: &ProxyError) -> Response<Bytes> {
    respond(
        status_of(error),
        "text/plain; charset=utf-8",
        format!("{}\n", error),
    )
}

/// Parse a tile coordinate path segment.
pub(crate) fn parse_coord(value: &str, what: &str) -> Result<u32, ProxyError> {
    value
        .parse()
        .map_err(|_| ProxyError::InvalidRequest(format!("invalid {} '{}'", what, value)))
}
