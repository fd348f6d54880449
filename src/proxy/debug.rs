//! Debug instrumentation for the tile-proxy application.
//!
//! [`DebugApp`] wraps a [`SyncApp`] and replaces every error response with
//! an HTML diagnostic page. Panics inside the wrapped application become
//! diagnostic 500 pages instead of aborting the request.
//!
//! WARNING: the diagnostic pages expose request headers, configuration file
//! paths and internal error messages. Never enable in production.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;

use bytes::Bytes;
use http::{HeaderMap, Request, Response, StatusCode};
use tracing::error;

use super::app::ErrorDetail;
use super::loader::ProxyConfiguration;
use super::service::respond;
use crate::bridge::SyncApp;
use crate::error::ConfigurationError;
use crate::markup::{escape, html_page};

/// Request bodies and original error bodies are cut to this many bytes.
const MAX_SHOWN_BODY: usize = 4096;

/// Configuration facts shown on diagnostic pages.
#[derive(Debug, Clone, Default)]
pub struct ConfigSummary {
    pub config_files: Vec<PathBuf>,
    pub cache_base_dir: PathBuf,
    pub services: Vec<String>,
    /// `layer/grid` of every tile layer
    pub tile_layers: Vec<String>,
}

impl ConfigSummary {
    pub fn from_configuration(config: &ProxyConfiguration) -> Result<Self, ConfigurationError> {
        let base = config.base_config();
        let services = config
            .raw()
            .get("services")
            .and_then(|s| s.as_mapping())
            .map(|m| m.keys().filter_map(|k| k.as_str()).map(str::to_string).collect())
            .unwrap_or_default();
        let tile_layers = config
            .tile_layers()?
            .iter()
            .map(|l| format!("{}/{}", l.name, l.grid.name))
            .collect();

        Ok(Self {
            config_files: base.config_files.iter().map(|f| f.path.clone()).collect(),
            cache_base_dir: base.cache_base_dir.clone(),
            services,
            tile_layers,
        })
    }
}

pub struct DebugApp<A> {
    inner: A,
    summary: ConfigSummary,
}

impl<A: SyncApp> DebugApp<A> {
    pub fn new(inner: A, summary: ConfigSummary) -> Self {
        Self { inner, summary }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut A {
        &mut self.inner
    }
}

/// What the diagnostic page shows about the incoming request.
struct RequestInfo {
    line: String,
    headers: HeaderMap,
    body: Bytes,
}

impl<A: SyncApp> SyncApp for DebugApp<A> {
    fn call(&self, request: Request<Bytes>) -> Response<Bytes> {
        let info = RequestInfo {
            line: format!("{} {} {:?}", request.method(), request.uri(), request.version()),
            headers: request.headers().clone(),
            body: request.body().clone(),
        };

        match catch_unwind(AssertUnwindSafe(|| self.inner.call(request))) {
            Ok(response) if response.status().is_client_error() || response.status().is_server_error() => {
                self.diagnostic(&info, response)
            }
            Ok(response) => response,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(request = %info.line, panic = %message, "tile proxy application panicked");
                let mut response = respond(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "text/plain; charset=utf-8",
                    message.clone(),
                );
                response.extensions_mut().insert(ErrorDetail {
                    service: None,
                    error_type: "panic",
                    message,
                    chain: Vec::new(),
                });
                self.diagnostic(&info, response)
            }
        }
    }
}

impl<A> DebugApp<A> {
    fn diagnostic(&self, info: &RequestInfo, original: Response<Bytes>) -> Response<Bytes> {
        let status = original.status();
        let (parts, original_body) = original.into_parts();

        let mut body = String::new();

        body.push_str("<h2>Request</h2>\n");
        body.push_str(&format!("<pre>{}</pre>\n<table>\n", escape(&info.line)));
        for (name, value) in &info.headers {
            body.push_str(&format!(
                "<tr><th>{}</th><td>{}</td></tr>\n",
                escape(name.as_str()),
                escape(&String::from_utf8_lossy(value.as_bytes()))
            ));
        }
        body.push_str("</table>\n");
        if !info.body.is_empty() {
            body.push_str(&format!("<pre>{}</pre>\n", escape(&shown_body(&info.body))));
        }

        body.push_str("<h2>Error</h2>\n");
        match parts.extensions.get::<ErrorDetail>() {
            Some(detail) => {
                body.push_str(&format!(
                    "<table>\n<tr><th>Service</th><td>{}</td></tr>\n\
                     <tr><th>Type</th><td>{}</td></tr>\n\
                     <tr><th>Message</th><td>{}</td></tr>\n</table>\n",
                    escape(detail.service.unwrap_or("-")),
                    escape(detail.error_type),
                    escape(&detail.message)
                ));
                if !detail.chain.is_empty() {
                    body.push_str("<h3>Caused by</h3>\n<ol>\n");
                    for cause in &detail.chain {
                        body.push_str(&format!("<li>{}</li>\n", escape(cause)));
                    }
                    body.push_str("</ol>\n");
                }
            }
            None => body.push_str("<p>No error details recorded.</p>\n"),
        }
        body.push_str(&format!(
            "<h3>Service response</h3>\n<pre>{}</pre>\n",
            escape(&shown_body(&original_body))
        ));

        body.push_str("<h2>Configuration</h2>\n<table>\n");
        let rows = [
            ("Files", join_paths(&self.summary.config_files)),
            ("Cache base dir", self.summary.cache_base_dir.display().to_string()),
            ("Services", self.summary.services.join(", ")),
            ("Tile layers", self.summary.tile_layers.join(", ")),
        ];
        for (label, value) in rows {
            body.push_str(&format!(
                "<tr><th>{}</th><td>{}</td></tr>\n",
                label,
                escape(&value)
            ));
        }
        body.push_str("</table>\n");

        let title = format!(
            "{} {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Error")
        );
        let mut response = respond(status, "text/html; charset=utf-8", html_page(&title, &body));
        *response.extensions_mut() = parts.extensions;
        response
    }
}

fn shown_body(body: &Bytes) -> String {
    let shown = &body[..body.len().min(MAX_SHOWN_BODY)];
    let mut text = String::from_utf8_lossy(shown).into_owned();
    if body.len() > MAX_SHOWN_BODY {
        text.push_str(&format!("\n... ({} bytes total)", body.len()));
    }
    text
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
