//! The synchronous tile-proxy application.
//!
//! # Routing
//!
//! - `/` - Index page linking the configured services
//! - `/service`, `/ows` - KVP requests, dispatched on the `SERVICE` parameter
//! - `/{segment}/...` - The service whose path segment matches
//!
//! Request errors are rendered by the service that owns the request and
//! logged by severity: 5xx at ERROR, 404 at DEBUG, other 4xx at WARN.

use std::borrow::Cow;
use std::error::Error as StdError;

use bytes::Bytes;
use http::header::HOST;
use http::{Request, Response, StatusCode};
use tracing::{debug, error, warn};

use super::loader::{BaseConfig, ConfigFile};
use super::service::{error_type, plain_error, respond, Service, ServiceRequest};
use crate::bridge::{ScriptName, SyncApp};
use crate::error::ProxyError;
use crate::markup::{escape, html_page};

/// Details of a failed request, attached to the error response as an extension.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorDetail {
    /// Service that rendered the error, if any claimed the request
    pub service: Option<&'static str>,
    pub error_type: &'static str,
    pub message: String,
    /// Messages of the error's source chain, outermost first
    pub chain: Vec<String>,
}

impl ErrorDetail {
    fn new(service: Option<&'static str>, error: &ProxyError) -> Self {
        let mut chain = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            chain.push(cause.to_string());
            source = cause.source();
        }
        Self {
            service,
            error_type: error_type(error),
            message: error.to_string(),
            chain,
        }
    }
}

pub struct ProxyApp {
    services: Vec<Box<dyn Service>>,
    base: BaseConfig,
    config_files: Option<Vec<ConfigFile>>,
}

impl ProxyApp {
    /// Create the application. Configuration files are tracked for changes
    /// until [`clear_config_files`](Self::clear_config_files) is called.
    pub fn new(services: Vec<Box<dyn Service>>, base: BaseConfig) -> Self {
        let config_files = Some(base.config_files.clone());
        Self {
            services,
            base,
            config_files,
        }
    }

    /// Stop checking the configuration files for changes.
    pub fn clear_config_files(&mut self) {
        self.config_files = None;
    }

    pub fn config_files(&self) -> Option<&[ConfigFile]> {
        self.config_files.as_deref()
    }

    pub fn base_config(&self) -> &BaseConfig {
        &self.base
    }

    pub fn service_names(&self) -> Vec<&'static str> {
        self.services.iter().map(|s| s.name()).collect()
    }

    fn check_config_files(&self) {
        for file in self.config_files.iter().flatten() {
            if file.is_modified() {
                warn!(
                    path = %file.path.display(),
                    "configuration file changed since startup, restart to apply"
                );
            }
        }
    }

    fn index(&self, base_url: &str) -> Response<Bytes> {
        let links: String = self
            .services
            .iter()
            .filter_map(|service| {
                service.index_path().map(|path| {
                    format!(
                        "<li><a href=\"{}/{}\">{}</a></li>\n",
                        escape(base_url),
                        escape(path),
                        service.name().to_ascii_uppercase()
                    )
                })
            })
            .collect();
        let body = if links.is_empty() {
            "<p>No services configured.</p>\n".to_string()
        } else {
            format!("<ul>\n{}</ul>\n", links)
        };
        respond(
            StatusCode::OK,
            "text/html; charset=utf-8",
            html_page("Tile proxy", &body),
        )
    }

    fn kvp_service(&self, request: &ServiceRequest<'_>) -> Result<&dyn Service, ProxyError> {
        let name = request.require("SERVICE")?;
        self.services
            .iter()
            .find(|s| s.kvp_name().is_some_and(|kvp| kvp.eq_ignore_ascii_case(name)))
            .map(|s| s.as_ref())
            .ok_or_else(|| ProxyError::NotFound(format!("unknown service '{}'", name)))
    }

    fn error_response(&self, service: Option<&dyn Service>, error: ProxyError) -> Response<Bytes> {
        let mut response = match service {
            Some(service) => service.render_error(&error),
            None => plain_error(&error),
        };
        let status = response.status();
        let service_name = service.map(|s| s.name());

        if status.is_server_error() {
            error!(service = ?service_name, error = %error, "request failed");
        } else if status == StatusCode::NOT_FOUND {
            debug!(service = ?service_name, error = %error, "not found");
        } else {
            warn!(service = ?service_name, error = %error, "bad request");
        }

        response
            .extensions_mut()
            .insert(ErrorDetail::new(service_name, &error));
        response
    }
}

impl SyncApp for ProxyApp {
    fn call(&self, request: Request<Bytes>) -> Response<Bytes> {
        self.check_config_files();

        let segments: Vec<Cow<'_, str>> = request
            .uri()
            .path()
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| urlencoding::decode(s).unwrap_or(Cow::Borrowed(s)))
            .collect();
        let query: Vec<(String, String)> = request
            .uri()
            .query()
            .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();
        let base_url = base_url(&request);

        let Some((first, rest)) = segments.split_first() else {
            return self.index(&base_url);
        };
        let first: &str = first;
        let service_request = ServiceRequest {
            method: request.method(),
            segments: rest.iter().map(|s| &**s).collect(),
            query,
            base_url,
        };

        if first == "service" || first == "ows" {
            let service = match self.kvp_service(&service_request) {
                Ok(service) => service,
                Err(e) => return self.error_response(None, e),
            };
            return match service.handle_kvp(&service_request) {
                Ok(response) => response,
                Err(e) => self.error_response(Some(service), e),
            };
        }

        let Some(service) = self
            .services
            .iter()
            .find(|s| s.path_segment() == Some(first))
        else {
            let error = ProxyError::NotFound(format!("no service at '/{}'", first));
            return self.error_response(None, error);
        };

        match service.handle(&service_request) {
            Ok(response) => response,
            Err(e) => self.error_response(Some(service.as_ref()), e),
        }
    }
}

/// `scheme://host` plus the mount point the request arrived under.
fn base_url(request: &Request<Bytes>) -> String {
    let headers = request.headers();
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let scheme = header("x-forwarded-proto")
        .or_else(|| request.uri().scheme_str())
        .unwrap_or("http");
    let host = header("x-forwarded-host")
        .or_else(|| header(HOST.as_str()))
        .or_else(|| request.uri().authority().map(|a| a.as_str()))
        .unwrap_or("localhost");
    let script_name = request
        .extensions()
        .get::<ScriptName>()
        .map(|s| s.0.as_str())
        .unwrap_or("");

    format!("{}://{}{}", scheme, host, script_name)
}
