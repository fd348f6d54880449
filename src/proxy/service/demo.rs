//! Demo page listing the tile layers and links into the tile services.

use std::sync::Arc;

use bytes::Bytes;
use http::{Response, StatusCode};

use super::{respond, Service, ServiceRequest};
use crate::error::ProxyError;
use crate::markup::{escape, html_page};
use crate::proxy::layer::TileLayer;

#[derive(Debug)]
pub struct DemoService {
    layers: Vec<Arc<TileLayer>>,
    tms: bool,
    wmts: bool,
}

impl DemoService {
    /// `tms` / `wmts` select which service links are rendered.
    pub fn new(layers: Vec<Arc<TileLayer>>, tms: bool, wmts: bool) -> Self {
        Self { layers, tms, wmts }
    }

    fn page(&self, base_url: &str) -> String {
        let base = escape(base_url);
        let mut body = String::new();

        if self.layers.is_empty() {
            body.push_str("<p>No tile layers configured.</p>\n");
        } else {
            body.push_str("<table>\n<tr><th>Layer</th><th>Grid</th><th>Format</th><th>Services</th></tr>\n");
            for layer in &self.layers {
                let mut links = Vec::new();
                if self.tms {
                    links.push(format!(
                        "<a href=\"{}/tms/1.0.0/{}/{}\">TMS</a>",
                        base,
                        escape(&urlencoding::encode(&layer.name)),
                        escape(&urlencoding::encode(&layer.grid.name))
                    ));
                }
                if self.wmts {
                    links.push(format!(
                        "<a href=\"{}/wmts/1.0.0/WMTSCapabilities.xml\">WMTS</a>",
                        base
                    ));
                }
                body.push_str(&format!(
                    "<tr><td>{}<br><small>{}</small></td><td>{} ({})</td><td>{}</td><td>{}</td></tr>\n",
                    escape(&layer.title),
                    escape(&layer.name),
                    escape(&layer.grid.name),
                    escape(&layer.grid.srs),
                    escape(&layer.format().mime_type),
                    links.join(" ")
                ));
            }
            body.push_str("</table>\n");
        }

        html_page("Tile proxy demo", &body)
    }
}

impl Service for DemoService {
    fn name(&self) -> &'static str {
        "demo"
    }

    fn path_segment(&self) -> Option<&'static str> {
        Some("demo")
    }

    fn index_path(&self) -> Option<&'static str> {
        Some("demo/")
    }

    fn handle(&self, request: &ServiceRequest<'_>) -> Result<Response<Bytes>, ProxyError> {
        if !request.segments.is_empty() {
            return Err(ProxyError::NotFound(format!(
                "no demo page at '{}'",
                request.segments.join("/")
            )));
        }
        Ok(respond(
            StatusCode::OK,
            "text/html; charset=utf-8",
            self.page(&request.base_url),
        ))
    }
}
