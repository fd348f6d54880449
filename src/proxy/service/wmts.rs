//! Web Map Tile Service (RESTful and KVP).
//!
//! # Endpoints
//!
//! - `GET /wmts/1.0.0/WMTSCapabilities.xml` - Capabilities (RESTful)
//! - `GET /wmts/{Layer}/{TileMatrixSet}/{TileMatrix}/{TileCol}/{TileRow}.{Format}` - Tile (RESTful, template configurable)
//! - `GET /service?SERVICE=WMTS&REQUEST=GetCapabilities` - Capabilities (KVP)
//! - `GET /service?SERVICE=WMTS&REQUEST=GetTile&LAYER=..&TILEMATRIXSET=..&TILEMATRIX=..&TILEROW=..&TILECOL=..` - Tile (KVP)
//!
//! Tile rows are counted from the top of the tile matrix.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::{Response, StatusCode};

use super::{parse_coord, respond, status_of, Service, ServiceRequest};
use crate::error::{ConfigurationError, ProxyError};
use crate::markup::escape;
use crate::proxy::grid::{Grid, Origin};
use crate::proxy::layer::{find_layer, TileLayer};

/// Default RESTful tile URL template.
pub const DEFAULT_RESTFUL_TEMPLATE: &str =
    "/{Layer}/{TileMatrixSet}/{TileMatrix}/{TileCol}/{TileRow}.{Format}";

const REQUIRED_VARIABLES: [&str; 5] = ["Layer", "TileMatrixSet", "TileMatrix", "TileCol", "TileRow"];

// =============================================================================
// RESTful template
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Literal(String),
    Variable(String),
}

/// Parsed RESTful URL template.
#[derive(Debug, Clone)]
pub struct RestTemplate {
    source: String,
    segments: Vec<Vec<Token>>,
}

impl RestTemplate {
    pub fn parse(template: &str) -> Result<Self, ConfigurationError> {
        let invalid =
            |reason: &str| ConfigurationError::Build(format!("invalid restful_template '{}': {}", template, reason));

        let mut segments = Vec::new();
        for segment in template.trim_start_matches('/').split('/') {
            let mut tokens = Vec::new();
            let mut rest = segment;
            while !rest.is_empty() {
                if let Some(after) = rest.strip_prefix('{') {
                    let end = after.find('}').ok_or_else(|| invalid("unclosed '{'"))?;
                    if matches!(tokens.last(), Some(Token::Variable(_))) {
                        return Err(invalid("variables must be separated by literal text"));
                    }
                    tokens.push(Token::Variable(after[..end].to_string()));
                    rest = &after[end + 1..];
                } else {
                    let end = rest.find('{').unwrap_or(rest.len());
                    tokens.push(Token::Literal(rest[..end].to_string()));
                    rest = &rest[end..];
                }
            }
            if tokens.is_empty() {
                return Err(invalid("empty path segment"));
            }
            segments.push(tokens);
        }

        let parsed = Self {
            source: template.to_string(),
            segments,
        };
        for variable in REQUIRED_VARIABLES {
            if !parsed.has_variable(variable) {
                return Err(invalid(&format!("missing {{{}}}", variable)));
            }
        }
        Ok(parsed)
    }

    fn has_variable(&self, name: &str) -> bool {
        self.segments
            .iter()
            .flatten()
            .any(|t| matches!(t, Token::Variable(v) if v == name))
    }

    /// Match request path segments, returning the variable values.
    pub fn matches(&self, path: &[&str]) -> Option<HashMap<String, String>> {
        if path.len() != self.segments.len() {
            return None;
        }
        let mut values = HashMap::new();
        for (tokens, segment) in self.segments.iter().zip(path) {
            let mut rest: &str = segment;
            for (index, token) in tokens.iter().enumerate() {
                match token {
                    Token::Literal(literal) => rest = rest.strip_prefix(literal.as_str())?,
                    Token::Variable(name) => {
                        let end = match tokens.get(index + 1) {
                            Some(Token::Literal(next)) => rest.find(next.as_str())?,
                            _ => rest.len(),
                        };
                        if end == 0 {
                            return None;
                        }
                        values.insert(name.clone(), rest[..end].to_string());
                        rest = &rest[end..];
                    }
                }
            }
            if !rest.is_empty() {
                return None;
            }
        }
        Some(values)
    }

    /// Fill in the given variables, leaving the others as `{Name}` placeholders.
    pub fn expand(&self, values: &[(&str, &str)]) -> String {
        let mut url = String::new();
        for tokens in &self.segments {
            url.push('/');
            for token in tokens {
                match token {
                    Token::Literal(literal) => url.push_str(literal),
                    Token::Variable(name) => match values.iter().find(|(k, _)| k == name) {
                        Some((_, value)) => url.push_str(value),
                        None => {
                            url.push('{');
                            url.push_str(name);
                            url.push('}');
                        }
                    },
                }
            }
        }
        url
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

// =============================================================================
// Service
// =============================================================================

#[derive(Debug)]
pub struct WmtsService {
    layers: Vec<Arc<TileLayer>>,
    restful: bool,
    kvp: bool,
    template: RestTemplate,
    title: String,
}

impl WmtsService {
    pub fn new(
        layers: Vec<Arc<TileLayer>>,
        restful: bool,
        kvp: bool,
        template: RestTemplate,
        title: impl Into<String>,
    ) -> Self {
        Self {
            layers,
            restful,
            kvp,
            template,
            title: title.into(),
        }
    }

    fn tile(
        &self,
        name: &str,
        matrix_set: &str,
        matrix: &str,
        col: &str,
        row: &str,
        format: Option<&str>,
    ) -> Result<Response<Bytes>, ProxyError> {
        let z = parse_coord(matrix, "TileMatrix")?;
        let x = parse_coord(col, "TileCol")?;
        let y = parse_coord(row, "TileRow")?;

        let layer = find_layer(&self.layers, name, matrix_set)?;
        if let Some(format) = format {
            if !layer.format().matches(format) {
                return Err(ProxyError::InvalidRequest(format!(
                    "invalid format '{}' for layer '{}' (expected {})",
                    format,
                    layer.name,
                    layer.format().mime_type
                )));
            }
        }

        layer.grid.check_tile(z, x, y)?;
        let grid_row = layer.grid.row_from(Origin::NorthWest, z, y);
        let data = layer.tile(z, x, grid_row)?;
        Ok(respond(StatusCode::OK, &layer.format().mime_type, data))
    }

    fn capabilities(&self, base_url: &str) -> Response<Bytes> {
        let base = escape(base_url);
        let mut xml = String::from("<?xml version=\"1.0\"?>\n");
        xml.push_str(
            "<Capabilities xmlns=\"http://www.opengis.net/wmts/1.0\" \
             xmlns:ows=\"http://www.opengis.net/ows/1.1\" \
             xmlns:xlink=\"http://www.w3.org/1999/xlink\" version=\"1.0.0\">\n",
        );
        xml.push_str(&format!(
            "  <ows:ServiceIdentification>\n    <ows:Title>{}</ows:Title>\n    \
             <ows:ServiceType>OGC WMTS</ows:ServiceType>\n    \
             <ows:ServiceTypeVersion>1.0.0</ows:ServiceTypeVersion>\n  \
             </ows:ServiceIdentification>\n",
            escape(&self.title)
        ));

        if self.kvp {
            xml.push_str("  <ows:OperationsMetadata>\n");
            for operation in ["GetCapabilities", "GetTile"] {
                xml.push_str(&format!(
                    "    <ows:Operation name=\"{operation}\">\n      <ows:DCP><ows:HTTP>\
                     <ows:Get xlink:href=\"{base}/service?\"><ows:Constraint name=\"GetEncoding\">\
                     <ows:AllowedValues><ows:Value>KVP</ows:Value></ows:AllowedValues>\
                     </ows:Constraint></ows:Get></ows:HTTP></ows:DCP>\n    </ows:Operation>\n"
                ));
            }
            xml.push_str("  </ows:OperationsMetadata>\n");
        }

        xml.push_str("  <Contents>\n");
        let mut grids: Vec<&Grid> = Vec::new();
        for (name, layers) in group_by_name(&self.layers) {
            let first = layers[0];
            xml.push_str("    <Layer>\n");
            xml.push_str(&format!(
                "      <ows:Title>{}</ows:Title>\n      <ows:Identifier>{}</ows:Identifier>\n",
                escape(&first.title),
                escape(name)
            ));
            xml.push_str(
                "      <Style isDefault=\"true\"><ows:Identifier>default</ows:Identifier></Style>\n",
            );
            xml.push_str(&format!(
                "      <Format>{}</Format>\n",
                escape(&first.format().mime_type)
            ));
            for layer in &layers {
                xml.push_str(&format!(
                    "      <TileMatrixSetLink><TileMatrixSet>{}</TileMatrixSet></TileMatrixSetLink>\n",
                    escape(&layer.grid.name)
                ));
                if !grids.iter().any(|g| g.name == layer.grid.name) {
                    grids.push(&layer.grid);
                }
            }
            if self.restful {
                let template = self.template.expand(&[
                    ("Layer", name),
                    ("Format", &first.format().extension),
                ]);
                xml.push_str(&format!(
                    "      <ResourceURL format=\"{}\" resourceType=\"tile\" template=\"{}/wmts{}\"/>\n",
                    escape(&first.format().mime_type),
                    base,
                    escape(&template)
                ));
            }
            xml.push_str("    </Layer>\n");
        }

        for grid in grids {
            xml.push_str(&tile_matrix_set(grid));
        }
        xml.push_str("  </Contents>\n");

        if self.restful {
            xml.push_str(&format!(
                "  <ServiceMetadataURL xlink:href=\"{}/wmts/1.0.0/WMTSCapabilities.xml\"/>\n",
                base
            ));
        }
        xml.push_str("</Capabilities>\n");

        respond(StatusCode::OK, "application/xml", xml)
    }
}

fn group_by_name(layers: &[Arc<TileLayer>]) -> Vec<(&str, Vec<&TileLayer>)> {
    let mut groups: Vec<(&str, Vec<&TileLayer>)> = Vec::new();
    for layer in layers {
        match groups.iter_mut().find(|(name, _)| *name == layer.name) {
            Some((_, members)) => members.push(layer),
            None => groups.push((&layer.name, vec![layer])),
        }
    }
    groups
}

fn supported_crs(srs: &str) -> String {
    match srs.split_once(':') {
        Some((authority, code)) if authority.eq_ignore_ascii_case("EPSG") => {
            format!("urn:ogc:def:crs:EPSG::{}", code)
        }
        _ => srs.to_string(),
    }
}

fn tile_matrix_set(grid: &Grid) -> String {
    let mut xml = format!(
        "    <TileMatrixSet>\n      <ows:Identifier>{}</ows:Identifier>\n      \
         <ows:SupportedCRS>{}</ows:SupportedCRS>\n",
        escape(&grid.name),
        escape(&supported_crs(&grid.srs))
    );
    for level in 0..grid.num_levels() {
        let (Some(scale), Some((left, top)), Some((cols, rows))) = (
            grid.scale_denominator(level),
            grid.top_left_corner(level),
            grid.tile_matrix(level),
        ) else {
            continue;
        };
        // EPSG:4326 uses latitude/longitude axis order.
        let corner = if grid.is_geographic() {
            format!("{} {}", top, left)
        } else {
            format!("{} {}", left, top)
        };
        xml.push_str(&format!(
            "      <TileMatrix>\n        <ows:Identifier>{level:02}</ows:Identifier>\n        \
             <ScaleDenominator>{scale}</ScaleDenominator>\n        \
             <TopLeftCorner>{corner}</TopLeftCorner>\n        \
             <TileWidth>{}</TileWidth>\n        <TileHeight>{}</TileHeight>\n        \
             <MatrixWidth>{cols}</MatrixWidth>\n        <MatrixHeight>{rows}</MatrixHeight>\n      \
             </TileMatrix>\n",
            grid.tile_size.0, grid.tile_size.1,
        ));
    }
    xml.push_str("    </TileMatrixSet>\n");
    xml
}

impl Service for WmtsService {
    fn name(&self) -> &'static str {
        "wmts"
    }

    fn path_segment(&self) -> Option<&'static str> {
        Some("wmts")
    }

    fn index_path(&self) -> Option<&'static str> {
        if self.restful {
            Some("wmts/1.0.0/WMTSCapabilities.xml")
        } else {
            Some("service?SERVICE=WMTS&REQUEST=GetCapabilities")
        }
    }

    fn kvp_name(&self) -> Option<&'static str> {
        self.kvp.then_some("wmts")
    }

    fn handle(&self, request: &ServiceRequest<'_>) -> Result<Response<Bytes>, ProxyError> {
        if !self.restful {
            return Err(ProxyError::NotFound(
                "RESTful WMTS is disabled, use the KVP endpoint".to_string(),
            ));
        }
        if let ["1.0.0", "WMTSCapabilities.xml"] = request.segments.as_slice() {
            return Ok(self.capabilities(&request.base_url));
        }

        let values = self.template.matches(&request.segments).ok_or_else(|| {
            ProxyError::InvalidRequest(format!(
                "request does not match the WMTS template {}",
                self.template.as_str()
            ))
        })?;
        let value = |name: &str| values.get(name).map(String::as_str).unwrap_or_default();
        self.tile(
            value("Layer"),
            value("TileMatrixSet"),
            value("TileMatrix"),
            value("TileCol"),
            value("TileRow"),
            values.get("Format").map(String::as_str),
        )
    }

    fn handle_kvp(&self, request: &ServiceRequest<'_>) -> Result<Response<Bytes>, ProxyError> {
        let operation = request.require("REQUEST")?;
        if operation.eq_ignore_ascii_case("GetCapabilities") {
            Ok(self.capabilities(&request.base_url))
        } else if operation.eq_ignore_ascii_case("GetTile") {
            self.tile(
                request.require("LAYER")?,
                request.require("TILEMATRIXSET")?,
                request.require("TILEMATRIX")?,
                request.require("TILECOL")?,
                request.require("TILEROW")?,
                request.param("FORMAT"),
            )
        } else {
            Err(ProxyError::InvalidRequest(format!(
                "unknown WMTS request '{}'",
                operation
            )))
        }
    }

    fn render_error(&self, error: &ProxyError) -> Response<Bytes> {
        let code = match error {
            ProxyError::MissingParameter(_) => "MissingParameterValue",
            ProxyError::InvalidRequest(_) | ProxyError::NotFound(_) => "InvalidParameterValue",
            ProxyError::TileOutOfBounds { .. } => "TileOutOfRange",
            ProxyError::TileNotCached { .. } | ProxyError::Io { .. } => "NoApplicableCode",
        };
        let body = format!(
            "<?xml version=\"1.0\"?>\n\
             <ExceptionReport xmlns=\"http://www.opengis.net/ows/1.1\" version=\"1.1.0\" xml:lang=\"en\">\n  \
             <Exception exceptionCode=\"{}\">\n    <ExceptionText>{}</ExceptionText>\n  </Exception>\n\
             </ExceptionReport>\n",
            code,
            escape(&error.to_string())
        );
        respond(status_of(error), "application/xml", body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::cache::{DirectoryLayout, FileCache, TileFormat};
    use http::Method;

    fn service(dir: &std::path::Path) -> WmtsService {
        let layer = TileLayer {
            name: "osm".to_string(),
            title: "OSM".to_string(),
            grid: Arc::new(Grid::builtin("GLOBAL_MERCATOR").unwrap()),
            cache: FileCache::new(dir, DirectoryLayout::Tms, TileFormat::default()),
        };
        WmtsService::new(
            vec![Arc::new(layer)],
            true,
            true,
            RestTemplate::parse(DEFAULT_RESTFUL_TEMPLATE).unwrap(),
            "Tiles",
        )
    }

    fn request<'a>(method: &'a Method, segments: Vec<&'a str>, query: &[(&str, &str)]) -> ServiceRequest<'a> {
        ServiceRequest {
            method,
            segments,
            query: query
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            base_url: "http://localhost".to_string(),
        }
    }

    #[test]
    fn test_template_matching() {
        let template = RestTemplate::parse(DEFAULT_RESTFUL_TEMPLATE).unwrap();
        let values = template
            .matches(&["osm", "GLOBAL_MERCATOR", "03", "1", "2.png"])
            .unwrap();
        assert_eq!(values["Layer"], "osm");
        assert_eq!(values["TileMatrix"], "03");
        assert_eq!(values["TileRow"], "2");
        assert_eq!(values["Format"], "png");

        assert!(template.matches(&["osm", "GLOBAL_MERCATOR", "03", "1"]).is_none());
        assert!(template.matches(&["osm", "GLOBAL_MERCATOR", "03", "1", "2"]).is_none());
    }

    #[test]
    fn test_custom_template() {
        let template =
            RestTemplate::parse("/tiles/{TileMatrixSet}-{Layer}/{TileMatrix}/{TileCol}/{TileRow}.{Format}")
                .unwrap();
        let values = template
            .matches(&["tiles", "webmerc-osm", "1", "0", "0.jpeg"])
            .unwrap();
        assert_eq!(values["TileMatrixSet"], "webmerc");
        assert_eq!(values["Layer"], "osm");
        assert_eq!(
            template.expand(&[("Layer", "osm"), ("Format", "png")]),
            "/tiles/{TileMatrixSet}-osm/{TileMatrix}/{TileCol}/{TileRow}.png"
        );
    }

    #[test]
    fn test_template_requires_variables() {
        assert!(RestTemplate::parse("/{Layer}/{TileMatrix}/{TileCol}/{TileRow}.png").is_err());
        assert!(RestTemplate::parse("/{Layer}{TileMatrixSet}/{TileMatrix}/{TileCol}/{TileRow}").is_err());
    }

    #[test]
    fn test_rest_tile_counts_rows_from_top() {
        let dir = tempfile::tempdir().unwrap();
        // GLOBAL_MERCATOR has a lower-left origin: WMTS row 0 at level 1 is grid row 1.
        let path = dir.path().join("1/0/1.png");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"png").unwrap();

        let wmts = service(dir.path());
        let method = Method::GET;
        let response = wmts
            .handle(&request(&method, vec!["osm", "GLOBAL_MERCATOR", "1", "0", "0.png"], &[]))
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body().as_ref(), b"png");
    }

    #[test]
    fn test_kvp_get_tile_missing_parameter() {
        let dir = tempfile::tempdir().unwrap();
        let wmts = service(dir.path());
        let method = Method::GET;
        let err = wmts
            .handle_kvp(&request(&method, vec![], &[("request", "GetTile"), ("layer", "osm")]))
            .unwrap_err();
        assert!(matches!(err, ProxyError::MissingParameter(ref p) if p == "TILEMATRIXSET"));

        let response = wmts.render_error(&err);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = String::from_utf8(response.body().to_vec()).unwrap();
        assert!(body.contains("exceptionCode=\"MissingParameterValue\""));
    }

    #[test]
    fn test_capabilities() {
        let dir = tempfile::tempdir().unwrap();
        let wmts = service(dir.path());
        let method = Method::GET;
        let response = wmts
            .handle_kvp(&request(&method, vec![], &[("REQUEST", "GetCapabilities")]))
            .unwrap();
        let body = String::from_utf8(response.body().to_vec()).unwrap();
        assert!(body.contains("<ows:Identifier>osm</ows:Identifier>"));
        assert!(body.contains("urn:ogc:def:crs:EPSG::900913"));
        assert!(body.contains(
            "template=\"http://localhost/wmts/osm/{TileMatrixSet}/{TileMatrix}/{TileCol}/{TileRow}.png\""
        ));
        assert!(body.contains("<MatrixWidth>2</MatrixWidth>"));
    }
}
