//! Tile Map Service.
//!
//! # Endpoints
//!
//! - `GET /tms/1.0.0/` - Service capabilities
//! - `GET /tms/1.0.0/{layer}/{grid}` - Tile map capabilities
//! - `GET /tms/1.0.0/{layer}/{grid}/{z}/{x}/{y}.{ext}` - Tile
//!
//! Rows are counted from the service origin (`sw` unless configured).

use std::sync::Arc;

use bytes::Bytes;
use http::{Response, StatusCode};

use super::{parse_coord, respond, status_of, Service, ServiceRequest};
use crate::error::ProxyError;
use crate::markup::escape;
use crate::proxy::grid::Origin;
use crate::proxy::layer::{find_layer, TileLayer};

const TMS_VERSION: &str = "1.0.0";

#[derive(Debug)]
pub struct TmsService {
    layers: Vec<Arc<TileLayer>>,
    origin: Origin,
}

impl TmsService {
    pub fn new(layers: Vec<Arc<TileLayer>>, origin: Origin) -> Self {
        Self { layers, origin }
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    fn capabilities(&self, base_url: &str) -> Response<Bytes> {
        let tile_maps: String = self
            .layers
            .iter()
            .map(|layer| {
                format!(
                    "    <TileMap title=\"{}\" srs=\"{}\" profile=\"{}\" href=\"{}/tms/{}/{}/{}\" />\n",
                    escape(&layer.title),
                    escape(&layer.grid.srs),
                    layer.grid.profile(),
                    escape(base_url),
                    TMS_VERSION,
                    escape(&layer.name),
                    escape(&layer.grid.name),
                )
            })
            .collect();

        let body = format!(
            "<?xml version=\"1.0\"?>\n\
             <TileMapService version=\"{TMS_VERSION}\">\n  \
             <Title>Tile Map Service</Title>\n  \
             <Abstract></Abstract>\n  \
             <TileMaps>\n{tile_maps}  </TileMaps>\n\
             </TileMapService>\n"
        );
        respond(StatusCode::OK, "text/xml", body)
    }

    fn tile_map(&self, base_url: &str, name: &str, grid: &str) -> Result<Response<Bytes>, ProxyError> {
        let layer = find_layer(&self.layers, name, grid)?;
        let grid = &layer.grid;
        let (origin_x, origin_y) = match self.origin {
            Origin::SouthWest => (grid.bbox[0], grid.bbox[1]),
            Origin::NorthWest => grid.top_left_corner(0).unwrap_or((grid.bbox[0], grid.bbox[3])),
        };
        let href = format!(
            "{}/tms/{}/{}/{}",
            escape(base_url),
            TMS_VERSION,
            escape(&layer.name),
            escape(&grid.name)
        );
        let tile_sets: String = grid
            .resolutions
            .iter()
            .enumerate()
            .map(|(level, res)| {
                format!(
                    "    <TileSet href=\"{}/{}\" units-per-pixel=\"{}\" order=\"{}\" />\n",
                    href, level, res, level
                )
            })
            .collect();

        let body = format!(
            "<?xml version=\"1.0\"?>\n\
             <TileMap version=\"{version}\" tilemapservice=\"{base}/tms/{version}/\">\n  \
             <Title>{title}</Title>\n  \
             <Abstract></Abstract>\n  \
             <SRS>{srs}</SRS>\n  \
             <BoundingBox minx=\"{minx}\" miny=\"{miny}\" maxx=\"{maxx}\" maxy=\"{maxy}\" />\n  \
             <Origin x=\"{origin_x}\" y=\"{origin_y}\" />\n  \
             <TileFormat width=\"{width}\" height=\"{height}\" mime-type=\"{mime}\" extension=\"{ext}\" />\n  \
             <TileSets profile=\"{profile}\">\n{tile_sets}  </TileSets>\n\
             </TileMap>\n",
            version = TMS_VERSION,
            base = escape(base_url),
            title = escape(&layer.title),
            srs = escape(&grid.srs),
            minx = grid.bbox[0],
            miny = grid.bbox[1],
            maxx = grid.bbox[2],
            maxy = grid.bbox[3],
            width = grid.tile_size.0,
            height = grid.tile_size.1,
            mime = layer.format().mime_type,
            ext = layer.format().extension,
            profile = grid.profile(),
        );
        Ok(respond(StatusCode::OK, "text/xml", body))
    }

    fn tile(
        &self,
        name: &str,
        grid: &str,
        z: &str,
        x: &str,
        file: &str,
    ) -> Result<Response<Bytes>, ProxyError> {
        let (y, ext) = file
            .rsplit_once('.')
            .ok_or_else(|| ProxyError::InvalidRequest(format!("missing format in '{}'", file)))?;
        let z = parse_coord(z, "level")?;
        let x = parse_coord(x, "column")?;
        let y = parse_coord(y, "row")?;

        let layer = find_layer(&self.layers, name, grid)?;
        if !layer.format().matches(ext) {
            return Err(ProxyError::InvalidRequest(format!(
                "invalid format '{}' for layer '{}' (expected {})",
                ext,
                layer.name,
                layer.format().extension
            )));
        }

        layer.grid.check_tile(z, x, y)?;
        let row = layer.grid.row_from(self.origin, z, y);
        let data = layer.tile(z, x, row)?;
        Ok(respond(StatusCode::OK, &layer.format().mime_type, data))
    }
}

impl Service for TmsService {
    fn name(&self) -> &'static str {
        "tms"
    }

    fn path_segment(&self) -> Option<&'static str> {
        Some("tms")
    }

    fn index_path(&self) -> Option<&'static str> {
        Some("tms/1.0.0/")
    }

    fn handle(&self, request: &ServiceRequest<'_>) -> Result<Response<Bytes>, ProxyError> {
        match request.segments.as_slice() {
            [] | [TMS_VERSION] => Ok(self.capabilities(&request.base_url)),
            [version, ..] if *version != TMS_VERSION => Err(ProxyError::NotFound(format!(
                "Unknown TMS version '{}'",
                version
            ))),
            [_, name, grid] => self.tile_map(&request.base_url, name, grid),
            [_, name, grid, z, x, file] => self.tile(name, grid, z, x, file),
            _ => Err(ProxyError::InvalidRequest(
                "invalid TMS request, expected /tms/1.0.0/{layer}/{grid}/{z}/{x}/{y}.{format}"
                    .to_string(),
            )),
        }
    }

    fn render_error(&self, error: &ProxyError) -> Response<Bytes> {
        let body = format!(
            "<?xml version=\"1.0\"?>\n<TileMapServerError>\n  <Message>{}</Message>\n</TileMapServerError>\n",
            escape(&error.to_string())
        );
        respond(status_of(error), "text/xml", body)
    }
}
