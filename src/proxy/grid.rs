//! Tile grids.
//!
//! A grid fixes the SRS, extent, tile size, origin and per-level resolutions
//! of a tile pyramid. Tile coordinates handed to caches are always in the
//! grid's own origin; services convert their request rows first.

use crate::error::{ConfigurationError, ProxyError};

/// Half the circumference of the earth in web mercator meters.
const MERC_EXTENT: f64 = 20037508.342789244;

/// Meters per degree at the equator, used for scale denominators of geographic grids.
const METERS_PER_DEGREE: f64 = 111319.49079327358;

/// Standardized rendering pixel size (0.28mm) used by WMTS scale denominators.
const OGC_PIXEL_SIZE: f64 = 0.00028;

/// Default number of levels for grids without explicit resolutions.
pub const DEFAULT_NUM_LEVELS: u32 = 20;

/// Most levels a grid may have. Tile indices of deeper levels do not fit in `u32`.
pub const MAX_NUM_LEVELS: u32 = 32;

/// Names of the built-in grids.
pub const BUILTIN_GRIDS: [&str; 3] = ["GLOBAL_WEBMERCATOR", "GLOBAL_MERCATOR", "GLOBAL_GEODETIC"];

/// Corner of the extent where tile `(0, 0)` lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Lower-left (TMS convention)
    SouthWest,
    /// Upper-left (WMTS / XYZ convention)
    NorthWest,
}

impl Origin {
    /// Parse the origin spellings accepted in configuration files.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "sw" | "ll" | "lower-left" => Some(Origin::SouthWest),
            "nw" | "ul" | "upper-left" => Some(Origin::NorthWest),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::SouthWest => "sw",
            Origin::NorthWest => "nw",
        }
    }
}

/// A resolved tile grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    pub name: String,
    pub srs: String,
    /// `[minx, miny, maxx, maxy]` in grid SRS units
    pub bbox: [f64; 4],
    pub tile_size: (u32, u32),
    pub origin: Origin,
    /// Resolution (units per pixel) of every level, level 0 first
    pub resolutions: Vec<f64>,
}

impl Grid {
    /// Build a grid with `num_levels` resolutions halving from `min_res`.
    pub fn with_levels(
        name: impl Into<String>,
        srs: impl Into<String>,
        bbox: [f64; 4],
        tile_size: (u32, u32),
        origin: Origin,
        min_res: Option<f64>,
        num_levels: u32,
    ) -> Self {
        let min_res = min_res.unwrap_or_else(|| {
            let width = (bbox[2] - bbox[0]) / tile_size.0 as f64;
            let height = (bbox[3] - bbox[1]) / tile_size.1 as f64;
            width.max(height)
        });
        let resolutions = (0..num_levels)
            .map(|level| min_res / 2f64.powi(level as i32))
            .collect();

        Self {
            name: name.into(),
            srs: srs.into(),
            bbox,
            tile_size,
            origin,
            resolutions,
        }
    }

    /// Look up a built-in grid by name.
    pub fn builtin(name: &str) -> Option<Self> {
        let merc = [-MERC_EXTENT, -MERC_EXTENT, MERC_EXTENT, MERC_EXTENT];
        match name {
            "GLOBAL_WEBMERCATOR" => Some(Self::with_levels(
                name,
                "EPSG:3857",
                merc,
                (256, 256),
                Origin::NorthWest,
                None,
                DEFAULT_NUM_LEVELS,
            )),
            "GLOBAL_MERCATOR" => Some(Self::with_levels(
                name,
                "EPSG:900913",
                merc,
                (256, 256),
                Origin::SouthWest,
                None,
                DEFAULT_NUM_LEVELS,
            )),
            "GLOBAL_GEODETIC" => Some(Self::with_levels(
                name,
                "EPSG:4326",
                [-180.0, -90.0, 180.0, 90.0],
                (256, 256),
                Origin::SouthWest,
                Some(1.40625),
                DEFAULT_NUM_LEVELS,
            )),
            _ => None,
        }
    }

    /// Default extent for the SRS codes the built-in grids use.
    pub fn default_bbox(srs: &str) -> Option<[f64; 4]> {
        match srs.to_ascii_uppercase().as_str() {
            "EPSG:3857" | "EPSG:900913" | "EPSG:102100" | "EPSG:102113" => {
                Some([-MERC_EXTENT, -MERC_EXTENT, MERC_EXTENT, MERC_EXTENT])
            }
            "EPSG:4326" | "CRS:84" => Some([-180.0, -90.0, 180.0, 90.0]),
            _ => None,
        }
    }

    pub fn num_levels(&self) -> u32 {
        self.resolutions.len() as u32
    }

    pub fn resolution(&self, level: u32) -> Option<f64> {
        self.resolutions.get(level as usize).copied()
    }

    /// Number of tile columns and rows at `level`.
    ///
    /// `None` past the last level, or when the level has more tiles per axis
    /// than `u32` can index.
    pub fn tile_matrix(&self, level: u32) -> Option<(u32, u32)> {
        let res = self.resolution(level)?;
        let span = |extent: f64, tile: u32| {
            // Tolerate floating point noise on exact multiples.
            let tiles = (extent / (res * tile as f64) - 1e-9).ceil().max(1.0);
            (tiles <= u32::MAX as f64).then_some(tiles as u32)
        };
        Some((
            span(self.bbox[2] - self.bbox[0], self.tile_size.0)?,
            span(self.bbox[3] - self.bbox[1], self.tile_size.1)?,
        ))
    }

    /// Check that a tile lies inside the grid.
    pub fn check_tile(&self, level: u32, x: u32, y: u32) -> Result<(), ProxyError> {
        let (max_x, max_y) = self.tile_matrix(level).ok_or_else(|| {
            ProxyError::InvalidRequest(format!(
                "Invalid level {} (grid '{}' has {} levels)",
                level,
                self.name,
                self.num_levels()
            ))
        })?;
        if x >= max_x || y >= max_y {
            return Err(ProxyError::TileOutOfBounds {
                z: level,
                x,
                y,
                max_x,
                max_y,
            });
        }
        Ok(())
    }

    /// Convert a row counted from `from` into a row counted from the grid origin.
    ///
    /// The tile must already be bounds checked.
    pub fn row_from(&self, from: Origin, level: u32, row: u32) -> u32 {
        if from == self.origin {
            return row;
        }
        let rows = self.tile_matrix(level).map(|(_, rows)| rows).unwrap_or(1);
        rows.saturating_sub(1).saturating_sub(row)
    }

    /// Whether the grid SRS is geographic (degrees).
    pub fn is_geographic(&self) -> bool {
        matches!(self.srs.to_ascii_uppercase().as_str(), "EPSG:4326" | "CRS:84")
    }

    /// WMTS scale denominator of `level`.
    pub fn scale_denominator(&self, level: u32) -> Option<f64> {
        let meters_per_unit = if self.is_geographic() {
            METERS_PER_DEGREE
        } else {
            1.0
        };
        self.resolution(level)
            .map(|res| res * meters_per_unit / OGC_PIXEL_SIZE)
    }

    /// Upper-left corner of the tile matrix at `level`.
    ///
    /// For lower-left grids the matrix may extend past the bbox top edge.
    pub fn top_left_corner(&self, level: u32) -> Option<(f64, f64)> {
        match self.origin {
            Origin::NorthWest => Some((self.bbox[0], self.bbox[3])),
            Origin::SouthWest => {
                let res = self.resolution(level)?;
                let (_, rows) = self.tile_matrix(level)?;
                let top = self.bbox[1] + rows as f64 * res * self.tile_size.1 as f64;
                Some((self.bbox[0], top))
            }
        }
    }

    /// TMS profile name.
    pub fn profile(&self) -> &'static str {
        match self.srs.to_ascii_uppercase().as_str() {
            "EPSG:3857" | "EPSG:900913" => "global-mercator",
            "EPSG:4326" => "global-geodetic",
            _ => "local",
        }
    }
}

/// Parse a `bbox` given as a comma separated string.
pub fn parse_bbox(value: &str) -> Result<[f64; 4], ConfigurationError> {
    let parts: Vec<f64> = value
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|_| ConfigurationError::Build(format!("invalid bbox '{}'", value)))?;
    bbox_from_slice(&parts)
}

/// Validate a four-element bbox.
pub fn bbox_from_slice(values: &[f64]) -> Result<[f64; 4], ConfigurationError> {
    match values {
        [minx, miny, maxx, maxy] if minx < maxx && miny < maxy => Ok([*minx, *miny, *maxx, *maxy]),
        _ => Err(ConfigurationError::Build(format!(
            "bbox must be [minx, miny, maxx, maxy] with min < max, got {:?}",
            values
        ))),
    }
}
