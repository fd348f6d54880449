use std::sync::Arc;

use bytes::Bytes;

use super::cache::{FileCache, TileFormat};
use super::grid::Grid;
use crate::error::ProxyError;

/// A layer served as tiles in one grid.
///
/// A configured layer backed by a cache with several grids yields one
/// `TileLayer` per grid, all sharing the layer name.
#[derive(Debug)]
pub struct TileLayer {
    pub name: String,
    pub title: String,
    pub grid: Arc<Grid>,
    pub cache: FileCache,
}

impl TileLayer {
    pub fn format(&self) -> &TileFormat {
        self.cache.format()
    }

    /// Fetch a tile addressed in the grid's own origin.
    pub fn tile(&self, z: u32, x: u32, y: u32) -> Result<Bytes, ProxyError> {
        self.grid.check_tile(z, x, y)?;
        self.cache
            .load(z, x, y)?
            .ok_or_else(|| ProxyError::TileNotCached {
                layer: self.name.clone(),
                z,
                x,
                y,
            })
    }
}

/// Find the tile layer for a layer name and grid name.
pub fn find_layer<'a>(
    layers: &'a [Arc<TileLayer>],
    name: &str,
    grid: &str,
) -> Result<&'a Arc<TileLayer>, ProxyError> {
    layers
        .iter()
        .find(|l| l.name == name && l.grid.name == grid)
        .ok_or_else(|| ProxyError::NotFound(format!("Unknown layer '{}' in grid '{}'", name, grid)))
}
