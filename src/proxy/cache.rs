//! File system tile cache.
//!
//! Tiles are read from a per-cache directory using one of the supported
//! directory layouts:
//!
//! - `tms`: `{z}/{x}/{y}.{ext}`
//! - `tc`: `{z:02}/{x/1e6:03}/{x/1e3%1e3:03}/{x%1e3:03}/{y/1e6:03}/{y/1e3%1e3:03}/{y%1e3:03}.{ext}`
//! - `quadkey`: `{quadkey}.{ext}` (Bing Maps quadkey)
//!
//! Coordinates are in the grid's own origin.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::debug;

use crate::error::{ConfigurationError, ProxyError};

/// Image format of the tiles in a cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileFormat {
    pub mime_type: String,
    pub extension: String,
}

impl TileFormat {
    /// Parse a format given as a mime type (`image/png`) or a bare extension (`png`).
    pub fn parse(value: &str) -> Self {
        let value = value.trim().to_ascii_lowercase();
        let subtype = value.strip_prefix("image/").unwrap_or(&value);
        // Drop parameters such as `image/png; mode=8bit`
        let subtype = subtype.split(';').next().unwrap_or(subtype).trim();
        let extension = match subtype {
            "jpg" | "jpeg" => "jpeg",
            other => other,
        };
        Self {
            mime_type: format!("image/{}", extension),
            extension: extension.to_string(),
        }
    }

    /// Whether a requested extension or mime type names this format.
    pub fn matches(&self, requested: &str) -> bool {
        TileFormat::parse(requested).extension == self.extension
    }
}

impl Default for TileFormat {
    fn default() -> Self {
        TileFormat::parse("image/png")
    }
}

/// Directory layout of a file cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryLayout {
    Tms,
    Tc,
    Quadkey,
}

impl DirectoryLayout {
    pub fn parse(value: &str) -> Result<Self, ConfigurationError> {
        match value {
            "tms" => Ok(DirectoryLayout::Tms),
            "tc" => Ok(DirectoryLayout::Tc),
            "quadkey" => Ok(DirectoryLayout::Quadkey),
            other => Err(ConfigurationError::Build(format!(
                "unsupported directory_layout '{}' (supported: tms, tc, quadkey)",
                other
            ))),
        }
    }
}

/// Read-only view of tiles stored on disk.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
    layout: DirectoryLayout,
    format: TileFormat,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>, layout: DirectoryLayout, format: TileFormat) -> Self {
        Self {
            dir: dir.into(),
            layout,
            format,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn format(&self) -> &TileFormat {
        &self.format
    }

    /// Location of a tile inside the cache directory.
    pub fn tile_path(&self, z: u32, x: u32, y: u32) -> PathBuf {
        let ext = &self.format.extension;
        match self.layout {
            DirectoryLayout::Tms => self
                .dir
                .join(z.to_string())
                .join(x.to_string())
                .join(format!("{}.{}", y, ext)),
            DirectoryLayout::Tc => self
                .dir
                .join(format!("{:02}", z))
                .join(format!("{:03}", x / 1_000_000))
                .join(format!("{:03}", (x / 1000) % 1000))
                .join(format!("{:03}", x % 1000))
                .join(format!("{:03}", y / 1_000_000))
                .join(format!("{:03}", (y / 1000) % 1000))
                .join(format!("{:03}.{}", y % 1000, ext)),
            DirectoryLayout::Quadkey => self.dir.join(format!("{}.{}", quadkey(z, x, y), ext)),
        }
    }

    /// Load a tile. Returns `Ok(None)` when the tile is not cached.
    pub fn load(&self, z: u32, x: u32, y: u32) -> Result<Option<Bytes>, ProxyError> {
        let path = self.tile_path(z, x, y);
        match std::fs::read(&path) {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "tile not cached");
                Ok(None)
            }
            Err(source) => Err(ProxyError::Io { path, source }),
        }
    }
}

/// Bing Maps quadkey of a tile. Level 0 is the empty key.
fn quadkey(z: u32, x: u32, y: u32) -> String {
    (1..=z)
        .rev()
        .map(|level| {
            // Bits above 31 are always zero in a u32 index.
            let mask = 1u32.checked_shl(level - 1).unwrap_or(0);
            let mut digit = b'0';
            if x & mask != 0 {
                digit += 1;
            }
            if y & mask != 0 {
                digit += 2;
            }
            digit as char
        })
        .collect()
}
