use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading the wrapper settings from the environment
#[derive(Debug, Clone, Error)]
pub enum SettingsError {
    /// A required value is missing or could not be parsed
    #[error("Invalid settings: {0}")]
    Invalid(String),

    /// The configured tile-proxy configuration file does not exist
    #[error("MapProxy configuration file doesn't exist: {}", .0.display())]
    ConfigFileNotFound(PathBuf),

    /// The context path cannot be used as a mount prefix
    #[error("Invalid context path {path:?}: {reason}")]
    InvalidContextPath { path: String, reason: &'static str },
}

/// Errors raised while loading, validating or building the tile-proxy configuration
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// The configuration file could not be read
    #[error("Could not read configuration {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not well-formed YAML
    #[error("Could not parse configuration {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The document parsed, but its root is not a mapping
    #[error("Configuration {} must be a mapping at the top level", path.display())]
    NotAMapping { path: PathBuf },

    /// The schema check reported blocking errors
    #[error("invalid configuration ({} issue(s))", errors.len())]
    Invalid { errors: Vec<String> },

    /// Services could not be built from an otherwise valid configuration
    #[error("Could not build services: {0}")]
    Build(String),
}

/// Fatal startup errors. The process never serves traffic after one of these.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// The process-wide state was already published
    #[error("Tile proxy state is already initialized")]
    AlreadyInitialized,
}

/// Errors raised while serving a request inside the tile-proxy application
#[derive(Debug, Error)]
pub enum ProxyError {
    /// No handler, layer or grid matches the request
    #[error("{0}")]
    NotFound(String),

    /// The request is malformed (bad coordinates, unknown format, ...)
    #[error("{0}")]
    InvalidRequest(String),

    /// A required query parameter is absent or empty
    #[error("missing parameter '{0}'")]
    MissingParameter(String),

    /// The tile coordinates are outside the grid's tile matrix
    #[error("Tile ({x}, {y}) at level {z} is outside the grid (level has {max_x}x{max_y} tiles)")]
    TileOutOfBounds {
        z: u32,
        x: u32,
        y: u32,
        max_x: u32,
        max_y: u32,
    },

    /// The tile is valid but not present in the cache
    #[error("Tile {z}/{x}/{y} of layer '{layer}' is not cached")]
    TileNotCached { layer: String, z: u32, x: u32, y: u32 },

    /// Reading a cached tile failed
    #[error("Could not read tile {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
