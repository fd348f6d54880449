//! Tile-proxy engine.
//!
//! Loads a YAML configuration document, validates it and serves tiles from
//! file caches through TMS, WMTS and a demo page.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          ProxyApp                            │
//! │        /  /service  /ows  /tms/...  /wmts/...  /demo/        │
//! │                                                              │
//! │  ┌──────────┐  ┌──────────┐  ┌──────────┐                    │
//! │  │   tms    │  │   wmts   │  │   demo   │   (service)        │
//! │  └────┬─────┘  └────┬─────┘  └──────────┘                    │
//! │       └──── TileLayer (grid + FileCache) ────┘               │
//! └──────────────────────────────────────────────────────────────┘
//!                 ▲
//!   loader::load_configuration (schema + validator)
//! ```

pub mod app;
pub mod cache;
pub mod debug;
pub mod grid;
pub mod layer;
pub mod loader;
pub mod service;
pub mod schema;
pub mod validator;

pub use app::{ErrorDetail, ProxyApp};
pub use debug::{ConfigSummary, DebugApp};
pub use grid::{Grid, Origin};
pub use layer::TileLayer;
pub use loader::{
    build_config, load_configuration, BaseConfig, ConfigFile, LoadOptions, ProxyConfiguration,
};
pub use service::Service;
