//! # tileproxy-mount
//!
//! Serves a YAML-configured map-tile proxy as a sub-application of an axum
//! router.
//!
//! The wrapper reads its settings from the environment (defaulted from
//! `.env_mapproxy`), loads and validates the tile-proxy configuration, builds
//! the synchronous tile-proxy application and bridges it onto tokio's
//! blocking pool. The bridged application is mounted under a path prefix next
//! to a health check and an API documentation page.
//!
//! ## Architecture
//!
//! - [`config`] - Settings and CLI types
//! - [`proxy`] - Configuration loading, validation and the tile services
//! - [`factory`] - Builds the synchronous application from a configuration
//! - [`bridge`] - Runs synchronous applications behind axum
//! - [`state`] - Process-wide startup state
//! - [`server`] - Mounting wrapper and its routes
//!
//! ## Example
//!
//! ```rust,no_run
//! use axum::Router;
//! use tileproxy_mount::{ProxyMount, ProxyState};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let state = ProxyState::install(ProxyState::from_env()?)?;
//!
//!     let mut app = Router::new();
//!     ProxyMount::new(state).mount_to(&mut app, Some("/mapproxy"))?;
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:5000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod factory;
mod markup;
pub mod proxy;
pub mod server;
pub mod state;

// Re-export commonly used types
pub use bridge::{BlockingBridge, RequestHandler, ScriptName, SyncApp};
pub use config::{CheckConfig, Cli, Command, ServeConfig, Settings};
pub use error::{ConfigurationError, ProxyError, SettingsError, StartupError};
pub use factory::create_proxy_app;
pub use proxy::{
    build_config, load_configuration, DebugApp, LoadOptions, ProxyApp, ProxyConfiguration,
};
pub use server::ProxyMount;
pub use state::ProxyState;
