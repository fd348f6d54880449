//! Builds the bridged tile-proxy application from a loaded configuration.

use std::sync::Arc;

use tracing::{info, warn};

use crate::bridge::SyncApp;
use crate::error::ConfigurationError;
use crate::proxy::{ConfigSummary, DebugApp, ProxyApp, ProxyConfiguration};

/// Create the synchronous application for a configuration.
///
/// Configuration-file change tracking is always disabled. With `debug` the
/// application is wrapped in [`DebugApp`].
pub fn create_proxy_app(
    config: &ProxyConfiguration,
    debug: bool,
) -> Result<Arc<dyn SyncApp>, ConfigurationError> {
    let services = config.configured_services()?;
    let mut app = ProxyApp::new(services, config.base_config().clone());
    app.clear_config_files();
    info!(services = ?app.service_names(), "tile proxy application created");

    if debug {
        warn!("debug mode enabled, error responses expose diagnostic details");
        let summary = ConfigSummary::from_configuration(config)?;
        return Ok(Arc::new(DebugApp::new(app, summary)));
    }
    Ok(Arc::new(app))
}
