//! Process-wide tile-proxy state.
//!
//! Startup runs in a fixed order: settings, configuration, service
//! application. The result is published once and never mutated.
//!
//! ```ignore
//! let state = ProxyState::install(ProxyState::from_env()?)?;
//! let mut mount = ProxyMount::new(state);
//! ```

use std::sync::OnceLock;

use tracing::info;

use crate::bridge::BlockingBridge;
use crate::config::Settings;
use crate::error::StartupError;
use crate::factory::create_proxy_app;
use crate::proxy::{load_configuration, LoadOptions, ProxyConfiguration};

static STATE: OnceLock<ProxyState> = OnceLock::new();

#[derive(Debug)]
pub struct ProxyState {
    settings: Settings,
    /// Normalized context path, `""` at the root
    mount_prefix: String,
    configuration: ProxyConfiguration,
    bridge: BlockingBridge,
}

impl ProxyState {
    /// Build the state from settings.
    ///
    /// Informal configuration warnings only block startup when `debug` is off.
    pub fn init(settings: Settings) -> Result<Self, StartupError> {
        settings.validate()?;
        let mount_prefix = settings.mount_prefix()?;

        let options = LoadOptions {
            seed: false,
            renderd: false,
            ignore_warnings: settings.debug,
        };
        let configuration = load_configuration(&settings.config_path, options)?;
        let app = create_proxy_app(&configuration, settings.debug)?;

        info!(
            config = %settings.config_path.display(),
            context_path = %settings.context_path,
            debug = settings.debug,
            "tile proxy initialized"
        );
        Ok(Self {
            settings,
            mount_prefix,
            configuration,
            bridge: BlockingBridge::new(app),
        })
    }

    /// Build the state from the environment and `.env_mapproxy`.
    pub fn from_env() -> Result<Self, StartupError> {
        Self::init(Settings::from_env()?)
    }

    /// Publish the state for the rest of the process. Fails if already published.
    pub fn install(state: Self) -> Result<&'static ProxyState, StartupError> {
        let mut installed = false;
        let published = STATE.get_or_init(|| {
            installed = true;
            state
        });
        if installed {
            Ok(published)
        } else {
            Err(StartupError::AlreadyInitialized)
        }
    }

    /// The published state, if any.
    pub fn global() -> Option<&'static ProxyState> {
        STATE.get()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn mount_prefix(&self) -> &str {
        &self.mount_prefix
    }

    pub fn configuration(&self) -> &ProxyConfiguration {
        &self.configuration
    }

    pub fn bridge(&self) -> &BlockingBridge {
        &self.bridge
    }
}
