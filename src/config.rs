//! Settings and command-line configuration.
//!
//! The wrapper settings are read from environment variables, optionally
//! defaulted from a dotenv file (`.env_mapproxy` by default). Variables that
//! are already present in the process environment always win over the file.
//!
//! # Environment Variables
//!
//! - `MAPPROXY_CONFIG_PATH` - Path to the tile-proxy YAML configuration (required, must exist)
//! - `MAPPROXY_CONTEXT_PATH` - URL prefix the proxy is mounted under (required, `/` for root)
//! - `MAPPROXY_TITLE` - Display title used by the documentation routes (required)
//! - `MAPPROXY_DEBUG` - Enable debug pages and lenient validation (required, `true`/`false`/`yes`/`no`/`1`/`0`)
//!
//! # Example
//!
//! ```ignore
//! use tileproxy_mount::config::Settings;
//!
//! let settings = Settings::from_env()?;
//! println!("Mounting {} under {}", settings.config_path.display(), settings.mount_prefix()?);
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args, Parser, Subcommand};

use crate::error::SettingsError;

// =============================================================================
// Default Values
// =============================================================================

/// Dotenv file consulted by [`Settings::from_env`].
pub const DEFAULT_ENV_FILE: &str = ".env_mapproxy";

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 5000;

/// Default path of the custom documentation route, relative to the mount prefix.
pub const DEFAULT_DOCS_PATH: &str = "/custom-docs";

// =============================================================================
// Settings
// =============================================================================

/// Wrapper settings.
///
/// Built once per process and never mutated afterwards.
#[derive(Args, Debug, Clone)]
pub struct Settings {
    /// Path to the tile-proxy YAML configuration file.
    #[arg(long, env = "MAPPROXY_CONFIG_PATH")]
    pub config_path: PathBuf,

    /// URL prefix the tile proxy is mounted under.
    #[arg(long, env = "MAPPROXY_CONTEXT_PATH")]
    pub context_path: String,

    /// Application title shown by the documentation routes.
    #[arg(long, env = "MAPPROXY_TITLE")]
    pub title: String,

    /// Enable debug mode.
    ///
    /// Error responses of the tile proxy carry diagnostic pages and informal
    /// configuration warnings no longer block startup.
    /// WARNING: Never enable in production.
    #[arg(long, env = "MAPPROXY_DEBUG", action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub debug: bool,
}

/// Standalone parser so settings can be read without a subcommand.
#[derive(Parser, Debug)]
#[command(name = "tileproxy-mount")]
struct SettingsArgs {
    #[command(flatten)]
    settings: Settings,
}

impl Settings {
    /// Read settings from the environment, defaulted from [`DEFAULT_ENV_FILE`].
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_env_file(DEFAULT_ENV_FILE)
    }

    /// Read settings from the environment, defaulted from the given dotenv file.
    ///
    /// A missing dotenv file is not an error; a malformed one is.
    pub fn from_env_file(env_file: impl AsRef<Path>) -> Result<Self, SettingsError> {
        load_env_file(env_file.as_ref())?;
        Self::from_args([env!("CARGO_PKG_NAME")])
    }

    /// Parse settings from command-line style arguments (first item is the binary name).
    ///
    /// Values not given as arguments fall back to the environment.
    pub fn from_args<I, T>(args: I) -> Result<Self, SettingsError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let parsed =
            SettingsArgs::try_parse_from(args).map_err(|e| SettingsError::Invalid(e.to_string()))?;
        parsed.settings.validate()?;
        Ok(parsed.settings)
    }

    /// Validate the settings.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !self.config_path.is_file() {
            return Err(SettingsError::ConfigFileNotFound(self.config_path.clone()));
        }
        normalize_prefix(&self.context_path)?;
        Ok(())
    }

    /// The context path in mount form: `""` for root, otherwise `/segment[/segment...]`.
    pub fn mount_prefix(&self) -> Result<String, SettingsError> {
        normalize_prefix(&self.context_path)
    }
}

/// Load a dotenv file without overriding variables that are already set.
pub fn load_env_file(path: &Path) -> Result<(), SettingsError> {
    match dotenv::from_path(path) {
        Ok(()) => Ok(()),
        Err(dotenv::Error::Io(_)) => Ok(()),
        Err(e) => Err(SettingsError::Invalid(format!(
            "malformed env file {}: {}",
            path.display(),
            e
        ))),
    }
}

/// Normalize a URL prefix for mounting.
///
/// Leading slashes are added, trailing slashes removed; `""` and `"/"` mean
/// the root. Characters that the router treats as captures are rejected.
pub fn normalize_prefix(prefix: &str) -> Result<String, SettingsError> {
    let trimmed = prefix.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Ok(String::new());
    }

    if trimmed
        .chars()
        .any(|c| matches!(c, '{' | '}' | '*' | '?' | '#') || c.is_whitespace())
    {
        return Err(SettingsError::InvalidContextPath {
            path: prefix.to_string(),
            reason: "must not contain whitespace, '{', '}', '*', '?' or '#'",
        });
    }
    if trimmed.contains("//") {
        return Err(SettingsError::InvalidContextPath {
            path: prefix.to_string(),
            reason: "must not contain empty segments",
        });
    }

    if trimmed.starts_with('/') {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("/{}", trimmed))
    }
}

// =============================================================================
// CLI
// =============================================================================

/// tileproxy-mount - serve a YAML-configured tile proxy under a path prefix.
#[derive(Parser, Debug)]
#[command(name = "tileproxy-mount")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load the configuration and serve the mounted tile proxy.
    Serve(ServeConfig),

    /// Load and validate a configuration file without serving it.
    Check(CheckConfig),
}

/// Options for `serve`.
#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    #[command(flatten)]
    pub settings: Settings,

    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "MAPPROXY_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "MAPPROXY_PORT")]
    pub port: u16,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Options for `check`.
#[derive(Args, Debug, Clone)]
pub struct CheckConfig {
    /// Path to the tile-proxy YAML configuration file.
    #[arg(long, env = "MAPPROXY_CONFIG_PATH")]
    pub config_path: PathBuf,

    /// Accept configurations that only produce informal schema warnings.
    #[arg(long, default_value_t = false)]
    pub ignore_warnings: bool,

    /// Enable verbose logging.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "services:\n  tms:").unwrap();
        file
    }

    fn args<'a>(path: &'a str, debug: &'a str) -> Vec<&'a str> {
        vec![
            "tileproxy-mount",
            "--config-path",
            path,
            "--context-path",
            "/mapproxy",
            "--title",
            "Tiles",
            "--debug",
            debug,
        ]
    }

    #[test]
    fn test_settings_from_args() {
        let file = config_file();
        let path = file.path().to_str().unwrap();

        let settings = Settings::from_args(args(path, "false")).unwrap();
        assert_eq!(settings.config_path, file.path());
        assert_eq!(settings.context_path, "/mapproxy");
        assert_eq!(settings.title, "Tiles");
        assert!(!settings.debug);
    }

    #[test]
    fn test_debug_accepts_boolish_values() {
        let file = config_file();
        let path = file.path().to_str().unwrap();

        for value in ["true", "yes", "on", "1", "TRUE"] {
            assert!(Settings::from_args(args(path, value)).unwrap().debug, "{value}");
        }
        for value in ["false", "no", "off", "0"] {
            assert!(!Settings::from_args(args(path, value)).unwrap().debug, "{value}");
        }
    }

    #[test]
    fn test_debug_rejects_garbage() {
        let file = config_file();
        let path = file.path().to_str().unwrap();

        let result = Settings::from_args(args(path, "maybe"));
        assert!(matches!(result, Err(SettingsError::Invalid(_))));
    }

    #[test]
    fn test_missing_config_file() {
        let result = Settings::from_args(args("/definitely/not/here.yaml", "false"));
        match result {
            Err(SettingsError::ConfigFileNotFound(path)) => {
                assert_eq!(path, PathBuf::from("/definitely/not/here.yaml"));
            }
            other => panic!("expected ConfigFileNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_struct_literal() {
        let file = config_file();
        let mut settings = Settings {
            config_path: file.path().to_path_buf(),
            context_path: "/mapproxy".to_string(),
            title: "Tiles".to_string(),
            debug: false,
        };
        assert!(settings.validate().is_ok());

        settings.context_path = "/tiles/{id}".to_string();
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::InvalidContextPath { .. })
        ));
    }

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix("/mapproxy").unwrap(), "/mapproxy");
        assert_eq!(normalize_prefix("mapproxy/").unwrap(), "/mapproxy");
        assert_eq!(normalize_prefix("/a/b/").unwrap(), "/a/b");
        assert_eq!(normalize_prefix("/").unwrap(), "");
        assert_eq!(normalize_prefix("").unwrap(), "");
        assert!(normalize_prefix("/a//b").is_err());
        assert!(normalize_prefix("/a b").is_err());
        assert!(normalize_prefix("/*rest").is_err());
    }

    #[test]
    fn test_missing_env_file_is_ignored() {
        assert!(load_env_file(Path::new("/definitely/not/here/.env_mapproxy")).is_ok());
    }

    #[test]
    fn test_serve_bind_address() {
        let file = config_file();
        let path = file.path().to_str().unwrap();
        let mut argv = vec!["tileproxy-mount", "serve"];
        argv.extend(args(path, "no").into_iter().skip(1));
        argv.extend(["--host", "127.0.0.1", "--port", "8080"]);

        let cli = Cli::try_parse_from(argv).unwrap();
        match cli.command {
            Command::Serve(config) => assert_eq!(config.bind_address(), "127.0.0.1:8080"),
            Command::Check(_) => panic!("expected serve"),
        }
    }
}
