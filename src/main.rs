//! tileproxy-mount - serves a YAML-configured tile proxy under a path prefix.

use std::path::Path;
use std::process::ExitCode;

use axum::Router;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tileproxy_mount::{
    config::{load_env_file, CheckConfig, Cli, Command, ServeConfig, DEFAULT_ENV_FILE},
    error::{SettingsError, StartupError},
    proxy::{load_configuration, LoadOptions},
    ProxyMount, ProxyState,
};

#[tokio::main]
async fn main() -> ExitCode {
    // Environment variables already set win over the dotenv file.
    if let Err(e) = load_env_file(Path::new(DEFAULT_ENV_FILE)) {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let cli = Cli::parse();

    match cli.command {
        Command::Serve(config) => run_serve(config).await,
        Command::Check(config) => run_check(config),
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    let state = match ProxyState::init(config.settings.clone()) {
        Ok(state) => state,
        Err(StartupError::Settings(SettingsError::ConfigFileNotFound(path))) => {
            error!("MapProxy configuration file doesn't exist!");
            error!("  Path: {}", path.display());
            return ExitCode::FAILURE;
        }
        Err(e) => {
            error!("Startup failed: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let state = match ProxyState::install(state) {
        Ok(state) => state,
        Err(e) => {
            error!("Startup failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let settings = state.settings();
    info!("Configuration:");
    info!("  Config file: {}", settings.config_path.display());
    info!("  Title: {}", settings.title);
    info!("  Debug: {}", settings.debug);

    let mut app = Router::new();
    let mut mount = ProxyMount::new(state);
    if let Err(e) = mount.mount_to(&mut app, None) {
        error!("Could not mount the tile proxy: {}", e);
        return ExitCode::FAILURE;
    }
    if !config.no_tracing {
        app = app.layer(TraceLayer::new_for_http());
    }

    let addr = config.bind_address();
    let prefix = mount.prefix();

    info!("");
    info!("────────────────────────────────────────────────────────────────");
    info!("  Server listening on: http://{}", addr);
    info!("");
    info!("  Try these endpoints:");
    info!("    curl http://{}{}/status", addr, prefix);
    info!("    open http://{}{}{}", addr, prefix, mount.docs_path());
    info!("    open http://{}{}/demo/", addr, prefix);
    info!("────────────────────────────────────────────────────────────────");
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "tileproxy_mount=debug,tower_http=debug"
    } else {
        "tileproxy_mount=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

// =============================================================================
// Check Command
// =============================================================================

fn run_check(config: CheckConfig) -> ExitCode {
    init_logging(config.verbose);

    println!("Tile proxy configuration check");
    println!("══════════════════════════════");
    println!();

    if !config.config_path.is_file() {
        println!("✗ Config file: {} does not exist", config.config_path.display());
        return ExitCode::FAILURE;
    }
    println!("✓ Config file: {}", config.config_path.display());

    let options = LoadOptions {
        ignore_warnings: config.ignore_warnings,
        ..Default::default()
    };
    let configuration = match load_configuration(&config.config_path, options) {
        Ok(configuration) => {
            println!("✓ Configuration is valid");
            configuration
        }
        Err(e) => {
            println!("✗ Configuration: {}", e);
            if !config.ignore_warnings {
                println!();
                println!("Tip: Use --ignore-warnings to accept unknown keys");
            }
            return ExitCode::FAILURE;
        }
    };

    match configuration.configured_services() {
        Ok(services) => {
            let names: Vec<_> = services.iter().map(|s| s.name()).collect();
            println!("✓ Services: {}", names.join(", "));
        }
        Err(e) => {
            println!("✗ Services: {}", e);
            return ExitCode::FAILURE;
        }
    }

    if let Ok(layers) = configuration.tile_layers() {
        println!();
        println!("Tile layers:");
        println!("────────────");
        if layers.is_empty() {
            println!("  (no tile layers)");
        }
        for layer in &layers {
            println!(
                "  {} [{}] -> {}",
                layer.name,
                layer.grid.name,
                layer.cache.dir().display()
            );
        }
    }

    println!();
    println!("══════════════════════════════");
    println!("✓ All checks passed!");

    ExitCode::SUCCESS
}
