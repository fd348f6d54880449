//! Startup tests: configuration loading and the failure policy.

use std::path::PathBuf;

use tileproxy_mount::{
    load_configuration, ConfigurationError, LoadOptions, ProxyState, SettingsError, StartupError,
};

use super::test_utils::*;

// =============================================================================
// Failure Policy
// =============================================================================

#[test]
fn test_clean_config_starts_in_both_modes() {
    let fixture = Fixture::new(BASIC_CONFIG);
    assert!(ProxyState::init(fixture.settings(false)).is_ok());
    assert!(ProxyState::init(fixture.settings(true)).is_ok());
}

#[test]
fn test_informal_warnings_block_only_without_debug() {
    let fixture = Fixture::new(WARNING_CONFIG);

    let err = ProxyState::init(fixture.settings(false)).unwrap_err();
    match err {
        StartupError::Configuration(ConfigurationError::Invalid { errors }) => {
            assert!(errors.iter().any(|e| e.contains("unknown 'extra_key' in root")));
        }
        other => panic!("unexpected error: {:?}", other),
    }

    assert!(ProxyState::init(fixture.settings(true)).is_ok());
}

#[test]
fn test_hard_errors_block_in_both_modes() {
    let fixture = Fixture::new(BROKEN_CONFIG);
    for debug in [false, true] {
        let result = ProxyState::init(fixture.settings(debug));
        assert!(
            matches!(
                result,
                Err(StartupError::Configuration(ConfigurationError::Invalid { .. }))
            ),
            "debug={} should not start",
            debug
        );
    }
}

#[test]
fn test_load_options_policy() {
    let fixture = Fixture::new(WARNING_CONFIG);
    let strict = LoadOptions::default();
    let lenient = LoadOptions {
        ignore_warnings: true,
        ..LoadOptions::default()
    };

    assert!(load_configuration(&fixture.config_path, strict).is_err());
    let config = load_configuration(&fixture.config_path, lenient).unwrap();
    let layers = config.tile_layers().unwrap();
    assert_eq!(layers.len(), 1);
    assert_eq!(layers[0].name, "osm");
}

// =============================================================================
// Unreadable Configuration
// =============================================================================

#[test]
fn test_missing_config_file() {
    let fixture = Fixture::new(BASIC_CONFIG);
    let mut settings = fixture.settings(false);
    settings.config_path = PathBuf::from("/nonexistent/mapproxy.yaml");

    let err = ProxyState::init(settings).unwrap_err();
    assert!(matches!(
        err,
        StartupError::Settings(SettingsError::ConfigFileNotFound(_))
    ));
}

#[test]
fn test_malformed_yaml() {
    let fixture = Fixture::new("services:\n  tms: [unclosed\n");
    for debug in [false, true] {
        let err = ProxyState::init(fixture.settings(debug)).unwrap_err();
        assert!(matches!(
            err,
            StartupError::Configuration(ConfigurationError::Parse { .. })
        ));
    }
}

#[test]
fn test_invalid_context_path() {
    let fixture = Fixture::new(BASIC_CONFIG);
    let mut settings = fixture.settings(false);
    settings.context_path = "/maps?x=1".to_string();

    let err = ProxyState::init(settings).unwrap_err();
    assert!(matches!(
        err,
        StartupError::Settings(SettingsError::InvalidContextPath { .. })
    ));
}

#[test]
fn test_grid_deeper_than_u32_tiles_is_rejected() {
    let fixture = Fixture::new(
        "\
services:
  tms:
layers:
  - name: deep
    sources: [deep_cache]
caches:
  deep_cache:
    grids: [deepgrid]
    sources: []
    cache:
      type: file
      directory_layout: quadkey
grids:
  deepgrid:
    base: GLOBAL_WEBMERCATOR
    num_levels: 34
",
    );
    for debug in [false, true] {
        let err = ProxyState::init(fixture.settings(debug)).unwrap_err();
        assert!(matches!(
            err,
            StartupError::Configuration(ConfigurationError::Build(_))
        ));
    }
}

// =============================================================================
// Logging
// =============================================================================

#[test]
fn test_each_warning_logged_once() {
    let fixture = Fixture::new(WARNING_CONFIG);
    let (result, logs) = capture_logs(|| ProxyState::init(fixture.settings(true)));
    assert!(result.is_ok());

    assert_eq!(logs.count("unknown 'extra_key' in root"), 1, "{}", logs.contents());
    assert_eq!(
        logs.count("Source 'missing_source' for layer 'ghost' not in cache or source section"),
        1,
        "{}",
        logs.contents()
    );
    assert_eq!(logs.count("debug mode enabled"), 1);
}

#[test]
fn test_duplicate_tile_layer_warned_once() {
    let fixture = Fixture::new(
        "\
services:
  tms:
  demo:
layers:
  - name: osm
    tile_sources: [osm_cache, osm_cache]
    sources: []
caches:
  osm_cache:
    sources: []
",
    );
    let (result, logs) = capture_logs(|| ProxyState::init(fixture.settings(true)));
    let state = result.unwrap();

    assert_eq!(logs.count("duplicate tile layer skipped"), 1, "{}", logs.contents());
    assert_eq!(state.configuration().tile_layers().unwrap().len(), 1);
}

#[test]
fn test_rejected_config_logs_errors() {
    let fixture = Fixture::new(WARNING_CONFIG);
    let (result, logs) = capture_logs(|| ProxyState::init(fixture.settings(false)));
    assert!(result.is_err());
    assert!(logs.contents().contains("invalid configuration"));
    assert_eq!(logs.count("unknown 'extra_key' in root"), 1);
}
