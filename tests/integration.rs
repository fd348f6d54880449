//! Integration tests for the tile-proxy mount.
//!
//! These tests drive the mounted router end to end:
//! - Startup from a configuration file (missing, malformed, warnings)
//! - The failure policy with and without debug mode
//! - Wrapper routes (status, documentation, OpenAPI)
//! - Requests forwarded to the tile proxy under a prefix
//! - Tile services answering from a seeded file cache

mod integration {
    pub mod test_utils;

    pub mod config_tests;
    pub mod mount_tests;
    pub mod proxy_tests;
}
