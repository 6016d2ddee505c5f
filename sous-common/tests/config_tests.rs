//! Integration tests for service configuration loading

use sous_common::config::{load_toml_config, write_toml_config, ServiceConfig};

#[test]
fn test_config_round_trip() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("sous.toml");

    // Given: a non-default configuration written to disk
    let mut config = ServiceConfig::default();
    config.logging.level = "debug".to_string();
    config.event_capacity = 250;
    write_toml_config(&path, &config).expect("write should succeed");

    // When: the file is loaded back
    let loaded = load_toml_config(&path).expect("load should succeed");

    // Then: every field survives the round trip
    assert_eq!(loaded, config);
}

#[test]
fn test_malformed_config_rejected() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("sous.toml");
    std::fs::write(&path, "logging = \"not a table\"").expect("write should succeed");

    let result = load_toml_config(&path);
    assert!(result.is_err(), "malformed TOML should be an error, not defaults");
}
