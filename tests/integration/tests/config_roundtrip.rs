//! Config save/load roundtrip integration tests.
//!
//! These tests verify that configuration can be serialized, written to disk,
//! and loaded back with identical field values.

use scriptrun_core::config::{LogFormat, SupervisorConfig, DEFAULT_DENYLIST};
use std::path::Path;
use tempfile::TempDir;

#[test]
fn test_config_save_and_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("scriptrun.json5");

    let config = SupervisorConfig::default();
    config.save(&path).unwrap();

    let loaded = SupervisorConfig::load(&path).unwrap();
    assert_eq!(loaded.execution.timeout_secs, config.execution.timeout_secs);
    assert_eq!(loaded.execution.interpreter, config.execution.interpreter);
    assert_eq!(
        loaded.execution.max_output_bytes,
        config.execution.max_output_bytes
    );
    // Denylist order decides which pattern is reported, so it must survive
    assert_eq!(loaded.screen.denylist, DEFAULT_DENYLIST);
    assert_eq!(loaded.uploads.dir, config.uploads.dir);
}

#[test]
fn test_config_modify_and_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("scriptrun.json5");

    let mut config = SupervisorConfig::default();
    config.execution.timeout_secs = 30;
    config.screen.denylist = vec!["rm -".to_string()];
    config.logging.format = LogFormat::Json;
    config.save(&path).unwrap();

    let loaded = SupervisorConfig::load(&path).unwrap();
    assert_eq!(loaded.execution.timeout_secs, 30);
    assert_eq!(loaded.screen.denylist, vec!["rm -".to_string()]);
    assert_eq!(loaded.logging.format, LogFormat::Json);
    assert!(loaded.validate().is_ok());
}

#[test]
fn test_config_load_nonexistent() {
    let result = SupervisorConfig::load(Path::new("/nonexistent/scriptrun.json5"));
    assert!(result.is_err());
}

#[test]
fn test_config_parse_invalid() {
    let result = SupervisorConfig::parse("not valid json");
    assert!(result.is_err());
}

#[test]
fn test_partial_config_fills_defaults() {
    let config = SupervisorConfig::parse("{ uploads: { max_bytes: 1024 } }").unwrap();
    assert_eq!(config.uploads.max_bytes, 1024);
    assert_eq!(config.uploads.allowed_extensions, vec!["py".to_string()]);
    assert_eq!(config.execution.timeout_secs, 10);
}
