use std::env;

use sdb_common::env::SDB_CONFIG;
use sdb_engine::{DebuggerConfig, DEFAULT_MAX_DISPLAY_LEN, DEFAULT_MAX_ENTRIES};
use serial_test::serial;
use tracing::info;

#[test]
fn test_default_config() {
    sdb_utils::logging::ensure_test_logging(None);
    info!("Running test");
    let config = DebuggerConfig::default();

    assert_eq!(config.max_entries, DEFAULT_MAX_ENTRIES);
    assert_eq!(config.max_display_len, DEFAULT_MAX_DISPLAY_LEN);
    assert!(config.flag_enums.is_empty());
    assert!(config.discover_sections);
}

#[test]
fn test_config_round_trip() {
    sdb_utils::logging::ensure_test_logging(None);
    info!("Running test");
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sdb.toml");

    let config = DebuggerConfig::default().with_max_entries(64).with_flag_enum("game::Element");
    config.save_to(&path).unwrap();

    let loaded = DebuggerConfig::load_from(&path).unwrap();
    assert_eq!(loaded, config);
    assert!(loaded.is_flag_enum("Element", "game"));
    assert!(!loaded.is_flag_enum("Element", ""));
}

#[test]
fn test_partial_config_uses_defaults() {
    sdb_utils::logging::ensure_test_logging(None);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sdb.toml");
    std::fs::write(&path, "max_display_len = 8\n").unwrap();

    let config = DebuggerConfig::load_from(&path).unwrap();
    assert_eq!(config.max_display_len, 8);
    assert_eq!(config.max_entries, DEFAULT_MAX_ENTRIES);
    assert_eq!(config.truncate("a long display value"), "a long d");
}

#[test]
fn test_invalid_config_is_an_error() {
    sdb_utils::logging::ensure_test_logging(None);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sdb.toml");
    std::fs::write(&path, "max_entries = \"many\"\n").unwrap();

    let err = DebuggerConfig::load_from(&path).unwrap_err();
    assert!(err.to_string().contains("TOML"));
}

#[test]
#[serial]
fn test_load_honours_env_var() {
    sdb_utils::logging::ensure_test_logging(None);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.toml");
    DebuggerConfig::default().with_max_entries(5).save_to(&path).unwrap();

    env::set_var(SDB_CONFIG, &path);
    assert_eq!(DebuggerConfig::config_path().unwrap(), path);
    let loaded = DebuggerConfig::load().unwrap();
    env::remove_var(SDB_CONFIG);

    assert_eq!(loaded.max_entries, 5);
}

#[test]
#[serial]
fn test_load_missing_file_falls_back_to_defaults() {
    sdb_utils::logging::ensure_test_logging(None);
    let dir = tempfile::tempdir().unwrap();

    env::set_var(SDB_CONFIG, dir.path().join("absent.toml"));
    let loaded = DebuggerConfig::load().unwrap();
    env::remove_var(SDB_CONFIG);

    assert_eq!(loaded, DebuggerConfig::default());
}
