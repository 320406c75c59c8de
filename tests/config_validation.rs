//! Integration tests for configuration validation

#![allow(clippy::unwrap_used, clippy::expect_used)]

use replica_archive::config::{ArchiveConfig, CodecConfig, LoggingConfig, PoolConfig, MAX_DECODE_LIMIT};
use replica_archive::ArchiveLimits;
use std::io::Write;
use tracing::Level;

#[test]
fn test_default_config_validates() {
    let config = CodecConfig::default();
    let errors = config.validate();
    assert!(
        errors.is_empty(),
        "Default config should be valid, but got errors: {:?}",
        errors
    );
}

#[test]
fn test_zero_limits_rejected() {
    let config = CodecConfig::default_with_overrides(|c| {
        c.archive.max_list_len = 0;
        c.archive.max_property_count = 0;
    });
    let errors = config.validate();
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().any(|e| e.contains("max_list_len must be greater than 0")));
    assert!(errors
        .iter()
        .any(|e| e.contains("max_property_count must be greater than 0")));
}

#[test]
fn test_excessive_string_limit() {
    let config = ArchiveConfig {
        max_string_len: MAX_DECODE_LIMIT + 1,
        ..Default::default()
    };
    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("max_string_len too large")));
}

#[test]
fn test_limits_follow_config() {
    let config = ArchiveConfig {
        max_string_len: 10,
        max_list_len: 20,
        max_property_count: 30,
    };
    assert_eq!(
        config.limits(),
        ArchiveLimits {
            max_string_len: 10,
            max_list_len: 20,
            max_property_count: 30,
        }
    );
}

#[test]
fn test_pool_capacity_ordering() {
    let config = PoolConfig {
        pool_size: 4,
        initial_capacity: 4096,
        max_pooled_capacity: 1024,
    };
    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("cannot be smaller")));

    let config = PoolConfig {
        initial_capacity: 0,
        ..Default::default()
    };
    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("Initial buffer capacity")));
}

#[test]
fn test_logging_requires_an_output() {
    let config = LoggingConfig {
        log_to_console: false,
        log_to_file: false,
        ..Default::default()
    };
    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("At least one logging output")));

    let config = LoggingConfig {
        log_to_file: true,
        log_file_path: None,
        ..Default::default()
    };
    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("log_file_path must be specified")));
}

#[test]
fn test_empty_app_name() {
    let config = LoggingConfig {
        app_name: String::new(),
        ..Default::default()
    };
    assert!(config.validate().iter().any(|e| e.contains("cannot be empty")));
}

#[test]
fn test_validate_strict_joins_errors() {
    let config = CodecConfig::default_with_overrides(|c| {
        c.archive.max_string_len = 0;
        c.logging.app_name = String::new();
    });
    let err = config.validate_strict().unwrap_err().to_string();
    assert!(err.contains("max_string_len"));
    assert!(err.contains("Application name"));
}

#[test]
fn test_toml_partial_sections_use_defaults() {
    let config = CodecConfig::from_toml(
        r#"
        [archive]
        max_string_len = 512
        max_list_len = 64
        max_property_count = 128

        [logging]
        app_name = "zone-server"
        log_level = "debug"
        log_to_console = true
        log_to_file = false
        json_format = true
        "#,
    )
    .expect("config should parse");

    assert_eq!(config.archive.max_string_len, 512);
    assert_eq!(config.pool, PoolConfig::default());
    assert_eq!(config.logging.log_level, Level::DEBUG);
    assert!(config.logging.json_format);
}

#[test]
fn test_invalid_toml_rejected() {
    assert!(CodecConfig::from_toml("[archive\nmax_string_len = ").is_err());
}

#[test]
fn test_example_config_parses_back() {
    let example = CodecConfig::example_config();
    let parsed = CodecConfig::from_toml(&example).expect("example config should parse");
    assert_eq!(parsed, CodecConfig::default());
}

#[test]
fn test_file_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("codec.toml");

    let config = CodecConfig::default_with_overrides(|c| c.pool.pool_size = 8);
    config.save_to_file(&path).unwrap();
    assert_eq!(CodecConfig::from_file(&path).unwrap(), config);
}

#[test]
fn test_file_with_bad_level() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "[logging]\napp_name = \"x\"\nlog_level = \"loud\"\nlog_to_console = true\nlog_to_file = false\njson_format = false"
    )
    .unwrap();
    assert!(CodecConfig::from_file(file.path()).is_err());
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    assert!(CodecConfig::from_file(dir.path().join("absent.toml")).is_err());
}

#[test]
fn test_apply_installs_pool_once() {
    let config = CodecConfig::default_with_overrides(|c| {
        c.pool.pool_size = 2;
        c.archive.max_list_len = 99;
    });
    let limits = config.apply().expect("first apply should succeed");
    assert_eq!(limits.max_list_len, 99);

    assert!(config.apply().is_err());
}
