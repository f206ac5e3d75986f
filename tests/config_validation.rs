//! Integration tests for configuration validation

#![allow(clippy::expect_used)]

use phantom_station::config::{DetectorConfig, StationConfig};
use std::time::Duration;
use tracing::Level;

#[test]
fn test_default_config_validates() {
    let config = StationConfig::default();
    let errors = config.validate();
    assert!(
        errors.is_empty(),
        "Default config should be valid, but got errors: {:?}",
        errors
    );
}

#[test]
fn test_invalid_listen_address() {
    let mut config = StationConfig::default();
    config.dispatcher.listen_address = "not-an-address".to_string();

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Invalid listen address")));
}

#[test]
fn test_unsupported_ingest_scheme() {
    let mut config = StationConfig::default();
    config.ingest.endpoint = "udp://0.0.0.0:5591".to_string();

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Unsupported ingest endpoint")));
}

#[test]
fn test_zero_capacity_rejected() {
    let mut config = StationConfig::default();
    config.registrations.max_registrations = 0;

    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("Max registrations")));
}

#[test]
fn test_sweep_longer_than_ttl() {
    let mut config = StationConfig::default();
    config.registrations.ttl = Duration::from_secs(10);
    config.registrations.sweep_interval = Duration::from_secs(60);

    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("Sweep interval")));
}

#[test]
fn test_disabled_detector_not_checked() {
    let mut config = StationConfig::default();
    config.detector = DetectorConfig {
        enabled: false,
        device: String::new(),
        ..DetectorConfig::default()
    };
    assert!(config.validate().is_empty());
}

#[test]
fn test_enabled_detector_checks_sources() {
    let mut config = StationConfig::default();
    config.detector.enabled = true;
    config.detector.excluded_sources = vec!["192.0.2.1".into(), "probe-host".into()];

    let errors = config.detector.validate();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("probe-host"));
}

#[test]
fn test_enabled_liveness_needs_ports() {
    let mut config = StationConfig::default();
    config.liveness.enabled = true;
    config.liveness.probe_ports.clear();

    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("at least one port")));
}

#[test]
fn test_file_logging_requires_path() {
    let mut config = StationConfig::default();
    config.logging.log_to_file = true;
    config.logging.log_file_path = None;

    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("log_file_path must be specified")));
}

#[test]
fn test_no_logging_output() {
    let mut config = StationConfig::default();
    config.logging.log_to_console = false;
    config.logging.log_to_file = false;

    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("At least one logging output")));
}

#[test]
fn test_validate_strict_collects_all() {
    let mut config = StationConfig::default();
    config.dispatcher.listen_address = String::new();
    config.registrations.max_registrations = 0;

    let err = config.validate_strict().expect_err("invalid config");
    let text = err.to_string();
    assert!(text.contains("Invalid listen address"));
    assert!(text.contains("Max registrations"));
}

#[test]
fn test_toml_partial_sections_use_defaults() {
    let config = StationConfig::from_toml(
        r#"
        [dispatcher]
        listen_address = "127.0.0.1:41245"
        connect_timeout = 2000
        preamble_timeout = 500

        [registrations]
        ttl = 120000
        max_registrations = 10
        sweep_interval = 1000

        [logging]
        app_name = "station-a"
        log_level = "debug"
        log_to_console = true
        log_to_file = false
        json_format = true
        metrics_interval = 30000
        "#,
    )
    .expect("parse");

    assert_eq!(config.dispatcher.connect_timeout, Duration::from_secs(2));
    assert_eq!(config.registrations.ttl, Duration::from_secs(120));
    assert_eq!(config.logging.log_level, Level::DEBUG);
    assert_eq!(config.ingest.endpoint, "tcp://0.0.0.0:5591");
    assert!(!config.detector.enabled);
    assert!(config.validate().is_empty());
}

#[test]
fn test_example_config_roundtrip() {
    let text = StationConfig::example_config();
    let parsed = StationConfig::from_toml(&text).expect("example parses");
    assert_eq!(parsed.registrations.ttl, StationConfig::default().registrations.ttl);
    assert_eq!(parsed.logging.log_level, Level::INFO);
}

#[test]
fn test_save_and_load() {
    let path = std::env::temp_dir().join(format!("phantom-station-{}.toml", std::process::id()));
    let mut config = StationConfig::default();
    config.detector.tags = vec!["marker".into()];
    config.save_to_file(&path).expect("save");

    let loaded = StationConfig::from_file(&path).expect("load");
    let _ = std::fs::remove_file(&path);
    assert_eq!(loaded.detector.tags, vec!["marker".to_string()]);
}

#[test]
fn test_bad_toml_is_config_error() {
    let err = StationConfig::from_toml("[dispatcher\nlisten_address = 1").expect_err("bad toml");
    assert!(err.to_string().contains("Failed to parse TOML"));
}
