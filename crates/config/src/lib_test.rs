//! Tests for configuration loading and validation

use std::io::Write;
use std::str::FromStr;
use std::time::Duration;

use super::*;

#[test]
fn test_empty_config_uses_defaults() {
    let config = Config::from_str("").unwrap();
    let publisher = &config.publisher;

    assert_eq!(publisher.port, 7165);
    assert!(!publisher.ipv6);
    assert!(publisher.metadata_refresh_allowed);
    assert!(publisher.nan_value_filter_allowed);
    assert!(!publisher.nan_value_filter_forced);
    assert_eq!(publisher.cipher_key_rotation_period, Duration::from_secs(60));
    assert_eq!(publisher.max_connections, 0);
    assert_eq!(publisher.send_queue_size, 1024);
    assert_eq!(config.log.level, LogLevel::Info);
}

#[test]
fn test_full_publisher_section() {
    let toml = r#"
[publisher]
port = 7175
ipv6 = true
metadata_refresh_allowed = false
nan_value_filter_forced = true
cipher_key_rotation_period = "5m"
max_connections = 32
handshake_timeout = "2s"
write_timeout = "250ms"
max_consecutive_write_failures = 3
send_queue_size = 64
compress_metadata = false
heartbeat_interval = "30s"

[log]
level = "trace"
format = "json"
"#;
    let config = Config::from_str(toml).unwrap();
    let publisher = &config.publisher;

    assert_eq!(publisher.port, 7175);
    assert!(publisher.ipv6);
    assert!(!publisher.metadata_refresh_allowed);
    assert!(publisher.nan_value_filter_forced);
    assert_eq!(publisher.cipher_key_rotation_period, Duration::from_secs(300));
    assert_eq!(publisher.max_connections, 32);
    assert_eq!(publisher.handshake_timeout, Duration::from_secs(2));
    assert_eq!(publisher.write_timeout, Duration::from_millis(250));
    assert_eq!(publisher.max_consecutive_write_failures, 3);
    assert_eq!(publisher.send_queue_size, 64);
    assert!(!publisher.compress_metadata);
    assert_eq!(publisher.heartbeat_interval, Duration::from_secs(30));
    assert_eq!(config.log.format, LogFormat::Json);
}

#[test]
fn test_zero_rotation_period_allowed() {
    let config = Config::from_str("[publisher]\ncipher_key_rotation_period = \"0s\"").unwrap();
    assert!(config.publisher.cipher_key_rotation_period.is_zero());
}

#[test]
fn test_zero_write_timeout_rejected() {
    let err = Config::from_str("[publisher]\nwrite_timeout = \"0s\"").unwrap_err();
    assert!(matches!(
        err,
        ConfigError::InvalidValue {
            field: "write_timeout",
            ..
        }
    ));
}

#[test]
fn test_zero_handshake_timeout_rejected() {
    assert!(Config::from_str("[publisher]\nhandshake_timeout = \"0s\"").is_err());
}

#[test]
fn test_zero_queue_rejected() {
    let err = Config::from_str("[publisher]\nsend_queue_size = 0").unwrap_err();
    assert!(err.to_string().contains("send_queue_size"));
}

#[test]
fn test_zero_failure_threshold_rejected() {
    assert!(Config::from_str("[publisher]\nmax_consecutive_write_failures = 0").is_err());
}

#[test]
fn test_forced_nan_filter_requires_allowed() {
    let toml = "[publisher]\nnan_value_filter_allowed = false\nnan_value_filter_forced = true";
    assert!(Config::from_str(toml).is_err());
}

#[test]
fn test_invalid_toml() {
    assert!(matches!(
        Config::from_str("[publisher\nport = 1"),
        Err(ConfigError::ParseError(_))
    ));
}

#[test]
fn test_bad_duration_rejected() {
    assert!(Config::from_str("[publisher]\nwrite_timeout = \"soon\"").is_err());
}

#[test]
fn test_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[publisher]\nport = 9000").unwrap();

    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.publisher.port, 9000);
}

#[test]
fn test_from_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::from_file(dir.path().join("absent.toml")).unwrap_err();

    assert!(matches!(err, ConfigError::IoError { .. }));
}
