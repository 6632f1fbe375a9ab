//! Configuration validation
//!
//! Rejects values that would leave the publisher unable to make progress:
//! zero timeouts, a zero-depth send queue, or a zero failure threshold.

use std::time::Duration;

use crate::Config;
use crate::error::{ConfigError, Result};

const SECTION: &str = "publisher";

/// Validate the entire configuration
pub fn validate_config(config: &Config) -> Result<()> {
    let publisher = &config.publisher;

    non_zero_duration("handshake_timeout", publisher.handshake_timeout)?;
    non_zero_duration("write_timeout", publisher.write_timeout)?;
    non_zero_duration("heartbeat_interval", publisher.heartbeat_interval)?;

    if publisher.send_queue_size == 0 {
        return Err(ConfigError::invalid_value(
            SECTION,
            "send_queue_size",
            "must be at least 1",
        ));
    }

    if publisher.max_consecutive_write_failures == 0 {
        return Err(ConfigError::invalid_value(
            SECTION,
            "max_consecutive_write_failures",
            "must be at least 1",
        ));
    }

    if publisher.nan_value_filter_forced && !publisher.nan_value_filter_allowed {
        return Err(ConfigError::invalid_value(
            SECTION,
            "nan_value_filter_forced",
            "cannot force NaN filtering while nan_value_filter_allowed is false",
        ));
    }

    Ok(())
}

fn non_zero_duration(field: &'static str, value: Duration) -> Result<()> {
    if value.is_zero() {
        return Err(ConfigError::invalid_value(SECTION, field, "must be non-zero"));
    }
    Ok(())
}
