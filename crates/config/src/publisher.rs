//! Publisher configuration
//!
//! Listener, filtering policy, cipher rotation and per-session limits.

use serde::Deserialize;
use std::time::Duration;

/// Publisher configuration
///
/// # Example
///
/// ```toml
/// [publisher]
/// port = 7165
/// ipv6 = false
/// metadata_refresh_allowed = true
/// nan_value_filter_allowed = true
/// nan_value_filter_forced = false
/// cipher_key_rotation_period = "60s"
/// max_connections = 0
/// handshake_timeout = "5s"
/// write_timeout = "1s"
/// max_consecutive_write_failures = 10
/// send_queue_size = 1024
/// compress_metadata = true
/// heartbeat_interval = "15s"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    /// Command channel listen port
    /// Default: 7165
    pub port: u16,

    /// Listen on IPv6 instead of IPv4
    /// Default: false
    pub ipv6: bool,

    /// Answer subscriber metadata requests (denied when false)
    /// Default: true
    pub metadata_refresh_allowed: bool,

    /// Honor a subscriber's request to drop NaN samples
    /// Default: true
    pub nan_value_filter_allowed: bool,

    /// Drop NaN samples for every subscriber
    /// Default: false
    pub nan_value_filter_forced: bool,

    /// Cipher key rotation period ("0s" disables rotation)
    /// Default: 60s
    #[serde(with = "humantime_serde")]
    pub cipher_key_rotation_period: Duration,

    /// Maximum concurrent subscribers (0 = unlimited)
    /// Default: 0
    pub max_connections: usize,

    /// Time allowed for a new connection to send its handshake
    /// Default: 5s
    #[serde(with = "humantime_serde")]
    pub handshake_timeout: Duration,

    /// Upper bound on a single command channel write
    /// Default: 1s
    #[serde(with = "humantime_serde")]
    pub write_timeout: Duration,

    /// Consecutive failed writes before a session is disconnected
    /// Default: 10
    pub max_consecutive_write_failures: u32,

    /// Per-session outbound queue depth (frames beyond it are dropped)
    /// Default: 1024
    pub send_queue_size: usize,

    /// Gzip metadata for subscribers that accept it
    /// Default: true
    pub compress_metadata: bool,

    /// Keep-alive interval on the command channel
    /// Default: 15s
    #[serde(with = "humantime_serde")]
    pub heartbeat_interval: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            port: 7165,
            ipv6: false,
            metadata_refresh_allowed: true,
            nan_value_filter_allowed: true,
            nan_value_filter_forced: false,
            cipher_key_rotation_period: Duration::from_secs(60),
            max_connections: 0,
            handshake_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(1),
            max_consecutive_write_failures: 10,
            send_queue_size: 1024,
            compress_metadata: true,
            heartbeat_interval: Duration::from_secs(15),
        }
    }
}
