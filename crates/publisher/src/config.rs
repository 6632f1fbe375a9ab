//! Publisher runtime configuration

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

/// Default command channel port
pub const DEFAULT_PORT: u16 = 7165;

/// Publisher configuration
///
/// `metadata_refresh_allowed`, the NaN filter flags and the rotation period
/// are initial values; they can be changed on a running publisher.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Command channel listen port (0 picks an ephemeral port)
    pub port: u16,
    /// Listen on IPv6 instead of IPv4
    pub ipv6: bool,
    /// Answer subscriber metadata requests
    pub metadata_refresh_allowed: bool,
    /// Honor per-session NaN filter requests
    pub nan_value_filter_allowed: bool,
    /// Drop NaN samples for every session
    pub nan_value_filter_forced: bool,
    /// Cipher key rotation period (zero disables timed rotation)
    pub cipher_key_rotation_period: Duration,
    /// Maximum concurrent sessions (0 = unlimited)
    pub max_connections: usize,
    /// Time allowed for the first message of a connection
    pub handshake_timeout: Duration,
    /// Upper bound on one command channel write
    pub write_timeout: Duration,
    /// Consecutive dropped or failed frames before disconnecting a session
    pub max_consecutive_write_failures: u32,
    /// Per-session outbound queue depth
    pub send_queue_size: usize,
    /// Gzip metadata for subscribers that accept it
    pub compress_metadata: bool,
    /// Command channel keep-alive interval (zero disables heartbeats)
    pub heartbeat_interval: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
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

impl PublisherConfig {
    /// Config listening on the given port with defaults elsewhere
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }

    /// Listen on IPv6
    pub fn with_ipv6(mut self, ipv6: bool) -> Self {
        self.ipv6 = ipv6;
        self
    }

    pub fn with_metadata_refresh(mut self, allowed: bool) -> Self {
        self.metadata_refresh_allowed = allowed;
        self
    }

    pub fn with_nan_filter(mut self, allowed: bool, forced: bool) -> Self {
        self.nan_value_filter_allowed = allowed;
        self.nan_value_filter_forced = forced;
        self
    }

    pub fn with_rotation_period(mut self, period: Duration) -> Self {
        self.cipher_key_rotation_period = period;
        self
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_send_queue_size(mut self, size: usize) -> Self {
        self.send_queue_size = size;
        self
    }

    pub fn with_max_write_failures(mut self, failures: u32) -> Self {
        self.max_consecutive_write_failures = failures;
        self
    }

    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress_metadata = compress;
        self
    }

    /// Wildcard address for the configured family and port
    pub fn bind_address(&self) -> SocketAddr {
        SocketAddr::new(self.unspecified_ip(), self.port)
    }

    /// Wildcard address of the configured family (port 0) for the data channel
    pub fn data_bind_address(&self) -> SocketAddr {
        SocketAddr::new(self.unspecified_ip(), 0)
    }

    fn unspecified_ip(&self) -> IpAddr {
        if self.ipv6 {
            IpAddr::V6(Ipv6Addr::UNSPECIFIED)
        } else {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        }
    }
}
