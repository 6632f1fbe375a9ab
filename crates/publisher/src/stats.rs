//! Publication statistics
//!
//! Each session owns its counters; every write is mirrored into the
//! publisher-wide totals held by the registry, so totals never depend on
//! when a departed session is dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-session counters
#[derive(Debug, Default)]
pub struct SessionStats {
    /// Bytes written to the command channel
    pub command_bytes: AtomicU64,
    /// Bytes written to the data channel
    pub data_bytes: AtomicU64,
    /// Samples delivered
    pub measurements: AtomicU64,
    totals: Option<Arc<SessionStats>>,
}

impl SessionStats {
    pub const fn new() -> Self {
        Self {
            command_bytes: AtomicU64::new(0),
            data_bytes: AtomicU64::new(0),
            measurements: AtomicU64::new(0),
            totals: None,
        }
    }

    /// Counters that also add every write to `totals`
    pub fn reporting_to(totals: Arc<SessionStats>) -> Self {
        Self {
            totals: Some(totals),
            ..Self::new()
        }
    }

    /// Record a successful command channel write
    #[inline]
    pub fn command_sent(&self, bytes: usize, measurements: u64) {
        self.command_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
        if measurements > 0 {
            self.measurements.fetch_add(measurements, Ordering::Relaxed);
        }
        if let Some(totals) = &self.totals {
            totals.command_sent(bytes, measurements);
        }
    }

    /// Record a successful data channel write
    #[inline]
    pub fn data_sent(&self, bytes: usize, measurements: u64) {
        self.data_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
        self.measurements.fetch_add(measurements, Ordering::Relaxed);
        if let Some(totals) = &self.totals {
            totals.data_sent(bytes, measurements);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            command_bytes: self.command_bytes.load(Ordering::Relaxed),
            data_bytes: self.data_bytes.load(Ordering::Relaxed),
            measurements: self.measurements.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub command_bytes: u64,
    pub data_bytes: u64,
    pub measurements: u64,
}
