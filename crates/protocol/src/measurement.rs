//! Measurement samples
//!
//! A `Measurement` is one time-series sample: which signal, what value, when,
//! and a set of quality flags. Samples are immutable once built; the pipeline
//! shares them by reference across every session it fans out to.

use std::fmt;

use chrono::{DateTime, Utc};
use tsp_dataset::{datetime_from_ticks, datetime_to_ticks};
use uuid::Uuid;

/// Quality/state flags attached to a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StateFlags(u32);

impl StateFlags {
    pub const NORMAL: Self = Self(0);
    pub const BAD_DATA: Self = Self(1 << 0);
    pub const SUSPECT_DATA: Self = Self(1 << 1);
    pub const OVER_RANGE: Self = Self(1 << 2);
    pub const UNDER_RANGE: Self = Self(1 << 3);
    pub const ALARM_HIGH: Self = Self(1 << 4);
    pub const ALARM_LOW: Self = Self(1 << 5);
    pub const BAD_TIME: Self = Self(1 << 16);
    pub const SUSPECT_TIME: Self = Self(1 << 17);
    pub const LATE_TIME_ALARM: Self = Self(1 << 18);
    pub const FUTURE_TIME_ALARM: Self = Self(1 << 19);
    pub const DISCARDED_VALUE: Self = Self(1 << 22);
    pub const CALCULATED_VALUE: Self = Self(1 << 26);

    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn is_normal(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for StateFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for StateFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for StateFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// One time-series sample
///
/// The timestamp is kept in 100ns ticks since 0001-01-01 UTC, which is also
/// the wire representation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    signal_id: Uuid,
    value: f64,
    timestamp: i64,
    flags: StateFlags,
}

impl Measurement {
    /// Create a sample with a tick timestamp and normal flags
    pub fn new(signal_id: Uuid, value: f64, timestamp: i64) -> Self {
        Self {
            signal_id,
            value,
            timestamp,
            flags: StateFlags::NORMAL,
        }
    }

    /// Create a sample stamped with a wall-clock time
    ///
    /// Times outside the tick range saturate to the nearest end.
    pub fn at(signal_id: Uuid, value: f64, time: DateTime<Utc>) -> Self {
        let ticks = datetime_to_ticks(&time).unwrap_or(if time.timestamp() < 0 {
            i64::MIN
        } else {
            i64::MAX
        });
        Self::new(signal_id, value, ticks)
    }

    /// Create a sample stamped with the current time
    pub fn now(signal_id: Uuid, value: f64) -> Self {
        Self::at(signal_id, value, Utc::now())
    }

    /// Return a copy carrying the given flags
    pub fn with_flags(mut self, flags: StateFlags) -> Self {
        self.flags = flags;
        self
    }

    #[inline]
    pub fn signal_id(&self) -> Uuid {
        self.signal_id
    }

    #[inline]
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Timestamp in 100ns ticks
    #[inline]
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    #[inline]
    pub fn flags(&self) -> StateFlags {
        self.flags
    }

    /// Timestamp as wall-clock time (None if out of chrono's range)
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        datetime_from_ticks(self.timestamp)
    }

    #[inline]
    pub fn is_nan(&self) -> bool {
        self.value.is_nan()
    }
}
