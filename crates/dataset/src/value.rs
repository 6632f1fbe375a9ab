//! Column types and dynamically typed cell values
//!
//! `DataType` is the fixed enumeration of column types the metadata model
//! supports. `Value` is the tagged cell variant; every non-null value maps to
//! exactly one `DataType`, which is what rows validate against on write.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{DataSetError, Result};

/// Ticks (100 ns intervals) between 0001-01-01 and the Unix epoch
const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;

/// Ticks per second
const TICKS_PER_SECOND: i64 = 10_000_000;

/// Declared type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataType {
    String = 0,
    Boolean = 1,
    DateTime = 2,
    Single = 3,
    Double = 4,
    Decimal = 5,
    Guid = 6,
    Int8 = 7,
    Int16 = 8,
    Int32 = 9,
    Int64 = 10,
    UInt8 = 11,
    UInt16 = 12,
    UInt32 = 13,
    UInt64 = 14,
    Binary = 15,
}

impl DataType {
    /// Wire code of this type
    #[inline]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Type name as used in metadata documents
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::DateTime => "datetime",
            Self::Single => "single",
            Self::Double => "double",
            Self::Decimal => "decimal",
            Self::Guid => "guid",
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::UInt8 => "uint8",
            Self::UInt16 => "uint16",
            Self::UInt32 => "uint32",
            Self::UInt64 => "uint64",
            Self::Binary => "binary",
        }
    }
}

impl TryFrom<u8> for DataType {
    type Error = DataSetError;

    fn try_from(code: u8) -> Result<Self> {
        Ok(match code {
            0 => Self::String,
            1 => Self::Boolean,
            2 => Self::DateTime,
            3 => Self::Single,
            4 => Self::Double,
            5 => Self::Decimal,
            6 => Self::Guid,
            7 => Self::Int8,
            8 => Self::Int16,
            9 => Self::Int32,
            10 => Self::Int64,
            11 => Self::UInt8,
            12 => Self::UInt16,
            13 => Self::UInt32,
            14 => Self::UInt64,
            15 => Self::Binary,
            other => return Err(DataSetError::decode(format!("unknown data type {other}"))),
        })
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Arbitrary-precision decimal kept in canonical textual form
///
/// Canonical form has no leading `+`, no redundant leading zeros, no trailing
/// fractional zeros and no negative zero, so equal numbers compare and encode
/// identically.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Decimal(String);

impl Decimal {
    /// Canonical string form
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Decimal {
    type Err = DataSetError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let (negative, body) = match trimmed.as_bytes().first() {
            Some(b'-') => (true, &trimmed[1..]),
            Some(b'+') => (false, &trimmed[1..]),
            _ => (false, trimmed),
        };

        let (int_part, frac_part) = match body.split_once('.') {
            Some((i, f)) => (i, f),
            None => (body, ""),
        };

        let all_digits = |p: &str| p.bytes().all(|b| b.is_ascii_digit());
        if int_part.is_empty() || !all_digits(int_part) || !all_digits(frac_part) {
            return Err(DataSetError::InvalidDecimal(s.to_string()));
        }
        if body.ends_with('.') {
            return Err(DataSetError::InvalidDecimal(s.to_string()));
        }

        let int_part = int_part.trim_start_matches('0');
        let int_part = if int_part.is_empty() { "0" } else { int_part };
        let frac_part = frac_part.trim_end_matches('0');

        let is_zero = int_part == "0" && frac_part.is_empty();
        let mut canonical = String::with_capacity(trimmed.len());
        if negative && !is_zero {
            canonical.push('-');
        }
        canonical.push_str(int_part);
        if !frac_part.is_empty() {
            canonical.push('.');
            canonical.push_str(frac_part);
        }

        Ok(Self(canonical))
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single cell value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    String(String),
    Boolean(bool),
    DateTime(DateTime<Utc>),
    Single(f32),
    Double(f64),
    Decimal(Decimal),
    Guid(Uuid),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Binary(Vec<u8>),
}

impl Value {
    /// Type tag of this value (`None` for null)
    pub fn data_type(&self) -> Option<DataType> {
        Some(match self {
            Self::Null => return None,
            Self::String(_) => DataType::String,
            Self::Boolean(_) => DataType::Boolean,
            Self::DateTime(_) => DataType::DateTime,
            Self::Single(_) => DataType::Single,
            Self::Double(_) => DataType::Double,
            Self::Decimal(_) => DataType::Decimal,
            Self::Guid(_) => DataType::Guid,
            Self::Int8(_) => DataType::Int8,
            Self::Int16(_) => DataType::Int16,
            Self::Int32(_) => DataType::Int32,
            Self::Int64(_) => DataType::Int64,
            Self::UInt8(_) => DataType::UInt8,
            Self::UInt16(_) => DataType::UInt16,
            Self::UInt32(_) => DataType::UInt32,
            Self::UInt64(_) => DataType::UInt64,
            Self::Binary(_) => DataType::Binary,
        })
    }

    /// Check for null
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Parse text into a value of the given type
    ///
    /// Used when ingesting pre-parsed documents where every field arrives as
    /// text. Empty text parses to null for every type except string.
    pub fn parse(data_type: DataType, text: &str) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() && data_type != DataType::String {
            return Ok(Self::Null);
        }

        let invalid = |e: &dyn fmt::Display| {
            DataSetError::decode(format!("cannot parse '{text}' as {data_type}: {e}"))
        };

        Ok(match data_type {
            DataType::String => Self::String(text.to_string()),
            DataType::Boolean => match text.to_ascii_lowercase().as_str() {
                "true" | "1" => Self::Boolean(true),
                "false" | "0" => Self::Boolean(false),
                _ => return Err(invalid(&"expected true/false")),
            },
            DataType::DateTime => {
                let dt = DateTime::parse_from_rfc3339(text).map_err(|e| invalid(&e))?;
                Self::DateTime(dt.with_timezone(&Utc))
            }
            DataType::Single => Self::Single(text.parse().map_err(|e| invalid(&e))?),
            DataType::Double => Self::Double(text.parse().map_err(|e| invalid(&e))?),
            DataType::Decimal => Self::Decimal(text.parse()?),
            DataType::Guid => Self::Guid(Uuid::parse_str(text).map_err(|e| invalid(&e))?),
            DataType::Int8 => Self::Int8(text.parse().map_err(|e| invalid(&e))?),
            DataType::Int16 => Self::Int16(text.parse().map_err(|e| invalid(&e))?),
            DataType::Int32 => Self::Int32(text.parse().map_err(|e| invalid(&e))?),
            DataType::Int64 => Self::Int64(text.parse().map_err(|e| invalid(&e))?),
            DataType::UInt8 => Self::UInt8(text.parse().map_err(|e| invalid(&e))?),
            DataType::UInt16 => Self::UInt16(text.parse().map_err(|e| invalid(&e))?),
            DataType::UInt32 => Self::UInt32(text.parse().map_err(|e| invalid(&e))?),
            DataType::UInt64 => Self::UInt64(text.parse().map_err(|e| invalid(&e))?),
            DataType::Binary => return Err(invalid(&"binary fields cannot be parsed from text")),
        })
    }

    /// Borrow as string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as GUID
    pub fn as_guid(&self) -> Option<Uuid> {
        match self {
            Self::Guid(g) => Some(*g),
            _ => None,
        }
    }

    /// Get as signed integer (any signed width)
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::Int8(v) => Some(v.into()),
            Self::Int16(v) => Some(v.into()),
            Self::Int32(v) => Some(v.into()),
            Self::Int64(v) => Some(v),
            _ => None,
        }
    }

    /// Get as double (either float width)
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Single(v) => Some(v.into()),
            Self::Double(v) => Some(v),
            _ => None,
        }
    }

    /// Get as date-time
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Self::UInt16(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Self::Decimal(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Self::Guid(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::DateTime(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Convert a UTC timestamp to ticks (100 ns since 0001-01-01)
///
/// Returns `None` when the timestamp does not fit in an `i64` tick count
/// (roughly beyond year 29,000 in either direction).
pub fn datetime_to_ticks(dt: &DateTime<Utc>) -> Option<i64> {
    dt.timestamp()
        .checked_mul(TICKS_PER_SECOND)?
        .checked_add(UNIX_EPOCH_TICKS)?
        .checked_add(i64::from(dt.timestamp_subsec_nanos()) / 100)
}

/// Convert ticks back to a UTC timestamp
///
/// Returns `None` when the tick count is outside chrono's range.
pub fn datetime_from_ticks(ticks: i64) -> Option<DateTime<Utc>> {
    let since_epoch = ticks.checked_sub(UNIX_EPOCH_TICKS)?;
    let secs = since_epoch.div_euclid(TICKS_PER_SECOND);
    let nanos = (since_epoch.rem_euclid(TICKS_PER_SECOND) * 100) as u32;
    DateTime::from_timestamp(secs, nanos)
}
