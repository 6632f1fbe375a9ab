//! DataSet error types

use thiserror::Error;

use crate::DataType;

/// Result type for dataset operations
pub type Result<T> = std::result::Result<T, DataSetError>;

/// Errors that can occur when building, querying or decoding a dataset
#[derive(Debug, Error)]
pub enum DataSetError {
    /// Named table or column does not exist
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    /// Ordinal or row index is outside the valid range
    #[error("{kind} index {index} out of range (count {count})")]
    OutOfRange {
        kind: &'static str,
        index: usize,
        count: usize,
    },

    /// Value tag does not match the column's declared type
    #[error("type mismatch for column '{column}': expected {expected}, got {actual}")]
    TypeMismatch {
        column: String,
        expected: DataType,
        actual: DataType,
    },

    /// Column name already present in the table
    #[error("duplicate column '{column}' in table '{table}'")]
    DuplicateColumn { table: String, column: String },

    /// Table name already present in the dataset
    #[error("duplicate table '{0}'")]
    DuplicateTable(String),

    /// Column ordinal does not match its position in the table
    #[error("column '{column}' declares ordinal {ordinal}, expected {expected}")]
    OrdinalMismatch {
        column: String,
        ordinal: usize,
        expected: usize,
    },

    /// Row or table belongs to a different parent
    #[error("{0} belongs to a different parent")]
    ForeignOwner(&'static str),

    /// Decimal literal is not a valid number
    #[error("invalid decimal literal: {0}")]
    InvalidDecimal(String),

    /// Value cannot be represented in the wire format
    #[error("encode error: {0}")]
    Encode(String),

    /// Wire-format decoding failed
    #[error("decode error: {0}")]
    Decode(String),

    /// Compression or decompression failed
    #[error("compression error: {0}")]
    Compression(#[from] std::io::Error),
}

impl DataSetError {
    /// Create a table-not-found error
    #[inline]
    pub fn table_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "table",
            name: name.into(),
        }
    }

    /// Create a column-not-found error
    #[inline]
    pub fn column_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "column",
            name: name.into(),
        }
    }

    /// Create an out-of-range error
    #[inline]
    pub fn out_of_range(kind: &'static str, index: usize, count: usize) -> Self {
        Self::OutOfRange { kind, index, count }
    }

    /// Create a decode error
    #[inline]
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }
}
