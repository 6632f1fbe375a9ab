//! TSP DataSet - Relational metadata container
//!
//! The publisher describes the devices, measurements and phasors it can serve
//! as a small in-memory relational model. This crate provides that model and
//! its wire format:
//!
//! - `DataSet` - ordered collection of tables, also addressable by name
//! - `DataTable` - ordered columns plus ordered rows, with a name → ordinal index
//! - `DataColumn` - immutable name, declared `DataType` and ordinal
//! - `DataRow` - one `Value` cell per column, type-checked on write
//!
//! # Ownership
//!
//! ```text
//! DataSet ──owns──► DataTable ──owns──► DataRow
//!    ▲                  │
//!    └── DataSetId ─────┤ (handle, not a reference)
//!                       └──shares──► Arc<DataColumn>
//! ```
//!
//! Tables refer back to their parent through a `DataSetId` handle, so there
//! are no reference cycles. Column layouts are immutable and shared between a
//! table and its rows.
//!
//! # Wire Format
//!
//! `DataSet::encode` is a deterministic traversal (tables in insertion order,
//! columns in ordinal order, rows in insertion order), so two containers with
//! the same content always produce identical bytes. See [`codec`] for the
//! layout.

mod column;
mod compare;
mod dataset;
mod error;
mod row;
mod table;
mod value;

pub mod codec;

pub use column::DataColumn;
pub use compare::{compare_str, str_eq};
pub use dataset::{DataSet, DataSetId};
pub use error::{DataSetError, Result};
pub use row::DataRow;
pub use table::{DataTable, TableId};
pub use value::{DataType, Decimal, Value, datetime_from_ticks, datetime_to_ticks};

#[cfg(test)]
mod compare_test;
#[cfg(test)]
mod table_test;
