//! Data rows
//!
//! A row holds one `Value` per column of the table that created it. Writes
//! are validated against the declared column type.

use std::sync::Arc;

use crate::column::ColumnLayout;
use crate::error::{DataSetError, Result};
use crate::table::TableId;
use crate::{DataColumn, Value};

/// A row of a `DataTable`
#[derive(Debug, Clone)]
pub struct DataRow {
    table: TableId,
    layout: Arc<ColumnLayout>,
    values: Vec<Value>,
}

impl DataRow {
    pub(crate) fn new(table: TableId, layout: Arc<ColumnLayout>) -> Self {
        let values = vec![Value::Null; layout.len()];
        Self {
            table,
            layout,
            values,
        }
    }

    /// Identifier of the table this row belongs to
    #[inline]
    pub fn table_id(&self) -> TableId {
        self.table
    }

    /// Number of cells
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the row has no cells
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// All cells in ordinal order
    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Get a cell by column ordinal
    pub fn value(&self, ordinal: usize) -> Result<&Value> {
        self.values
            .get(ordinal)
            .ok_or_else(|| DataSetError::out_of_range("column", ordinal, self.values.len()))
    }

    /// Get a cell by column name
    pub fn value_by_name(&self, name: &str) -> Result<&Value> {
        let ordinal = self
            .layout
            .ordinal_of(name)
            .ok_or_else(|| DataSetError::column_not_found(name))?;
        self.value(ordinal)
    }

    /// Set a cell by column ordinal
    ///
    /// Null is accepted for every column; any other value must carry the
    /// column's declared type.
    pub fn set(&mut self, ordinal: usize, value: impl Into<Value>) -> Result<()> {
        let count = self.values.len();
        let column = self
            .layout
            .columns()
            .get(ordinal)
            .ok_or_else(|| DataSetError::out_of_range("column", ordinal, count))?;

        let value = value.into();
        check_type(column, &value)?;
        self.values[ordinal] = value;
        Ok(())
    }

    /// Set a cell by column name
    pub fn set_by_name(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let ordinal = self
            .layout
            .ordinal_of(name)
            .ok_or_else(|| DataSetError::column_not_found(name))?;
        self.set(ordinal, value)
    }

    /// Adopt a newer layout of the same table, padding new columns with null
    pub(crate) fn adopt_layout(&mut self, layout: Arc<ColumnLayout>) {
        self.values.resize(layout.len(), Value::Null);
        self.layout = layout;
    }
}

fn check_type(column: &DataColumn, value: &Value) -> Result<()> {
    match value.data_type() {
        None => Ok(()),
        Some(actual) if actual == column.data_type() => Ok(()),
        Some(actual) => Err(DataSetError::TypeMismatch {
            column: column.name().to_string(),
            expected: column.data_type(),
            actual,
        }),
    }
}
