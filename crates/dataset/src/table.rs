//! Data tables
//!
//! A table owns its rows and shares its column layout with them. The
//! name → ordinal index lives inside the layout and is updated in the same
//! step as the column sequence, so `column(name)` and `column_at(ordinal)`
//! always agree.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::column::ColumnLayout;
use crate::dataset::DataSetId;
use crate::error::{DataSetError, Result};
use crate::{DataColumn, DataRow, DataType, str_eq};

/// Counter for generating unique table IDs
static TABLE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identity of a table, used to tie rows to their table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableId(u64);

/// A named table of typed columns and rows
#[derive(Debug, Clone)]
pub struct DataTable {
    id: TableId,
    parent: DataSetId,
    name: String,
    layout: Arc<ColumnLayout>,
    rows: Vec<DataRow>,
}

impl DataTable {
    pub(crate) fn new(parent: DataSetId, name: impl Into<String>) -> Self {
        Self {
            id: TableId(TABLE_ID_COUNTER.fetch_add(1, Ordering::Relaxed)),
            parent,
            name: name.into(),
            layout: Arc::new(ColumnLayout::default()),
            rows: Vec::new(),
        }
    }

    /// Table identity
    #[inline]
    pub fn id(&self) -> TableId {
        self.id
    }

    /// Handle of the owning dataset
    #[inline]
    pub fn parent(&self) -> DataSetId {
        self.parent
    }

    /// Table name
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a pre-built column
    ///
    /// The column's ordinal must equal the current column count and its name
    /// must be unused. Existing rows gain a null cell for the new column.
    pub fn add_column(&mut self, column: DataColumn) -> Result<Arc<DataColumn>> {
        let expected = self.layout.len();

        if self.layout.ordinal_of(column.name()).is_some() {
            return Err(DataSetError::DuplicateColumn {
                table: self.name.clone(),
                column: column.name().to_string(),
            });
        }

        if column.ordinal() != expected {
            return Err(DataSetError::OrdinalMismatch {
                column: column.name().to_string(),
                ordinal: column.ordinal(),
                expected,
            });
        }

        let column = Arc::new(column);
        Arc::make_mut(&mut self.layout).push(Arc::clone(&column));

        for row in &mut self.rows {
            row.adopt_layout(Arc::clone(&self.layout));
        }

        Ok(column)
    }

    /// Create and add a column at the next ordinal
    pub fn create_column(
        &mut self,
        name: impl Into<String>,
        data_type: DataType,
    ) -> Result<Arc<DataColumn>> {
        let ordinal = self.layout.len();
        self.add_column(DataColumn::new(name, data_type, ordinal))
    }

    /// Look up a column by exact name
    pub fn column(&self, name: &str) -> Result<&Arc<DataColumn>> {
        self.layout
            .ordinal_of(name)
            .map(|ordinal| &self.layout.columns()[ordinal])
            .ok_or_else(|| DataSetError::column_not_found(name))
    }

    /// Look up a column by ordinal
    pub fn column_at(&self, ordinal: usize) -> Result<&Arc<DataColumn>> {
        self.layout
            .columns()
            .get(ordinal)
            .ok_or_else(|| DataSetError::out_of_range("column", ordinal, self.layout.len()))
    }

    /// Ordinal of a column by exact name
    #[inline]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.layout.ordinal_of(name)
    }

    /// Find a column by name with an explicit case-sensitivity choice
    pub fn find_column(&self, name: &str, ignore_case: bool) -> Option<&Arc<DataColumn>> {
        if !ignore_case {
            return self.column(name).ok();
        }
        self.layout
            .columns()
            .iter()
            .find(|c| str_eq(c.name(), name, true))
    }

    /// All columns in ordinal order
    #[inline]
    pub fn columns(&self) -> &[Arc<DataColumn>] {
        self.layout.columns()
    }

    /// Number of columns
    #[inline]
    pub fn column_count(&self) -> usize {
        self.layout.len()
    }

    /// Create an empty row shaped for this table (not yet added)
    pub fn create_row(&self) -> DataRow {
        DataRow::new(self.id, Arc::clone(&self.layout))
    }

    /// Append a row created by this table
    pub fn add_row(&mut self, mut row: DataRow) -> Result<()> {
        if row.table_id() != self.id {
            return Err(DataSetError::ForeignOwner("row"));
        }
        row.adopt_layout(Arc::clone(&self.layout));
        self.rows.push(row);
        Ok(())
    }

    /// Get a row by insertion index
    pub fn row(&self, index: usize) -> Result<&DataRow> {
        self.rows
            .get(index)
            .ok_or_else(|| DataSetError::out_of_range("row", index, self.rows.len()))
    }

    /// All rows in insertion order
    #[inline]
    pub fn rows(&self) -> &[DataRow] {
        &self.rows
    }

    /// Number of rows
    #[inline]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Keep only rows matching the predicate, preserving order
    pub fn retain_rows<F>(&mut self, keep: F)
    where
        F: FnMut(&DataRow) -> bool,
    {
        self.rows.retain(keep);
    }

    #[cfg(test)]
    pub(crate) fn index_snapshot(&self) -> Vec<(String, usize)> {
        self.layout.index_snapshot()
    }
}
