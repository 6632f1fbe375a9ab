//! Column definitions and the shared column layout

use std::collections::HashMap;
use std::sync::Arc;

use crate::DataType;

/// A column of a `DataTable`
///
/// Immutable once created. Shared between the table and its rows via `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataColumn {
    name: String,
    data_type: DataType,
    ordinal: usize,
}

impl DataColumn {
    /// Create a column definition
    ///
    /// The ordinal must equal the table's column count when the column is
    /// added, see [`crate::DataTable::add_column`].
    pub fn new(name: impl Into<String>, data_type: DataType, ordinal: usize) -> Self {
        Self {
            name: name.into(),
            data_type,
            ordinal,
        }
    }

    /// Column name
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared type
    #[inline]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Position within the owning table
    #[inline]
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }
}

/// Ordered columns plus the name → ordinal index
///
/// Both are only ever mutated together in `push`, which keeps the index in
/// step with the column sequence.
#[derive(Debug, Clone, Default)]
pub(crate) struct ColumnLayout {
    columns: Vec<Arc<DataColumn>>,
    index: HashMap<String, usize>,
}

impl ColumnLayout {
    pub(crate) fn push(&mut self, column: Arc<DataColumn>) {
        self.index.insert(column.name().to_string(), self.columns.len());
        self.columns.push(column);
    }

    #[inline]
    pub(crate) fn columns(&self) -> &[Arc<DataColumn>] {
        &self.columns
    }

    #[inline]
    pub(crate) fn ordinal_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.columns.len()
    }

    #[cfg(test)]
    pub(crate) fn index_snapshot(&self) -> Vec<(String, usize)> {
        let mut entries: Vec<_> = self.index.iter().map(|(k, v)| (k.clone(), *v)).collect();
        entries.sort_by_key(|(_, ordinal)| *ordinal);
        entries
    }
}
