//! The dataset container

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{DataSetError, Result};
use crate::{DataTable, str_eq};

/// Counter for generating unique dataset IDs
static DATASET_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Handle a table uses to refer back to its dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataSetId(u64);

/// Ordered collection of named tables
#[derive(Debug, Clone)]
pub struct DataSet {
    id: DataSetId,
    tables: Vec<DataTable>,
    index: HashMap<String, usize>,
}

impl DataSet {
    /// Create an empty dataset
    pub fn new() -> Self {
        Self {
            id: DataSetId(DATASET_ID_COUNTER.fetch_add(1, Ordering::Relaxed)),
            tables: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Dataset identity
    #[inline]
    pub fn id(&self) -> DataSetId {
        self.id
    }

    /// Create an empty table parented to this dataset (not yet added)
    pub fn create_table(&self, name: impl Into<String>) -> DataTable {
        DataTable::new(self.id, name)
    }

    /// Append a table created by this dataset
    pub fn add_table(&mut self, table: DataTable) -> Result<()> {
        if table.parent() != self.id {
            return Err(DataSetError::ForeignOwner("table"));
        }
        if self.index.contains_key(table.name()) {
            return Err(DataSetError::DuplicateTable(table.name().to_string()));
        }
        self.index.insert(table.name().to_string(), self.tables.len());
        self.tables.push(table);
        Ok(())
    }

    /// Look up a table by exact name
    pub fn table(&self, name: &str) -> Result<&DataTable> {
        self.index
            .get(name)
            .map(|&i| &self.tables[i])
            .ok_or_else(|| DataSetError::table_not_found(name))
    }

    /// Look up a table by exact name for mutation
    pub fn table_mut(&mut self, name: &str) -> Result<&mut DataTable> {
        match self.index.get(name) {
            Some(&i) => Ok(&mut self.tables[i]),
            None => Err(DataSetError::table_not_found(name)),
        }
    }

    /// Look up a table by insertion index
    pub fn table_at(&self, index: usize) -> Result<&DataTable> {
        self.tables
            .get(index)
            .ok_or_else(|| DataSetError::out_of_range("table", index, self.tables.len()))
    }

    /// Find a table by name with an explicit case-sensitivity choice
    pub fn find_table(&self, name: &str, ignore_case: bool) -> Option<&DataTable> {
        if !ignore_case {
            return self.table(name).ok();
        }
        self.tables.iter().find(|t| str_eq(t.name(), name, true))
    }

    /// Remove a table by name, preserving the order of the remaining tables
    pub fn remove_table(&mut self, name: &str) -> Result<DataTable> {
        let position = self
            .index
            .remove(name)
            .ok_or_else(|| DataSetError::table_not_found(name))?;
        let table = self.tables.remove(position);

        for slot in self.index.values_mut() {
            if *slot > position {
                *slot -= 1;
            }
        }

        Ok(table)
    }

    /// All tables in insertion order
    #[inline]
    pub fn tables(&self) -> &[DataTable] {
        &self.tables
    }

    /// Number of tables
    #[inline]
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }
}

impl Default for DataSet {
    fn default() -> Self {
        Self::new()
    }
}
