//! Tests for tables, columns and the name → ordinal index

use crate::*;

fn measurement_table() -> DataTable {
    let dataset = DataSet::new();
    let mut table = dataset.create_table("MeasurementDetail");
    table.create_column("DeviceAcronym", DataType::String).unwrap();
    table.create_column("SignalID", DataType::Guid).unwrap();
    table.create_column("PhasorSourceIndex", DataType::Int32).unwrap();
    table
}

/// Name and ordinal lookups must agree and the index must mirror the columns
fn assert_index_consistent(table: &DataTable) {
    for (ordinal, column) in table.columns().iter().enumerate() {
        assert_eq!(column.ordinal(), ordinal);
        let by_name = table.column(column.name()).unwrap();
        let by_ordinal = table.column_at(ordinal).unwrap();
        assert_eq!(by_name, by_ordinal);
    }

    let expected: Vec<(String, usize)> = table
        .columns()
        .iter()
        .map(|c| (c.name().to_string(), c.ordinal()))
        .collect();
    assert_eq!(table.index_snapshot(), expected);
}

// ============================================================================
// Column tests
// ============================================================================

#[test]
fn test_create_column_assigns_ordinals() {
    let table = measurement_table();

    assert_eq!(table.column_count(), 3);
    assert_eq!(table.column("DeviceAcronym").unwrap().ordinal(), 0);
    assert_eq!(table.column("SignalID").unwrap().ordinal(), 1);
    assert_eq!(table.column("PhasorSourceIndex").unwrap().ordinal(), 2);
    assert_index_consistent(&table);
}

#[test]
fn test_add_column_with_matching_ordinal() {
    let mut table = measurement_table();
    let column = table
        .add_column(DataColumn::new("Description", DataType::String, 3))
        .unwrap();

    assert_eq!(column.ordinal(), 3);
    assert_eq!(table.column_index("Description"), Some(3));
    assert_index_consistent(&table);
}

#[test]
fn test_add_column_rejects_wrong_ordinal() {
    let mut table = measurement_table();
    let result = table.add_column(DataColumn::new("Description", DataType::String, 7));

    assert!(matches!(
        result,
        Err(DataSetError::OrdinalMismatch {
            ordinal: 7,
            expected: 3,
            ..
        })
    ));
    assert_eq!(table.column_count(), 3);
    assert_index_consistent(&table);
}

#[test]
fn test_duplicate_column_rejected() {
    let mut table = measurement_table();
    let result = table.create_column("SignalID", DataType::String);

    assert!(matches!(result, Err(DataSetError::DuplicateColumn { .. })));
    assert_eq!(table.column_count(), 3);
    assert_index_consistent(&table);
}

#[test]
fn test_mixed_column_sequence_keeps_index_consistent() {
    let dataset = DataSet::new();
    let mut table = dataset.create_table("Mixed");

    table.create_column("a", DataType::Int8).unwrap();
    table.add_column(DataColumn::new("b", DataType::Int16, 1)).unwrap();
    let _ = table.add_column(DataColumn::new("c", DataType::Int32, 5));
    let _ = table.create_column("a", DataType::Boolean);
    table.create_column("c", DataType::Int64).unwrap();
    table.add_column(DataColumn::new("d", DataType::Binary, 3)).unwrap();

    assert_eq!(table.column_count(), 4);
    assert_index_consistent(&table);
}

#[test]
fn test_column_not_found() {
    let table = measurement_table();
    let result = table.column("Missing");

    assert!(matches!(
        result,
        Err(DataSetError::NotFound { kind: "column", .. })
    ));
}

#[test]
fn test_column_at_out_of_range() {
    let table = measurement_table();
    let result = table.column_at(3);

    assert!(matches!(
        result,
        Err(DataSetError::OutOfRange {
            kind: "column",
            index: 3,
            count: 3
        })
    ));
}

#[test]
fn test_find_column_ignore_case() {
    let table = measurement_table();

    assert!(table.find_column("signalid", false).is_none());
    let column = table.find_column("signalid", true).unwrap();
    assert_eq!(column.name(), "SignalID");
}

// ============================================================================
// Row tests
// ============================================================================

#[test]
fn test_add_row_and_lookup() {
    let mut table = measurement_table();
    let mut row = table.create_row();
    row.set(0, "SHELBY").unwrap();
    table.add_row(row).unwrap();

    assert_eq!(table.row_count(), 1);
    let stored = table.row(0).unwrap();
    assert_eq!(stored.value(0).unwrap(), &Value::from("SHELBY"));
    assert!(stored.value(1).unwrap().is_null());
}

#[test]
fn test_row_out_of_range() {
    let table = measurement_table();
    assert!(matches!(
        table.row(0),
        Err(DataSetError::OutOfRange { kind: "row", .. })
    ));
}

#[test]
fn test_foreign_row_rejected() {
    let mut first = measurement_table();
    let second = measurement_table();

    let row = second.create_row();
    assert!(matches!(
        first.add_row(row),
        Err(DataSetError::ForeignOwner("row"))
    ));
}

#[test]
fn test_column_added_after_rows_pads_null() {
    let mut table = measurement_table();
    let mut row = table.create_row();
    row.set(0, "SHELBY").unwrap();
    table.add_row(row).unwrap();

    table.create_column("Description", DataType::String).unwrap();

    let stored = table.row(0).unwrap();
    assert_eq!(stored.len(), 4);
    assert!(stored.value_by_name("Description").unwrap().is_null());
}

#[test]
fn test_retain_rows_preserves_order() {
    let mut table = measurement_table();
    for (i, name) in ["A", "B", "C", "D"].iter().enumerate() {
        let mut row = table.create_row();
        row.set(0, *name).unwrap();
        row.set(2, i as i32).unwrap();
        table.add_row(row).unwrap();
    }

    table.retain_rows(|row| row.value(2).unwrap().as_i64().unwrap() % 2 == 1);

    let names: Vec<_> = table
        .rows()
        .iter()
        .map(|r| r.value(0).unwrap().as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["B", "D"]);
}

// ============================================================================
// DataSet tests
// ============================================================================

#[test]
fn test_dataset_table_order_and_lookup() {
    let mut dataset = DataSet::new();
    for name in ["DeviceDetail", "MeasurementDetail", "PhasorDetail"] {
        let table = dataset.create_table(name);
        dataset.add_table(table).unwrap();
    }

    assert_eq!(dataset.table_count(), 3);
    assert_eq!(dataset.table_at(1).unwrap().name(), "MeasurementDetail");
    assert_eq!(dataset.table("PhasorDetail").unwrap().parent(), dataset.id());
    assert!(dataset.find_table("phasordetail", true).is_some());
    assert!(dataset.find_table("phasordetail", false).is_none());
}

#[test]
fn test_dataset_duplicate_table() {
    let mut dataset = DataSet::new();
    let first = dataset.create_table("DeviceDetail");
    let second = dataset.create_table("DeviceDetail");
    dataset.add_table(first).unwrap();

    assert!(matches!(
        dataset.add_table(second),
        Err(DataSetError::DuplicateTable(_))
    ));
}

#[test]
fn test_dataset_foreign_table() {
    let mut dataset = DataSet::new();
    let other = DataSet::new();

    assert!(matches!(
        dataset.add_table(other.create_table("DeviceDetail")),
        Err(DataSetError::ForeignOwner("table"))
    ));
}

#[test]
fn test_dataset_remove_table_reindexes() {
    let mut dataset = DataSet::new();
    for name in ["A", "B", "C"] {
        let table = dataset.create_table(name);
        dataset.add_table(table).unwrap();
    }

    let removed = dataset.remove_table("A").unwrap();
    assert_eq!(removed.name(), "A");
    assert_eq!(dataset.table_at(0).unwrap().name(), "B");
    assert_eq!(dataset.table("C").unwrap().name(), "C");
    assert!(matches!(
        dataset.table("A"),
        Err(DataSetError::NotFound { kind: "table", .. })
    ));
}
