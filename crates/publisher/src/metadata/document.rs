//! Metadata from a pre-parsed document
//!
//! A `MetadataDocument` is a tree of named tables holding rows of named text
//! fields - the shape an XML or JSON metadata export reduces to. Table and
//! field names match case-insensitively; every value is text and is parsed
//! against the published column type.
//!
//! ```json
//! {
//!   "tables": [
//!     { "name": "DeviceDetail", "rows": [ { "Acronym": "SHELBY", "UniqueID": "..." } ] },
//!     { "name": "MeasurementDetail", "rows": [ { "SignalID": "...", "PointTag": "SHELBY:FQ" } ] }
//!   ]
//! }
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tsp_dataset::{DataType, Decimal, Value, str_eq};
use uuid::Uuid;

use super::records::{
    DEVICE_TABLE, DeviceMetadata, MEASUREMENT_TABLE, MeasurementMetadata, MetadataRecords,
    PHASOR_TABLE, PhasorMetadata, PhasorType, QUALITY_FLAGS_TABLE,
};
use crate::error::{PublisherError, Result};

/// Pre-parsed metadata document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetadataDocument {
    #[serde(default)]
    pub tables: Vec<DocumentTable>,
}

/// One named table of text rows
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentTable {
    pub name: String,
    #[serde(default)]
    pub rows: Vec<DocumentRow>,
}

/// One row: field name → text value
pub type DocumentRow = BTreeMap<String, String>;

impl MetadataDocument {
    /// Find a table by name, ignoring case
    pub fn table(&self, name: &str) -> Option<&DocumentTable> {
        self.tables.iter().find(|t| str_eq(&t.name, name, true))
    }

    /// Add a table (builder style)
    pub fn with_table(mut self, table: DocumentTable) -> Self {
        self.tables.push(table);
        self
    }

    /// Convert to metadata records
    ///
    /// Missing tables yield no rows. Missing optional fields take their
    /// defaults; a missing or unparsable required field (device acronym,
    /// measurement signal id) fails the whole document.
    pub fn to_records(&self) -> Result<MetadataRecords> {
        let rows = |name| self.table(name).map(|t| t.rows.as_slice()).unwrap_or(&[]);

        let devices = rows(DEVICE_TABLE)
            .iter()
            .map(|row| Fields::new(DEVICE_TABLE, row).device())
            .collect::<Result<_>>()?;

        let measurements = rows(MEASUREMENT_TABLE)
            .iter()
            .map(|row| Fields::new(MEASUREMENT_TABLE, row).measurement())
            .collect::<Result<_>>()?;

        let phasors = rows(PHASOR_TABLE)
            .iter()
            .map(|row| Fields::new(PHASOR_TABLE, row).phasor())
            .collect::<Result<_>>()?;

        let quality_flags = rows(QUALITY_FLAGS_TABLE)
            .first()
            .map(|row| Fields::new(QUALITY_FLAGS_TABLE, row).measurement())
            .transpose()?;

        Ok(MetadataRecords {
            devices,
            measurements,
            phasors,
            quality_flags,
        })
    }
}

impl DocumentTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Vec::new(),
        }
    }

    /// Add a row from `(field, value)` pairs (builder style)
    pub fn with_row<'a>(mut self, fields: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        self.rows.push(
            fields
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        self
    }
}

/// Typed, case-insensitive access to one document row
struct Fields<'a> {
    table: &'static str,
    row: &'a DocumentRow,
}

impl<'a> Fields<'a> {
    fn new(table: &'static str, row: &'a DocumentRow) -> Self {
        Self { table, row }
    }

    fn raw(&self, field: &str) -> Option<&'a str> {
        self.row
            .iter()
            .find(|(name, _)| str_eq(name, field, true))
            .map(|(_, value)| value.as_str())
    }

    fn parse(&self, field: &str, data_type: DataType) -> Result<Value> {
        match self.raw(field) {
            Some(text) => Value::parse(data_type, text).map_err(|e| {
                PublisherError::invalid_metadata(format!("{}.{}: {}", self.table, field, e))
            }),
            None => Ok(Value::Null),
        }
    }

    fn text(&self, field: &str) -> String {
        self.raw(field).map(|s| s.trim().to_string()).unwrap_or_default()
    }

    fn required_text(&self, field: &str) -> Result<String> {
        let text = self.text(field);
        if text.is_empty() {
            return Err(self.missing(field));
        }
        Ok(text)
    }

    fn guid(&self, field: &str) -> Result<Option<Uuid>> {
        Ok(self.parse(field, DataType::Guid)?.as_guid())
    }

    fn int(&self, field: &str) -> Result<Option<i32>> {
        Ok(self
            .parse(field, DataType::Int32)?
            .as_i64()
            .and_then(|v| i32::try_from(v).ok()))
    }

    fn boolean(&self, field: &str, default: bool) -> Result<bool> {
        Ok(match self.parse(field, DataType::Boolean)? {
            Value::Boolean(b) => b,
            _ => default,
        })
    }

    fn decimal(&self, field: &str) -> Result<Option<Decimal>> {
        Ok(match self.parse(field, DataType::Decimal)? {
            Value::Decimal(d) => Some(d),
            _ => None,
        })
    }

    fn datetime(&self, field: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self.parse(field, DataType::DateTime)?.as_datetime())
    }

    fn missing(&self, field: &str) -> PublisherError {
        PublisherError::invalid_metadata(format!(
            "{} row is missing required field {}",
            self.table, field
        ))
    }

    fn device(&self) -> Result<DeviceMetadata> {
        Ok(DeviceMetadata {
            acronym: self.required_text("Acronym")?,
            name: self.text("Name"),
            unique_id: self.guid("UniqueID")?.unwrap_or_default(),
            access_id: self.int("AccessID")?.unwrap_or_default(),
            parent_acronym: self.text("ParentAcronym"),
            protocol_name: self.text("ProtocolName"),
            frames_per_second: self.int("FramesPerSecond")?.unwrap_or_default(),
            company_acronym: self.text("CompanyAcronym"),
            vendor_acronym: self.text("VendorAcronym"),
            vendor_device_name: self.text("VendorDeviceName"),
            longitude: self.decimal("Longitude")?,
            latitude: self.decimal("Latitude")?,
            updated_on: self.datetime("UpdatedOn")?,
        })
    }

    fn measurement(&self) -> Result<MeasurementMetadata> {
        Ok(MeasurementMetadata {
            device_acronym: self.text("DeviceAcronym"),
            id: self.text("ID"),
            signal_id: self.guid("SignalID")?.ok_or_else(|| self.missing("SignalID"))?,
            point_tag: self.text("PointTag"),
            signal_reference: self.text("SignalReference"),
            signal_acronym: self.text("SignalAcronym"),
            phasor_source_index: self.int("PhasorSourceIndex")?.unwrap_or_default(),
            description: self.text("Description"),
            internal: self.boolean("Internal", true)?,
            enabled: self.boolean("Enabled", true)?,
            updated_on: self.datetime("UpdatedOn")?,
        })
    }

    fn phasor(&self) -> Result<PhasorMetadata> {
        let type_code = self.text("Type");
        let phasor_type = if type_code.is_empty() {
            PhasorType::default()
        } else {
            PhasorType::from_code(&type_code).ok_or_else(|| {
                PublisherError::invalid_metadata(format!(
                    "{}.Type: unknown phasor type '{}'",
                    self.table, type_code
                ))
            })?
        };

        Ok(PhasorMetadata {
            device_acronym: self.text("DeviceAcronym"),
            label: self.text("Label"),
            phasor_type,
            phase: self.text("Phase").chars().next().unwrap_or_default(),
            source_index: self.int("SourceIndex")?.unwrap_or_default(),
            updated_on: self.datetime("UpdatedOn")?,
        })
    }
}
