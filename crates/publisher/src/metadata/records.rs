//! Metadata records and the table schema they are published under
//!
//! Every ingestion path (records, configuration frames, documents) ends up
//! as a `MetadataRecords` value, and `MetadataRecords::build` is the only
//! place that turns records into a `DataSet`. This keeps the published
//! schema identical regardless of where the metadata came from.

use chrono::{DateTime, Utc};
use tsp_dataset::{DataRow, DataSet, DataTable, DataType, Decimal, Value};
use uuid::Uuid;

use crate::error::Result;

/// Version of the published table layout, carried in the `SchemaVersion` table
pub const SCHEMA_VERSION: i32 = 1;

pub const DEVICE_TABLE: &str = "DeviceDetail";
pub const MEASUREMENT_TABLE: &str = "MeasurementDetail";
pub const PHASOR_TABLE: &str = "PhasorDetail";
pub const QUALITY_FLAGS_TABLE: &str = "QualityFlags";
pub const SCHEMA_VERSION_TABLE: &str = "SchemaVersion";

pub(crate) const DEVICE_COLUMNS: &[(&str, DataType)] = &[
    ("Acronym", DataType::String),
    ("Name", DataType::String),
    ("UniqueID", DataType::Guid),
    ("AccessID", DataType::Int32),
    ("ParentAcronym", DataType::String),
    ("ProtocolName", DataType::String),
    ("FramesPerSecond", DataType::Int32),
    ("CompanyAcronym", DataType::String),
    ("VendorAcronym", DataType::String),
    ("VendorDeviceName", DataType::String),
    ("Longitude", DataType::Decimal),
    ("Latitude", DataType::Decimal),
    ("UpdatedOn", DataType::DateTime),
];

pub(crate) const MEASUREMENT_COLUMNS: &[(&str, DataType)] = &[
    ("DeviceAcronym", DataType::String),
    ("ID", DataType::String),
    ("SignalID", DataType::Guid),
    ("PointTag", DataType::String),
    ("SignalReference", DataType::String),
    ("SignalAcronym", DataType::String),
    ("PhasorSourceIndex", DataType::Int32),
    ("Description", DataType::String),
    ("Internal", DataType::Boolean),
    ("Enabled", DataType::Boolean),
    ("UpdatedOn", DataType::DateTime),
];

pub(crate) const PHASOR_COLUMNS: &[(&str, DataType)] = &[
    ("DeviceAcronym", DataType::String),
    ("Label", DataType::String),
    ("Type", DataType::String),
    ("Phase", DataType::String),
    ("SourceIndex", DataType::Int32),
    ("UpdatedOn", DataType::DateTime),
];

/// One device (PMU, PDC, ...) row
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeviceMetadata {
    pub acronym: String,
    pub name: String,
    pub unique_id: Uuid,
    pub access_id: i32,
    pub parent_acronym: String,
    pub protocol_name: String,
    pub frames_per_second: i32,
    pub company_acronym: String,
    pub vendor_acronym: String,
    pub vendor_device_name: String,
    pub longitude: Option<Decimal>,
    pub latitude: Option<Decimal>,
    pub updated_on: Option<DateTime<Utc>>,
}

/// One measurement (signal) row
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementMetadata {
    pub device_acronym: String,
    /// Source-qualified point id, e.g. `PPA:12`
    pub id: String,
    pub signal_id: Uuid,
    pub point_tag: String,
    pub signal_reference: String,
    /// Signal kind acronym (FREQ, DFDT, VPHA, IPHM, ALOG, DIGI, QUAL, ...)
    pub signal_acronym: String,
    /// 1-based phasor index for phasor components, 0 otherwise
    pub phasor_source_index: i32,
    pub description: String,
    pub internal: bool,
    pub enabled: bool,
    pub updated_on: Option<DateTime<Utc>>,
}

impl Default for MeasurementMetadata {
    fn default() -> Self {
        Self {
            device_acronym: String::new(),
            id: String::new(),
            signal_id: Uuid::nil(),
            point_tag: String::new(),
            signal_reference: String::new(),
            signal_acronym: String::new(),
            phasor_source_index: 0,
            description: String::new(),
            internal: true,
            enabled: true,
            updated_on: None,
        }
    }
}

/// Kind of quantity a phasor measures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PhasorType {
    #[default]
    Voltage,
    Current,
}

impl PhasorType {
    /// Single-letter code used in the `Type` column
    pub fn code(self) -> &'static str {
        match self {
            Self::Voltage => "V",
            Self::Current => "I",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            c if c.eq_ignore_ascii_case("V") => Some(Self::Voltage),
            c if c.eq_ignore_ascii_case("I") => Some(Self::Current),
            _ => None,
        }
    }
}

/// One phasor row
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PhasorMetadata {
    pub device_acronym: String,
    pub label: String,
    pub phasor_type: PhasorType,
    /// Phase designation (`A`, `B`, `C`, `+`, `-`, `0`)
    pub phase: char,
    /// 1-based position within the device
    pub source_index: i32,
    pub updated_on: Option<DateTime<Utc>>,
}

/// Source-agnostic metadata, ready to be built into a `DataSet`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetadataRecords {
    pub devices: Vec<DeviceMetadata>,
    pub measurements: Vec<MeasurementMetadata>,
    pub phasors: Vec<PhasorMetadata>,
    /// Optional status-flags measurement, published in its own table
    pub quality_flags: Option<MeasurementMetadata>,
}

impl MetadataRecords {
    pub fn new(
        devices: Vec<DeviceMetadata>,
        measurements: Vec<MeasurementMetadata>,
        phasors: Vec<PhasorMetadata>,
    ) -> Self {
        Self {
            devices,
            measurements,
            phasors,
            quality_flags: None,
        }
    }

    /// Build the published container
    ///
    /// Table order: devices, measurements, phasors, quality flags (if any),
    /// schema version. Rows keep record order.
    pub fn build(&self) -> Result<DataSet> {
        let mut dataset = DataSet::new();

        let mut devices = schema_table(&dataset, DEVICE_TABLE, DEVICE_COLUMNS)?;
        for device in &self.devices {
            let row = device_row(&devices, device)?;
            devices.add_row(row)?;
        }
        dataset.add_table(devices)?;

        let mut measurements = schema_table(&dataset, MEASUREMENT_TABLE, MEASUREMENT_COLUMNS)?;
        for measurement in &self.measurements {
            let row = measurement_row(&measurements, measurement)?;
            measurements.add_row(row)?;
        }
        dataset.add_table(measurements)?;

        let mut phasors = schema_table(&dataset, PHASOR_TABLE, PHASOR_COLUMNS)?;
        for phasor in &self.phasors {
            let row = phasor_row(&phasors, phasor)?;
            phasors.add_row(row)?;
        }
        dataset.add_table(phasors)?;

        if let Some(flags) = &self.quality_flags {
            let mut table = schema_table(&dataset, QUALITY_FLAGS_TABLE, MEASUREMENT_COLUMNS)?;
            let row = measurement_row(&table, flags)?;
            table.add_row(row)?;
            dataset.add_table(table)?;
        }

        let mut version = dataset.create_table(SCHEMA_VERSION_TABLE);
        version.create_column("VersionNumber", DataType::Int32)?;
        let mut row = version.create_row();
        row.set(0, SCHEMA_VERSION)?;
        version.add_row(row)?;
        dataset.add_table(version)?;

        Ok(dataset)
    }
}

fn schema_table(dataset: &DataSet, name: &str, columns: &[(&str, DataType)]) -> Result<DataTable> {
    let mut table = dataset.create_table(name);
    for (column, data_type) in columns {
        table.create_column(*column, *data_type)?;
    }
    Ok(table)
}

fn device_row(table: &DataTable, device: &DeviceMetadata) -> Result<DataRow> {
    let mut row = table.create_row();
    row.set(0, device.acronym.as_str())?;
    row.set(1, device.name.as_str())?;
    row.set(2, device.unique_id)?;
    row.set(3, device.access_id)?;
    row.set(4, device.parent_acronym.as_str())?;
    row.set(5, device.protocol_name.as_str())?;
    row.set(6, device.frames_per_second)?;
    row.set(7, device.company_acronym.as_str())?;
    row.set(8, device.vendor_acronym.as_str())?;
    row.set(9, device.vendor_device_name.as_str())?;
    row.set(10, device.longitude.clone())?;
    row.set(11, device.latitude.clone())?;
    row.set(12, device.updated_on)?;
    Ok(row)
}

fn measurement_row(table: &DataTable, measurement: &MeasurementMetadata) -> Result<DataRow> {
    let mut row = table.create_row();
    row.set(0, measurement.device_acronym.as_str())?;
    row.set(1, measurement.id.as_str())?;
    row.set(2, measurement.signal_id)?;
    row.set(3, measurement.point_tag.as_str())?;
    row.set(4, measurement.signal_reference.as_str())?;
    row.set(5, measurement.signal_acronym.as_str())?;
    row.set(6, measurement.phasor_source_index)?;
    row.set(7, measurement.description.as_str())?;
    row.set(8, measurement.internal)?;
    row.set(9, measurement.enabled)?;
    row.set(10, measurement.updated_on)?;
    Ok(row)
}

fn phasor_row(table: &DataTable, phasor: &PhasorMetadata) -> Result<DataRow> {
    let mut row = table.create_row();
    row.set(0, phasor.device_acronym.as_str())?;
    row.set(1, phasor.label.as_str())?;
    row.set(2, phasor.phasor_type.code())?;
    row.set(3, Value::String(phasor.phase.to_string()))?;
    row.set(4, phasor.source_index)?;
    row.set(5, phasor.updated_on)?;
    Ok(row)
}
