//! Metadata negotiation
//!
//! Three ingestion paths converge on `MetadataRecords`:
//!
//! ```text
//! Vec<DeviceMetadata> + Vec<MeasurementMetadata> + Vec<PhasorMetadata> ──┐
//! [ConfigurationFrame] + quality flags ── records_from_frames ───────────┼─► MetadataRecords::build ─► DataSet
//! MetadataDocument ── to_records ────────────────────────────────────────┘
//! ```
//!
//! `MetadataNegotiator` stores the resulting container and answers
//! subscriber requests from it.

mod document;
mod frames;
mod negotiator;
mod records;

pub use document::{DocumentRow, DocumentTable, MetadataDocument};
pub use frames::{
    ChannelDefinition, ConfigurationFrame, FRAME_PROTOCOL_NAME, PhasorDefinition,
    records_from_frames,
};
pub use negotiator::{MetadataNegotiator, MetadataResponse, filter_dataset};
pub use records::{
    DEVICE_TABLE, DeviceMetadata, MEASUREMENT_TABLE, MeasurementMetadata, MetadataRecords,
    PHASOR_TABLE, PhasorMetadata, PhasorType, QUALITY_FLAGS_TABLE, SCHEMA_VERSION,
    SCHEMA_VERSION_TABLE,
};
