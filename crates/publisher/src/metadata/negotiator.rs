//! Metadata negotiation
//!
//! The negotiator owns the published container and answers subscriber
//! metadata requests from it. The container is replaced whole on every
//! redefinition, so a response is always built from one consistent version.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use arc_swap::ArcSwapOption;
use bytes::Bytes;
use tracing::debug;
use tsp_dataset::{DataSet, DataTable, Value};
use uuid::Uuid;

use super::records::{
    DEVICE_TABLE, MEASUREMENT_TABLE, MetadataRecords, PHASOR_TABLE, QUALITY_FLAGS_TABLE,
};
use crate::error::{PublisherError, Result};

/// Serialized metadata ready to send
#[derive(Debug, Clone)]
pub struct MetadataResponse {
    pub payload: Bytes,
    pub compressed: bool,
    /// Measurement rows included
    pub measurement_count: usize,
}

/// Holds the current metadata and answers requests for it
#[derive(Debug)]
pub struct MetadataNegotiator {
    current: ArcSwapOption<DataSet>,
    refresh_allowed: AtomicBool,
    /// Bumped on every redefinition
    version: AtomicU64,
}

impl MetadataNegotiator {
    pub fn new(refresh_allowed: bool) -> Self {
        Self {
            current: ArcSwapOption::empty(),
            refresh_allowed: AtomicBool::new(refresh_allowed),
            version: AtomicU64::new(0),
        }
    }

    /// Build and publish a new container from records
    pub fn define(&self, records: &MetadataRecords) -> Result<Arc<DataSet>> {
        let dataset = Arc::new(records.build()?);
        self.current.store(Some(Arc::clone(&dataset)));
        let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(
            version,
            devices = records.devices.len(),
            measurements = records.measurements.len(),
            phasors = records.phasors.len(),
            "metadata defined"
        );
        Ok(dataset)
    }

    /// Current container, if metadata has been defined
    pub fn current(&self) -> Option<Arc<DataSet>> {
        self.current.load_full()
    }

    /// Whether metadata has been defined
    pub fn is_defined(&self) -> bool {
        self.current.load().is_some()
    }

    /// Number of redefinitions so far
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub fn refresh_allowed(&self) -> bool {
        self.refresh_allowed.load(Ordering::Relaxed)
    }

    pub fn set_refresh_allowed(&self, allowed: bool) {
        self.refresh_allowed.store(allowed, Ordering::Relaxed);
    }

    /// Answer a metadata request
    ///
    /// A `signal_filter` restricts the response to those measurements and the
    /// devices and phasors they belong to. Fails with `ConfigurationDenied`
    /// when refresh is disabled and `NotFound` before any metadata exists;
    /// never answers with a silently empty container.
    pub fn respond(&self, signal_filter: Option<&[Uuid]>, compress: bool) -> Result<MetadataResponse> {
        if !self.refresh_allowed() {
            return Err(PublisherError::denied("metadata refresh is disabled"));
        }

        let dataset = self.current().ok_or_else(|| PublisherError::NotFound {
            kind: "metadata",
            name: "no metadata has been defined".into(),
        })?;

        let filtered;
        let view: &DataSet = match signal_filter {
            Some(ids) => {
                filtered = filter_dataset(&dataset, ids)?;
                &filtered
            }
            None => &dataset,
        };

        let measurement_count = view.table(MEASUREMENT_TABLE)?.row_count();
        let payload = if compress {
            view.encode_compressed()?
        } else {
            view.encode()?
        };

        Ok(MetadataResponse {
            payload,
            compressed: compress,
            measurement_count,
        })
    }
}

/// Restrict a container to the given signals
///
/// Keeps measurement rows whose `SignalID` is listed, the devices they name,
/// the phasors they are components of, and the quality-flags row if listed.
/// Tables and columns are kept even when all their rows are filtered out.
pub fn filter_dataset(dataset: &DataSet, signal_ids: &[Uuid]) -> Result<DataSet> {
    let wanted: HashSet<Uuid> = signal_ids.iter().copied().collect();
    let mut filtered = dataset.clone();

    let mut devices = HashSet::new();
    let mut phasors = HashSet::new();
    {
        let measurements = filtered.table_mut(MEASUREMENT_TABLE)?;
        let signal = ordinal(measurements, "SignalID")?;
        let device = ordinal(measurements, "DeviceAcronym")?;
        let phasor = ordinal(measurements, "PhasorSourceIndex")?;

        measurements.retain_rows(|row| {
            let keep = guid_at(row.values(), signal).is_some_and(|id| wanted.contains(&id));
            if keep {
                let acronym = text_at(row.values(), device);
                if let Some(index) = row.values().get(phasor).and_then(Value::as_i64)
                    && index > 0
                {
                    phasors.insert((acronym.clone(), index));
                }
                devices.insert(acronym);
            }
            keep
        });
    }

    {
        let table = filtered.table_mut(PHASOR_TABLE)?;
        let device = ordinal(table, "DeviceAcronym")?;
        let index = ordinal(table, "SourceIndex")?;
        table.retain_rows(|row| {
            let key = (
                text_at(row.values(), device),
                row.values().get(index).and_then(Value::as_i64).unwrap_or(0),
            );
            phasors.contains(&key)
        });
    }

    {
        let table = filtered.table_mut(DEVICE_TABLE)?;
        let acronym = ordinal(table, "Acronym")?;
        table.retain_rows(|row| devices.contains(&text_at(row.values(), acronym)));
    }

    if filtered.find_table(QUALITY_FLAGS_TABLE, false).is_some() {
        let table = filtered.table_mut(QUALITY_FLAGS_TABLE)?;
        let signal = ordinal(table, "SignalID")?;
        table.retain_rows(|row| guid_at(row.values(), signal).is_some_and(|id| wanted.contains(&id)));
    }

    Ok(filtered)
}

fn ordinal(table: &DataTable, column: &str) -> Result<usize> {
    Ok(table.column(column)?.ordinal())
}

fn guid_at(values: &[Value], ordinal: usize) -> Option<Uuid> {
    values.get(ordinal).and_then(Value::as_guid)
}

// Acronyms compare case-insensitively
fn text_at(values: &[Value], ordinal: usize) -> String {
    values
        .get(ordinal)
        .and_then(Value::as_str)
        .map(str::to_ascii_uppercase)
        .unwrap_or_default()
}
