//! Metadata from device configuration frames
//!
//! A configuration frame describes one device the way a PMU announces
//! itself: its identity, its frame rate and the channels it streams. Each
//! channel carries the signal id it is published under. Conversion produces
//! one device row, one measurement row per signal and one phasor row per
//! phasor, in a fixed order:
//!
//! 1. frequency (`FREQ`, reference suffix `FQ`)
//! 2. frequency delta (`DFDT`, `DF`)
//! 3. per phasor: angle (`VPHA`/`IPHA`, `PA{n}`) then magnitude (`VPHM`/`IPHM`, `PM{n}`)
//! 4. analogs (`ALOG`, `AV{n}`)
//! 5. digitals (`DIGI`, `DV{n}`)

use uuid::Uuid;

use super::records::{
    DeviceMetadata, MeasurementMetadata, MetadataRecords, PhasorMetadata, PhasorType,
};

/// Protocol name recorded for devices defined from configuration frames
pub const FRAME_PROTOCOL_NAME: &str = "ConfigurationFrame";

/// One phasor channel
#[derive(Debug, Clone, PartialEq)]
pub struct PhasorDefinition {
    pub label: String,
    pub phasor_type: PhasorType,
    pub phase: char,
    pub angle_signal_id: Uuid,
    pub magnitude_signal_id: Uuid,
}

/// One analog or digital channel
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelDefinition {
    pub label: String,
    pub signal_id: Uuid,
}

/// Device configuration frame
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigurationFrame {
    pub acronym: String,
    pub name: String,
    pub unique_id: Uuid,
    pub id_code: u16,
    pub frames_per_second: u16,
    pub frequency_signal_id: Uuid,
    pub dfdt_signal_id: Uuid,
    pub phasors: Vec<PhasorDefinition>,
    pub analogs: Vec<ChannelDefinition>,
    pub digitals: Vec<ChannelDefinition>,
}

impl ConfigurationFrame {
    fn device(&self) -> DeviceMetadata {
        DeviceMetadata {
            acronym: self.acronym.clone(),
            name: self.name.clone(),
            unique_id: self.unique_id,
            access_id: i32::from(self.id_code),
            protocol_name: FRAME_PROTOCOL_NAME.to_string(),
            frames_per_second: i32::from(self.frames_per_second),
            ..DeviceMetadata::default()
        }
    }

    fn measurement(
        &self,
        point: usize,
        signal_id: Uuid,
        signal_acronym: &str,
        suffix: &str,
        phasor_source_index: i32,
        description: &str,
    ) -> MeasurementMetadata {
        MeasurementMetadata {
            device_acronym: self.acronym.clone(),
            id: format!("{}:{}", self.acronym, point),
            signal_id,
            point_tag: format!("{}:{}", self.acronym, suffix),
            signal_reference: format!("{}-{}", self.acronym, suffix),
            signal_acronym: signal_acronym.to_string(),
            phasor_source_index,
            description: description.to_string(),
            ..MeasurementMetadata::default()
        }
    }

    fn append_to(&self, records: &mut MetadataRecords) {
        records.devices.push(self.device());

        let mut point = 0;
        let mut next = || {
            point += 1;
            point
        };

        records.measurements.push(self.measurement(
            next(),
            self.frequency_signal_id,
            "FREQ",
            "FQ",
            0,
            "Frequency",
        ));
        records.measurements.push(self.measurement(
            next(),
            self.dfdt_signal_id,
            "DFDT",
            "DF",
            0,
            "Frequency delta (dF/dt)",
        ));

        for (i, phasor) in self.phasors.iter().enumerate() {
            let index = i as i32 + 1;
            let prefix = phasor.phasor_type.code();
            records.measurements.push(self.measurement(
                next(),
                phasor.angle_signal_id,
                &format!("{prefix}PHA"),
                &format!("PA{index}"),
                index,
                &format!("{} angle", phasor.label),
            ));
            records.measurements.push(self.measurement(
                next(),
                phasor.magnitude_signal_id,
                &format!("{prefix}PHM"),
                &format!("PM{index}"),
                index,
                &format!("{} magnitude", phasor.label),
            ));
            records.phasors.push(PhasorMetadata {
                device_acronym: self.acronym.clone(),
                label: phasor.label.clone(),
                phasor_type: phasor.phasor_type,
                phase: phasor.phase,
                source_index: index,
                updated_on: None,
            });
        }

        for (i, analog) in self.analogs.iter().enumerate() {
            records.measurements.push(self.measurement(
                next(),
                analog.signal_id,
                "ALOG",
                &format!("AV{}", i + 1),
                0,
                &analog.label,
            ));
        }

        for (i, digital) in self.digitals.iter().enumerate() {
            records.measurements.push(self.measurement(
                next(),
                digital.signal_id,
                "DIGI",
                &format!("DV{}", i + 1),
                0,
                &digital.label,
            ));
        }
    }
}

/// Convert configuration frames (plus an optional quality-flags measurement)
/// into metadata records
pub fn records_from_frames(
    frames: &[ConfigurationFrame],
    quality_flags: Option<MeasurementMetadata>,
) -> MetadataRecords {
    let mut records = MetadataRecords::default();
    for frame in frames {
        frame.append_to(&mut records);
    }
    records.quality_flags = quality_flags;
    records
}
