//! Log summaries
//!
//! Information most tools want from a log: parameters, firmware version,
//! start time and cumulative flight time.

use std::{
    collections::BTreeMap,
    time::Duration,
};

use chrono::{
    DateTime,
    Utc,
};
use serde::Serialize;

use crate::{
    log::Log,
    value::Column,
};

/// Parameter holding the cumulative flight time in seconds.
pub const FLIGHT_TIME_PARAMETER: &str = "STAT_FLTTIME";

/// Message logged after the boot banner.
const BANNER_END: &str = "Param space used:";

/// Vehicle names, as they appear in the firmware string, with their build
/// type.
const BUILD_TYPES: &[(&str, u64)] = &[
    ("ArduRover", 1),
    ("ArduCopter", 2),
    ("ArduPlane", 3),
    ("AntennaTracker", 4),
    ("ArduSub", 7),
    ("Blimp", 12),
];

pub fn vehicle_name(build_type: u64) -> Option<&'static str> {
    BUILD_TYPES
        .iter()
        .find(|(_, id)| *id == build_type)
        .map(|(name, _)| *name)
}

/// Firmware and board information.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    /// e.g. `ArduCopter V4.5.1 (e4d3b4f2)`
    pub fw_string: Option<String>,
    pub fw_hash: Option<String>,
    pub board_id: Option<u64>,
    pub build_type: Option<u64>,
    pub filter_version: Option<u64>,
    pub os_string: Option<String>,
    pub flight_controller: Option<String>,
}

impl VersionInfo {
    pub fn vehicle_name(&self) -> Option<&'static str> {
        self.build_type.and_then(vehicle_name)
    }
}

impl Log {
    /// All parameters from `PARM` records. If a parameter was logged more than
    /// once, the last value is used.
    pub fn parameters(&self) -> BTreeMap<String, f64> {
        let mut parameters = BTreeMap::new();
        if let Some((names, values)) = self.parameter_columns() {
            for (name, value) in names.iter().zip(values) {
                parameters.insert(name.clone(), value);
            }
        }
        parameters
    }

    /// Last logged value of a parameter.
    pub fn parameter(&self, name: &str) -> Option<f64> {
        let (names, values) = self.parameter_columns()?;
        names
            .iter()
            .zip(values)
            .filter(|(parameter, _)| *parameter == name)
            .map(|(_, value)| value)
            .last()
    }

    /// Flight time during this log, from the first and last logged value of
    /// `STAT_FLTTIME`.
    pub fn flight_time(&self) -> Option<Duration> {
        let (names, values) = self.parameter_columns()?;
        let mut flight_times = names
            .iter()
            .zip(values)
            .filter(|(name, _)| *name == FLIGHT_TIME_PARAMETER)
            .map(|(_, value)| value);

        let first = flight_times.next()?;
        let last = flight_times.last().unwrap_or(first);
        Duration::try_from_secs_f64(last - first).ok()
    }

    fn parameter_columns(&self) -> Option<(&[String], Vec<f64>)> {
        let table = self.table("PARM").ok()?;
        let names = table.column("Name")?.as_texts()?;
        let values = table.column("Value").and_then(Column::to_f64)?;
        Some((names, values))
    }

    /// Firmware version and board, from `VER` and the boot banner in `MSG`.
    pub fn version(&self) -> VersionInfo {
        let mut info = VersionInfo::default();

        if let Ok(ver) = self.table("VER") {
            let first_text = |field: &str| {
                ver.column(field)
                    .and_then(|column| column.get(0))
                    .and_then(|value| value.as_str().map(ToOwned::to_owned))
            };
            let first_uint = |field: &str| {
                ver.column(field)
                    .and_then(|column| column.get(0))
                    .and_then(|value| value.as_u64())
            };

            info.fw_string = first_text("FWS");
            info.fw_hash = first_uint("GH").map(|hash| format!("{hash:08x}"));
            info.board_id = first_uint("APJ").filter(|board_id| *board_id != 0);
            info.build_type = first_uint("BU");
            info.filter_version = first_uint("FV");
        }

        if let Some(messages) = self
            .table("MSG")
            .ok()
            .and_then(|table| table.column("Message"))
            .and_then(Column::as_texts)
        {
            scan_banner(messages, &mut info);
        }

        info
    }
}

/// Looks for the boot banner: firmware string, OS, flight controller and the
/// parameter space message.
fn scan_banner(messages: &[String], info: &mut VersionInfo) {
    for window in messages.windows(4) {
        let message = &window[0];

        if let Some(fw_string) = &info.fw_string {
            if fw_string != message {
                continue;
            }
        }

        if !window[3].starts_with(BANNER_END) {
            continue;
        }

        if info.fw_string.is_none() {
            let Some((fw_string, build_type, fw_hash)) = parse_firmware_string(message)
            else {
                continue;
            };
            info.fw_string = Some(fw_string.to_owned());
            info.build_type = Some(build_type);
            info.fw_hash = Some(fw_hash.to_owned());
        }

        info.os_string = Some(window[1].clone());
        info.flight_controller = Some(window[2].clone());
        break;
    }
}

/// Parses e.g. `ArduPlane V4.4.0 (a1b2c3d4)` into the firmware string, build
/// type and git hash.
fn parse_firmware_string(message: &str) -> Option<(&str, u64, &str)> {
    let (start, build_type) = BUILD_TYPES
        .iter()
        .filter_map(|(name, build_type)| message.find(name).map(|start| (start, *build_type)))
        .min_by_key(|(start, _)| *start)?;

    let end = message.rfind(')')?;
    let open = message[..end].rfind('(')?;
    if open <= start {
        return None;
    }
    let hash = &message[open + 1..end];
    if hash.is_empty() {
        return None;
    }

    Some((&message[start..=end], build_type, hash))
}

/// Overview of a log.
#[derive(Clone, Debug, Serialize)]
pub struct Summary {
    pub num_bytes: u64,
    pub num_records: u64,
    pub num_types: usize,
    pub start_time: Option<DateTime<Utc>>,
    pub flight_time: Option<Duration>,
    pub num_parameters: usize,
    pub version: VersionInfo,
}

impl Summary {
    pub fn from_log(log: &Log) -> Self {
        Self {
            num_bytes: log.diagnostics().num_bytes,
            num_records: log.diagnostics().num_records,
            num_types: log.available_types().count(),
            start_time: log.extract_start_time(),
            flight_time: log.flight_time(),
            num_parameters: log.parameters().len(),
            version: log.version(),
        }
    }
}
