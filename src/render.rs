//! Human-readable rendering of reports
//!
//! Used by the `gpsdclient` binary. Missing optional fields render as
//! [`NA`] instead of failing.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::{
    Result,
    classify::{Devices, Report, Tpv, Version},
};

/// Placeholder for absent values
pub const NA: &str = "n/a";

/// One column of the TPV table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub key: &'static str,
    pub width: usize,
}

pub const TPV_COLUMNS: [Column; 8] = [
    Column { key: "mode", width: 4 },
    Column { key: "time", width: 20 },
    Column { key: "lat", width: 12 },
    Column { key: "lon", width: 12 },
    Column { key: "track", width: 6 },
    Column { key: "speed", width: 6 },
    Column { key: "alt", width: 9 },
    Column { key: "climb", width: 9 },
];

/// Fields a SKY report may carry
pub const SKY_FIELDS: [&str; 12] = [
    "class",
    "device",
    "gdop",
    "hdop",
    "nSat",
    "pdop",
    "satellites",
    "tdop",
    "uSat",
    "vdop",
    "xdop",
    "ydop",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("field: {0} is not part of the SKY response.")]
pub struct UnknownSkyField(pub String);

/// Second precision, space separated, no zone suffix
pub fn format_timestamp(time: &DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Strings render bare, everything else as compact JSON
pub fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn version_line(version: &Version) -> String {
    format!("Connected to gpsd v{}", version.release().unwrap_or(NA))
}

pub fn devices_line(devices: &Devices) -> Result<String> {
    let paths: Vec<&str> = devices
        .paths()?
        .into_iter()
        .map(|path| path.unwrap_or(NA))
        .collect();
    Ok(format!("Devices: {}", paths.join(", ")))
}

/// Column titles and the separator rule beneath them
pub fn tpv_header() -> String {
    let titles: Vec<String> = TPV_COLUMNS
        .iter()
        .map(|col| pad(&title_case(col.key), col.width))
        .collect();
    let rules: Vec<String> = TPV_COLUMNS.iter().map(|col| "-".repeat(col.width)).collect();
    format!("{}\n{}", titles.join(" | "), rules.join("-+-"))
}

pub fn tpv_row(tpv: &Tpv) -> String {
    let cells: Vec<String> = TPV_COLUMNS
        .iter()
        .map(|col| pad(&tpv_cell(tpv, col.key), col.width))
        .collect();
    cells.join(" | ")
}

fn tpv_cell(tpv: &Tpv, key: &str) -> String {
    if key == "time" {
        if let Some(time) = tpv.time() {
            return format_timestamp(time);
        }
    }
    tpv.record()
        .field(key)
        .map(format_value)
        .unwrap_or_else(|| NA.to_string())
}

/// Splits a comma separated field list, rejecting names SKY never carries
pub fn parse_sky_fields(list: &str) -> std::result::Result<Vec<String>, UnknownSkyField> {
    list.split(',')
        .map(|field| {
            if SKY_FIELDS.contains(&field) {
                Ok(field.to_string())
            } else {
                Err(UnknownSkyField(field.to_string()))
            }
        })
        .collect()
}

/// Requested SKY values separated by single spaces
///
/// "nSat" and "uSat" fall back to their derivations; any other absent field
/// fails with `FieldLookup`.
pub fn sky_line<S: AsRef<str>>(report: &Report, fields: &[S]) -> Result<String> {
    let values = fields
        .iter()
        .map(|field| report.lookup(field.as_ref()).map(|value| format_value(&value)))
        .collect::<Result<Vec<_>>>()?;
    Ok(values.join(" "))
}

/// Stateful renderer for the readable stream
///
/// Re-emits the TPV header after every VERSION or DEVICES line so the
/// table stays readable when the daemon re-announces itself.
#[derive(Debug)]
pub struct ReadableRenderer {
    needs_tpv_header: bool,
}

impl Default for ReadableRenderer {
    fn default() -> Self {
        ReadableRenderer {
            needs_tpv_header: true,
        }
    }
}

impl ReadableRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Output lines for one report; other classes produce nothing
    pub fn render(&mut self, report: &Report) -> Result<Vec<String>> {
        let lines = match report {
            Report::Version(version) => {
                self.needs_tpv_header = true;
                vec![version_line(version)]
            }
            Report::Devices(devices) => {
                self.needs_tpv_header = true;
                vec![devices_line(devices)?]
            }
            Report::Tpv(tpv) => {
                let mut lines = Vec::with_capacity(3);
                if self.needs_tpv_header {
                    lines.push(String::new());
                    lines.push(tpv_header());
                    self.needs_tpv_header = false;
                }
                lines.push(tpv_row(tpv));
                lines
            }
            Report::Sky(_) | Report::Other(_) => Vec::new(),
        };
        Ok(lines)
    }
}

fn pad(text: &str, width: usize) -> String {
    format!("{text:<width$}")
}

fn title_case(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
