//! Per-class normalization of decoded records
//!
//! Generic decoding yields a [`Record`]. Classification wraps it in a
//! [`Report`] variant for the classes the client knows (VERSION, DEVICES,
//! TPV, SKY) and applies the class-specific normalizations:
//!
//! - TPV: the ISO 8601 "time" field is converted to `DateTime<Utc>` when
//!   [`ClassifyOptions::convert_datetime`] is set.
//! - SKY: "nSat" and "uSat" are missing from older daemons and are derived
//!   from the "satellites" list.
//!
//! Every other class passes through untouched as [`Report::Other`].

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::{
    Result,
    error::GpsdClientError,
    protocol::types::{DeviceSummary, FixMode},
    record::{Class, Classed, Record},
};

/// Options controlling record normalization
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassifyOptions {
    /// Parse TPV "time" fields into `DateTime<Utc>`
    pub convert_datetime: bool,
}

impl ClassifyOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables TPV timestamp conversion
    pub fn convert_datetime(mut self, enable: bool) -> Self {
        self.convert_datetime = enable;
        self
    }
}

/// A field value that is either reported by the daemon or derived from
/// other fields of the same record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Derived<T> {
    /// Present in the record as sent
    Reported(T),
    /// Absent from the record, computed from other fields
    Computed(T),
    /// Absent and not derivable
    Absent,
}

impl<T: Copy> Derived<T> {
    pub fn value(&self) -> Option<T> {
        match self {
            Derived::Reported(v) | Derived::Computed(v) => Some(*v),
            Derived::Absent => None,
        }
    }

    pub fn is_computed(&self) -> bool {
        matches!(self, Derived::Computed(_))
    }
}

/// A classified GPSD report
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    /// Daemon version banner
    Version(Version),
    /// Device list
    Devices(Devices),
    /// Time-Position-Velocity fix
    Tpv(Tpv),
    /// Satellite sky view
    Sky(Sky),
    /// Any other class, unmodified
    Other(Record),
}

impl Report {
    /// The underlying decoded record
    pub fn record(&self) -> &Record {
        match self {
            Report::Version(v) => &v.record,
            Report::Devices(d) => &d.record,
            Report::Tpv(t) => &t.record,
            Report::Sky(s) => &s.record,
            Report::Other(r) => r,
        }
    }

    pub fn into_record(self) -> Record {
        match self {
            Report::Version(v) => v.record,
            Report::Devices(d) => d.record,
            Report::Tpv(t) => t.record,
            Report::Sky(s) => s.record,
            Report::Other(r) => r,
        }
    }

    pub fn class(&self) -> &Class {
        self.record().class()
    }

    /// Looks up a field by name, consulting the derivation table for
    /// fields that older daemons omit
    ///
    /// Absent fields without a derivation fail with `FieldLookup`.
    pub fn lookup(&self, field: &str) -> Result<Value> {
        if let Report::Sky(sky) = self {
            if let Some(derived) = sky.derived(field) {
                return derived
                    .value()
                    .map(Value::from)
                    .ok_or_else(|| GpsdClientError::field_lookup("SKY", field));
            }
        }
        self.record().get(field).cloned()
    }
}

impl Classed for Report {
    fn class_name(&self) -> &str {
        self.record().class_name()
    }
}

/// Wraps a decoded record in its class-specific report type
pub fn classify(record: Record, opts: &ClassifyOptions) -> Result<Report> {
    let class = record.class().clone();
    let report = match class {
        Class::Version => Report::Version(Version { record }),
        Class::Devices => Report::Devices(Devices { record }),
        Class::Tpv => Report::Tpv(Tpv::from_record(record, opts)?),
        Class::Sky => Report::Sky(Sky::from_record(record)),
        Class::Other(_) => Report::Other(record),
    };
    Ok(report)
}

/// GPSD daemon version banner
#[derive(Debug, Clone, PartialEq)]
pub struct Version {
    record: Record,
}

impl Version {
    /// GPSD release version string
    pub fn release(&self) -> Option<&str> {
        self.record.str_field("release")
    }

    /// Git revision
    pub fn rev(&self) -> Option<&str> {
        self.record.str_field("rev")
    }

    pub fn proto_major(&self) -> Option<i64> {
        self.record.i64_field("proto_major")
    }

    pub fn proto_minor(&self) -> Option<i64> {
        self.record.i64_field("proto_minor")
    }

    pub fn record(&self) -> &Record {
        &self.record
    }
}

/// List of devices known to GPSD
#[derive(Debug, Clone, PartialEq)]
pub struct Devices {
    record: Record,
}

impl Devices {
    /// Path of every listed device, `None` for entries without one
    ///
    /// Fails with `FieldLookup` if the report has no "devices" list.
    pub fn paths(&self) -> Result<Vec<Option<&str>>> {
        let devices = self.device_entries()?;
        Ok(devices
            .iter()
            .map(|device| device.get("path").and_then(Value::as_str))
            .collect())
    }

    /// Typed summary of every listed device
    pub fn summaries(&self) -> Result<Vec<DeviceSummary>> {
        self.device_entries()?
            .iter()
            .map(|device| {
                DeviceSummary::deserialize(device).map_err(GpsdClientError::Decode)
            })
            .collect()
    }

    fn device_entries(&self) -> Result<&Vec<Value>> {
        self.record
            .get("devices")?
            .as_array()
            .ok_or_else(|| GpsdClientError::field_lookup("DEVICES", "devices"))
    }

    pub fn record(&self) -> &Record {
        &self.record
    }
}

/// Time-Position-Velocity fix
#[derive(Debug, Clone, PartialEq)]
pub struct Tpv {
    record: Record,
    time: Option<DateTime<Utc>>,
}

impl Tpv {
    fn from_record(record: Record, opts: &ClassifyOptions) -> Result<Self> {
        let time = match (opts.convert_datetime, record.field("time")) {
            (true, Some(value)) => Some(parse_time(value)?),
            _ => None,
        };
        Ok(Tpv { record, time })
    }

    /// Fix mode, `None` if absent or out of range
    pub fn mode(&self) -> Option<FixMode> {
        self.record
            .field("mode")
            .and_then(|v| FixMode::deserialize(v).ok())
    }

    /// Converted fix time
    ///
    /// Only populated when the report was classified with
    /// `convert_datetime`; see [`Tpv::time_str`] for the raw value.
    pub fn time(&self) -> Option<&DateTime<Utc>> {
        self.time.as_ref()
    }

    /// "time" exactly as sent by the daemon
    pub fn time_str(&self) -> Option<&str> {
        self.record.str_field("time")
    }

    /// Latitude in degrees (positive = North)
    pub fn lat(&self) -> Option<f64> {
        self.record.f64_field("lat")
    }

    /// Longitude in degrees (positive = East)
    pub fn lon(&self) -> Option<f64> {
        self.record.f64_field("lon")
    }

    /// Altitude in meters
    pub fn alt(&self) -> Option<f64> {
        self.record.f64_field("alt")
    }

    /// Course over ground in degrees from true north
    pub fn track(&self) -> Option<f64> {
        self.record.f64_field("track")
    }

    /// Speed over ground in meters per second
    pub fn speed(&self) -> Option<f64> {
        self.record.f64_field("speed")
    }

    /// Climb or sink rate in meters per second
    pub fn climb(&self) -> Option<f64> {
        self.record.f64_field("climb")
    }

    pub fn record(&self) -> &Record {
        &self.record
    }
}

/// Satellite sky view
///
/// "nSat" and "uSat" are resolved once at classification time.
#[derive(Debug, Clone, PartialEq)]
pub struct Sky {
    record: Record,
    satellite_count: Derived<u64>,
    used_count: Derived<u64>,
}

type Derivation = fn(&Record) -> Option<u64>;

/// Fields older daemons omit from SKY and how to compute them
const SKY_DERIVATIONS: [(&str, Derivation); 2] =
    [("nSat", count_satellites), ("uSat", count_used_satellites)];

impl Sky {
    fn from_record(record: Record) -> Self {
        let [satellite_count, used_count] =
            SKY_DERIVATIONS.map(|(field, derivation)| derive(&record, field, derivation));
        Sky {
            record,
            satellite_count,
            used_count,
        }
    }

    /// Number of satellites in view ("nSat")
    ///
    /// Fails with `FieldLookup` if neither "nSat" nor "satellites" is present.
    pub fn satellite_count(&self) -> Result<u64> {
        self.satellite_count
            .value()
            .ok_or_else(|| GpsdClientError::field_lookup("SKY", "nSat"))
    }

    /// Number of satellites used in the solution ("uSat")
    pub fn used_count(&self) -> Result<u64> {
        self.used_count
            .value()
            .ok_or_else(|| GpsdClientError::field_lookup("SKY", "uSat"))
    }

    /// Resolution of a derivable field, `None` if `field` has no derivation
    pub fn derived(&self, field: &str) -> Option<Derived<u64>> {
        match field {
            "nSat" => Some(self.satellite_count),
            "uSat" => Some(self.used_count),
            _ => None,
        }
    }

    pub fn satellites(&self) -> Option<&Vec<Value>> {
        self.record.field("satellites").and_then(Value::as_array)
    }

    /// Horizontal dilution of precision
    pub fn hdop(&self) -> Option<f64> {
        self.record.f64_field("hdop")
    }

    /// Vertical dilution of precision
    pub fn vdop(&self) -> Option<f64> {
        self.record.f64_field("vdop")
    }

    /// Position (spherical) dilution of precision
    pub fn pdop(&self) -> Option<f64> {
        self.record.f64_field("pdop")
    }

    pub fn record(&self) -> &Record {
        &self.record
    }
}

fn derive(record: &Record, field: &str, derivation: Derivation) -> Derived<u64> {
    if let Some(value) = record.field(field).and_then(Value::as_u64) {
        return Derived::Reported(value);
    }
    match derivation(record) {
        Some(value) => Derived::Computed(value),
        None => Derived::Absent,
    }
}

fn count_satellites(record: &Record) -> Option<u64> {
    let satellites = record.field("satellites")?.as_array()?;
    Some(satellites.len() as u64)
}

/// Counts entries flagged "used"; an entry without the flag makes the
/// count underivable.
fn count_used_satellites(record: &Record) -> Option<u64> {
    let satellites = record.field("satellites")?.as_array()?;
    satellites.iter().try_fold(0u64, |used, sat| {
        let flag = sat.get("used")?.as_bool()?;
        Some(used + u64::from(flag))
    })
}

/// ISO 8601 on current daemons, fractional Unix seconds on very old ones
fn parse_time(value: &Value) -> Result<DateTime<Utc>> {
    match value {
        Value::String(iso_time) => DateTime::parse_from_rfc3339(iso_time)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|err| GpsdClientError::InvalidTimestamp {
                value: iso_time.clone(),
                source: Some(err),
            }),
        Value::Number(unix_time) => unix_time
            .as_f64()
            .and_then(|secs| {
                DateTime::<Utc>::from_timestamp(secs.trunc() as i64, (secs.fract() * 1e9) as u32)
            })
            .ok_or_else(|| GpsdClientError::InvalidTimestamp {
                value: unix_time.to_string(),
                source: None,
            }),
        other => Err(GpsdClientError::InvalidTimestamp {
            value: other.to_string(),
            source: None,
        }),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn report(value: Value, opts: ClassifyOptions) -> Report {
        classify(Record::from_value(value).unwrap(), &opts).unwrap()
    }

    fn sky(value: Value) -> Sky {
        match report(value, ClassifyOptions::new()) {
            Report::Sky(sky) => sky,
            other => panic!("expected SKY, got {other:?}"),
        }
    }

    #[test]
    fn sky_counts_are_derived_when_missing() {
        let sky = sky(json!({
            "class": "SKY",
            "satellites": [{"used": true}, {"used": false}, {"used": true}]
        }));

        assert_eq!(sky.satellite_count().unwrap(), 3);
        assert_eq!(sky.used_count().unwrap(), 2);
        assert!(sky.derived("nSat").unwrap().is_computed());
    }

    #[test]
    fn sky_counts_prefer_reported_values() {
        let sky = sky(json!({
            "class": "SKY",
            "nSat": 12,
            "uSat": 7,
            "satellites": [{"used": true}]
        }));

        assert_eq!(sky.derived("nSat"), Some(Derived::Reported(12)));
        assert_eq!(sky.used_count().unwrap(), 7);
    }

    #[test]
    fn sky_without_satellites_is_a_lookup_failure() {
        let sky = sky(json!({"class": "SKY", "hdop": 0.9}));

        let err = sky.satellite_count().unwrap_err();
        assert!(matches!(
            err,
            GpsdClientError::FieldLookup { ref field, .. } if field == "nSat"
        ));
        assert!(sky.used_count().is_err());
        assert_eq!(sky.hdop(), Some(0.9));
    }

    #[test]
    fn used_count_needs_every_used_flag() {
        let sky = sky(json!({
            "class": "SKY",
            "satellites": [{"used": true}, {"PRN": 4}]
        }));
        assert_eq!(sky.satellite_count().unwrap(), 2);
        assert_eq!(sky.derived("uSat"), Some(Derived::Absent));
    }

    #[test]
    fn lookup_uses_derivations_then_raw_fields() {
        let report = report(
            json!({"class": "SKY", "satellites": [{"used": false}], "vdop": 1.2}),
            ClassifyOptions::new(),
        );

        assert_eq!(report.lookup("nSat").unwrap(), json!(1));
        assert_eq!(report.lookup("uSat").unwrap(), json!(0));
        assert_eq!(report.lookup("vdop").unwrap(), json!(1.2));
        assert!(matches!(
            report.lookup("gdop"),
            Err(GpsdClientError::FieldLookup { .. })
        ));
    }

    #[test]
    fn tpv_time_is_converted_on_request() {
        let value = json!({"class": "TPV", "mode": 3, "time": "2024-01-01T00:00:00Z"});

        let opts = ClassifyOptions::new().convert_datetime(true);
        let Report::Tpv(converted) = report(value.clone(), opts) else {
            panic!("expected TPV");
        };
        let expected = DateTime::parse_from_rfc3339("2024-01-01T00:00:00+00:00").unwrap();
        assert_eq!(converted.time(), Some(&expected.with_timezone(&Utc)));
        assert_eq!(converted.mode(), Some(FixMode::Fix3D));

        let Report::Tpv(raw) = report(value, ClassifyOptions::new()) else {
            panic!("expected TPV");
        };
        assert_eq!(raw.time(), None);
        assert_eq!(raw.time_str(), Some("2024-01-01T00:00:00Z"));
    }

    #[test]
    fn tpv_keeps_subsecond_precision() {
        let Report::Tpv(tpv) = report(
            json!({"class": "TPV", "time": "2024-05-06T07:08:09.250Z"}),
            ClassifyOptions::new().convert_datetime(true),
        ) else {
            panic!("expected TPV");
        };
        assert_eq!(tpv.time().unwrap().timestamp_subsec_millis(), 250);
    }

    #[test]
    fn tpv_without_time_is_fine() {
        let Report::Tpv(tpv) = report(
            json!({"class": "TPV", "mode": 1}),
            ClassifyOptions::new().convert_datetime(true),
        ) else {
            panic!("expected TPV");
        };
        assert_eq!(tpv.time(), None);
        assert_eq!(tpv.lat(), None);
    }

    #[test]
    fn invalid_tpv_time_is_record_local() {
        let record = Record::from_value(json!({"class": "TPV", "time": "yesterday"})).unwrap();
        let err = classify(record, &ClassifyOptions::new().convert_datetime(true)).unwrap_err();
        assert!(matches!(err, GpsdClientError::InvalidTimestamp { .. }));
        assert!(!err.is_terminal());
    }

    #[test]
    fn unknown_classes_pass_through_unchanged() {
        let value = json!({"class": "GST", "rms": 2.5, "nested": {"a": [1, 2]}});
        let record = Record::from_value(value.clone()).unwrap();

        let opts = ClassifyOptions::new().convert_datetime(true);
        let report = classify(record.clone(), &opts).unwrap();
        assert_eq!(report, Report::Other(record));
        assert_eq!(serde_json::Value::Object(report.into_record().into_fields()), value);
    }

    #[test]
    fn devices_paths_and_summaries() {
        let Report::Devices(devices) = report(
            json!({"class": "DEVICES", "devices": [
                {"path": "/dev/ttyUSB0", "driver": "u-blox", "flags": 1},
                {"driver": "NMEA0183"}
            ]}),
            ClassifyOptions::new(),
        ) else {
            panic!("expected DEVICES");
        };

        assert_eq!(devices.paths().unwrap(), vec![Some("/dev/ttyUSB0"), None]);
        let summaries = devices.summaries().unwrap();
        assert_eq!(summaries[0].driver.as_deref(), Some("u-blox"));
        assert_eq!(summaries[1].path, None);
    }

    #[test]
    fn version_accessors() {
        let Report::Version(version) = report(
            json!({
                "class": "VERSION",
                "release": "3.25",
                "rev": "3.25",
                "proto_major": 3,
                "proto_minor": 15
            }),
            ClassifyOptions::new(),
        ) else {
            panic!("expected VERSION");
        };
        assert_eq!(version.release(), Some("3.25"));
        assert_eq!(version.proto_major(), Some(3));
        assert_eq!(version.proto_minor(), Some(15));
    }
}
