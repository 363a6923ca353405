use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_repr::Deserialize_repr;
use serde_with::skip_serializing_none;

/// * [gps_fix_t.mode](https://gitlab.com/gpsd/gpsd/-/blob/release-3.25/include/gps.h?ref_type=tags#L181)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize_repr)]
#[repr(i32)]
pub enum FixMode {
    NotSeen = 0,
    NoFix = 1,
    Fix2D = 2,
    Fix3D = 3,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    pub struct PropertyFlags: u32 {
        /// GPS data has been seen on this device
        const SEEN_GPS = 0x01;
        /// RTCM2 data has been seen on this device
        const SEEN_RTCM2 = 0x02;
        /// RTCM3 data has been seen on this device
        const SEEN_RTCM3 = 0x04;
        /// AIS data has been seen on this device
        const SEEN_AIS = 0x08;
    }
}

impl<'de> Deserialize<'de> for PropertyFlags {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bits = u32::deserialize(deserializer)?;
        Ok(PropertyFlags::from_bits_truncate(bits))
    }
}

/// One entry of a DEVICES report
///
/// Only the fields the client surfaces are typed; the full object stays
/// available on the record itself.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeviceSummary {
    pub path: Option<String>,
    pub driver: Option<String>,
    pub flags: Option<PropertyFlags>,
    #[serde(default, deserialize_with = "activated_time")]
    pub activated: Option<DateTime<Utc>>,
}

/// # Watch Policy
/// - [json_watch_read](https://gitlab.com/gpsd/gpsd/-/blob/master/libgps/shared_json.c#L95)
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Watch {
    pub device: Option<String>,
    pub enable: Option<bool>,
    pub json: Option<bool>,
    pub nmea: Option<bool>,
    pub pps: Option<bool>,
    pub scaled: Option<bool>,
    pub timing: Option<bool>,
}

impl Watch {
    /// Watch policy that enables streaming of JSON reports
    pub fn json() -> Self {
        Watch {
            enable: Some(true),
            json: Some(true),
            ..Default::default()
        }
    }

    /// Restricts reporting to a single device path
    pub fn device<S: AsRef<str>>(mut self, device: S) -> Self {
        self.device = Some(device.as_ref().into());
        self
    }

    /// Enables or disables PPS messages
    pub fn pps(mut self, enable: bool) -> Self {
        self.pps = Some(enable);
        self
    }

    /// Enables or disables scaled output
    pub fn scaled(mut self, enable: bool) -> Self {
        self.scaled = Some(enable);
        self
    }

    /// Enables or disables timing information on reports
    pub fn timing(mut self, enable: bool) -> Self {
        self.timing = Some(enable);
        self
    }
}

/// "activated" is an ISO 8601 string on current daemons and a Unix
/// timestamp on older ones.
fn activated_time<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::String(iso_time)) => Ok(DateTime::parse_from_rfc3339(&iso_time)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))),
        Some(serde_json::Value::Number(unix_time)) => Ok(unix_time.as_f64().and_then(|secs| {
            DateTime::<Utc>::from_timestamp(secs.trunc() as i64, (secs.fract() * 1e9) as u32)
        })),
        Some(serde_json::Value::Null) | None => Ok(None),
        Some(_) => Err(serde::de::Error::custom(
            "Invalid type for 'activated' field",
        )),
    }
}
