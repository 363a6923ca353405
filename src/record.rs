//! Decoded report records
//!
//! A [`Record`] is one JSON object received from GPSD, tagged by its
//! mandatory "class" field. The payload is kept as a generic key-value map
//! so that classes this crate knows nothing about pass through unchanged.

use serde_json::{Map, Value};

use crate::{Result, error::GpsdClientError};

/// Report class as declared by the "class" field
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Class {
    /// Daemon version banner
    Version,
    /// List of devices known to the daemon
    Devices,
    /// Time-Position-Velocity fix
    Tpv,
    /// Satellite sky view
    Sky,
    /// Any other class, kept verbatim
    Other(String),
}

impl Class {
    pub fn as_str(&self) -> &str {
        match self {
            Class::Version => "VERSION",
            Class::Devices => "DEVICES",
            Class::Tpv => "TPV",
            Class::Sky => "SKY",
            Class::Other(name) => name.as_str(),
        }
    }
}

impl From<&str> for Class {
    fn from(name: &str) -> Self {
        match name {
            "VERSION" => Class::Version,
            "DEVICES" => Class::Devices,
            "TPV" => Class::Tpv,
            "SKY" => Class::Sky,
            other => Class::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for Class {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anything that carries a report class
pub trait Classed {
    fn class_name(&self) -> &str;
}

/// One decoded GPSD report
///
/// The "class" field is guaranteed present and stays in the field map.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    class: Class,
    fields: Map<String, Value>,
}

impl Record {
    /// Builds a record from a decoded JSON value
    ///
    /// Fails with `NotAnObject` for non-object values and `MissingClass`
    /// when there is no string "class" field.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(fields) = value else {
            return Err(GpsdClientError::NotAnObject);
        };
        let class = match fields.get("class") {
            Some(Value::String(name)) => Class::from(name.as_str()),
            _ => return Err(GpsdClientError::MissingClass),
        };

        Ok(Record { class, fields })
    }

    pub fn class(&self) -> &Class {
        &self.class
    }

    /// Looks up a field, returning `None` if it is absent
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Looks up a field that the caller requires
    ///
    /// An absent field is reported as `FieldLookup`, never defaulted.
    pub fn get(&self, key: &str) -> Result<&Value> {
        self.fields
            .get(key)
            .ok_or_else(|| GpsdClientError::field_lookup(self.class.as_str(), key))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn f64_field(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(Value::as_f64)
    }

    pub fn i64_field(&self, key: &str) -> Option<i64> {
        self.fields.get(key).and_then(Value::as_i64)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }

    /// Re-encodes the record as a single JSON line (without terminator)
    pub fn to_json_string(&self) -> String {
        Value::Object(self.fields.clone()).to_string()
    }
}

impl Classed for Record {
    fn class_name(&self) -> &str {
        self.class.as_str()
    }
}
