//! Error types for GPSD client operations
//!
//! This module defines the errors that can occur while connecting to GPSD,
//! framing its byte stream, decoding report lines, and reading fields out of
//! decoded records.

/// Main error type for GPSD client operations
///
/// Connection-time failures are returned from session-open. Transport and
/// decode failures end the record sequence they occur in. Field lookups and
/// timestamp conversion are local to a single record.
#[derive(Debug, thiserror::Error)]
pub enum GpsdClientError {
    /// Host name resolution produced no usable socket address
    #[error("could not resolve {host}:{port}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: Option<std::io::Error>,
    },

    /// The daemon endpoint is unreachable, refused the connection, or did
    /// not answer within the connect timeout
    #[error("could not connect to gpsd at {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Local resource limits (file descriptors) were exhausted at connect time
    #[error("out of local resources connecting to {addr}: {source}")]
    Environment {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// I/O error on an established connection
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    /// The daemon closed the connection
    #[error("connection closed by gpsd")]
    ConnectionClosed,

    /// The report sequence ended before yielding the report a caller waited for
    ///
    /// Session pulls themselves return `None` once the session has ended;
    /// this variant is for callers that need one more report than they got.
    #[error("session closed")]
    SessionClosed,

    /// A request could not be encoded as JSON
    #[error("could not encode request: {0}")]
    Encode(#[source] serde_json::Error),

    /// A line received from the daemon is not valid UTF-8
    #[error("report line is not valid UTF-8")]
    InvalidUtf8(#[source] std::string::FromUtf8Error),

    /// A line received from the daemon is not valid JSON
    #[error("invalid JSON report: {0}")]
    Decode(#[source] serde_json::Error),

    /// A line decoded to JSON that is not an object
    #[error("report is not a JSON object")]
    NotAnObject,

    /// A decoded object carries no string "class" field
    #[error("report has no \"class\" field")]
    MissingClass,

    /// A TPV "time" field could not be converted to a date-time
    #[error("invalid timestamp {value}")]
    InvalidTimestamp {
        value: String,
        #[source]
        source: Option<chrono::ParseError>,
    },

    /// A requested field is absent from a record and has no derivation
    #[error("{class} report has no field {field:?}")]
    FieldLookup { class: String, field: String },
}

impl GpsdClientError {
    /// Returns true if this error ends the session it was produced by
    ///
    /// Field lookups and timestamp conversion failures concern a single
    /// record; everything else leaves the stream in a state that cannot be
    /// resumed.
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            GpsdClientError::FieldLookup { .. } | GpsdClientError::InvalidTimestamp { .. }
        )
    }

    /// Returns true for errors raised while opening a connection
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            GpsdClientError::Resolve { .. }
                | GpsdClientError::Connect { .. }
                | GpsdClientError::Environment { .. }
        )
    }

    pub(crate) fn field_lookup(class: impl Into<String>, field: impl Into<String>) -> Self {
        GpsdClientError::FieldLookup {
            class: class.into(),
            field: field.into(),
        }
    }
}
