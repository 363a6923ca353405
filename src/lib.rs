//! # gpsdclient
//!
//! A small client for the gpsd JSON protocol.
//!
//! gpsd publishes position, velocity and satellite data on TCP port 2947 as
//! newline-delimited JSON objects, each tagged with a "class". This crate opens
//! a session, enables watch mode, and turns the byte stream into lines, decoded
//! records, or classified reports with a few derived conveniences.
//!
//! ## Example
//!
//! ```no_run
//! use gpsdclient::classify::{ClassifyOptions, Report};
//! use gpsdclient::client::blocking::GpsdSession;
//! use gpsdclient::filter::ClassFilter;
//!
//! fn example() -> gpsdclient::Result<()> {
//!     let mut session = GpsdSession::open("127.0.0.1", 2947)?;
//!     let opts = ClassifyOptions::new().convert_datetime(true);
//!
//!     for report in session.filter(ClassFilter::new(["TPV"]), opts).take(10) {
//!         if let Report::Tpv(tpv) = report? {
//!             println!("{:?} {:?}", tpv.lat(), tpv.lon());
//!         }
//!     }
//!     Ok(())
//! }
//! ```

use crate::error::GpsdClientError;

/// Classification of records into typed reports
pub mod classify;

/// Session management for gpsd connections
pub mod client;

/// Error types used throughout the library
pub mod error;

/// Class-based filtering of report sequences
pub mod filter;

/// Line framing and per-line JSON decoding
pub mod framer;

/// Watch commands and shared protocol types
pub mod protocol;

/// Decoded records tagged by report class
pub mod record;

/// Text rendering used by the command line tool
pub mod render;

pub use record::Classed;

/// Convenience type alias for Results with GpsdClientError
pub type Result<T> = core::result::Result<T, GpsdClientError>;
