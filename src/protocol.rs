//! GPSD JSON protocol commands
//!
//! Commands start with '?' and end with ';'. Responses are newline-delimited
//! JSON objects with a "class" field indicating the report type.
//!
//! The streaming client sends exactly one command per session: a `?WATCH`
//! that enables reporting and selects JSON output.
//!
//! # References
//! - [GPSD Protocol Documentation](https://gpsd.io/gpsd_json.html)

use crate::{Result, error::GpsdClientError};

/// Common data types used in protocol messages
pub mod types;

pub use types::Watch;

/// Default TCP port GPSD listens on
pub const DEFAULT_PORT: u16 = 2947;

/// Default host for a local GPSD instance
pub const DEFAULT_HOST: &str = "127.0.0.1";

pub trait GpsdJsonRequest {
    fn to_command(&self) -> Result<String>;
}

pub trait GpsdJsonEncode: std::io::Write {
    fn write_request(&mut self, request: &impl GpsdJsonRequest) -> Result<()> {
        let cmd = request.to_command()?;
        self.write_all(cmd.as_bytes())
            .and_then(|_| self.flush())
            .map_err(GpsdClientError::Io)
    }
}

impl<W: std::io::Write + ?Sized> GpsdJsonEncode for W {}

pub trait GpsdJsonEncodeAsync: futures_io::AsyncWrite + Unpin {
    fn write_request(
        &mut self,
        request: &impl GpsdJsonRequest,
    ) -> impl std::future::Future<Output = Result<()>> {
        async move {
            use futures_util::AsyncWriteExt;

            let cmd = request.to_command()?;
            self.write_all(cmd.as_bytes())
                .await
                .map_err(GpsdClientError::Io)?;
            self.flush().await.map_err(GpsdClientError::Io)
        }
    }
}

impl<W: futures_io::AsyncWrite + Unpin + ?Sized> GpsdJsonEncodeAsync for W {}

/// Client-to-daemon commands
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `?WATCH;` or `?WATCH={...};`
    Watch(Option<Watch>),
}

impl GpsdJsonRequest for Command {
    fn to_command(&self) -> Result<String> {
        match self {
            Command::Watch(Some(watch)) => {
                let params = serde_json::to_string(watch).map_err(GpsdClientError::Encode)?;
                Ok(format!("?WATCH={params};"))
            }
            Command::Watch(None) => Ok("?WATCH;".into()),
        }
    }
}
