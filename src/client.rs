//! GPSD streaming sessions
//!
//! A session owns one connection to GPSD from connect to close. Opening it
//! sends a single `?WATCH` command enabling JSON reports; afterwards the
//! session only reads, yielding raw lines, decoded [`Record`]s, or
//! classified [`Report`]s.
//!
//! Connection loss, transport errors and (by default) undecodable lines end
//! the session: the error is returned once, then the sequence is exhausted.
//! Nothing is retried, so gaps in the fix timeline are never hidden.
//!
//! This module holds the async session. For blocking I/O, see the
//! `blocking` submodule.
//!
//! # Example
//!
//! ```no_run
//! use futures::StreamExt;
//! use gpsdclient::classify::ClassifyOptions;
//! use gpsdclient::client::{AsyncGpsdSession, SessionConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let session = AsyncGpsdSession::connect(&SessionConfig::default()).await?;
//! let mut reports = Box::pin(session.into_report_stream(ClassifyOptions::new()));
//! while let Some(report) = reports.next().await {
//!     println!("{:?}", report?);
//! }
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use crate::{
    Result,
    classify::{ClassifyOptions, Report, classify},
    error::GpsdClientError,
    filter::ClassFilter,
    framer::{AsyncLineFramer, decode},
    protocol::{Command, DEFAULT_HOST, DEFAULT_PORT, GpsdJsonEncodeAsync, Watch},
    record::Record,
};

/// Blocking (synchronous) session implementation
pub mod blocking;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection and handshake settings for a session
///
/// Fixed for the lifetime of the session it opens.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound on connection establishment
    pub connect_timeout: Duration,
    /// Upper bound on waiting for the next bytes; `None` blocks indefinitely
    pub read_timeout: Option<Duration>,
    /// Watch policy sent as the handshake
    pub watch: Watch,
    /// Skip and log undecodable lines instead of ending the session
    pub skip_invalid_lines: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: None,
            watch: Watch::json(),
            skip_invalid_lines: false,
        }
    }
}

impl SessionConfig {
    pub fn new<S: Into<String>>(host: S, port: u16) -> Self {
        SessionConfig {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Replaces the watch policy; `enable` and `json` are forced on
    pub fn watch(mut self, watch: Watch) -> Self {
        self.watch = Watch {
            enable: Some(true),
            json: Some(true),
            ..watch
        };
        self
    }

    pub fn skip_invalid_lines(mut self, skip: bool) -> Self {
        self.skip_invalid_lines = skip;
        self
    }

    /// `host:port` as used in log and error messages
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn handshake(&self) -> Command {
        Command::Watch(Some(self.watch.clone()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Open,
    Failed,
}

/// Errors a skip-and-log policy may step over: the bad line is already
/// consumed and the framer sits on the next line boundary.
fn is_decode_failure(err: &GpsdClientError) -> bool {
    matches!(
        err,
        GpsdClientError::InvalidUtf8(_)
            | GpsdClientError::Decode(_)
            | GpsdClientError::NotAnObject
            | GpsdClientError::MissingClass
    )
}

/// Maps a connect-time I/O error onto the connection error taxonomy
fn connect_error(addr: String, source: std::io::Error) -> GpsdClientError {
    if is_resource_exhaustion(&source) {
        GpsdClientError::Environment { addr, source }
    } else {
        GpsdClientError::Connect { addr, source }
    }
}

#[cfg(unix)]
fn is_resource_exhaustion(err: &std::io::Error) -> bool {
    matches!(err.raw_os_error(), Some(libc::EMFILE) | Some(libc::ENFILE))
}

#[cfg(not(unix))]
fn is_resource_exhaustion(_err: &std::io::Error) -> bool {
    false
}

/// Asynchronous GPSD session
///
/// # Type Parameters
/// * `Stream` - The underlying async I/O stream type (e.g., a compat-wrapped TcpStream)
#[derive(Debug)]
pub struct AsyncGpsdSession<Stream> {
    framer: AsyncLineFramer<Stream>,
    state: SessionState,
    #[cfg_attr(not(feature = "tokio"), allow(dead_code))]
    read_timeout: Option<Duration>,
    skip_invalid_lines: bool,
}

impl<Stream> AsyncGpsdSession<Stream>
where
    Stream: futures_io::AsyncRead + futures_io::AsyncWrite + Unpin,
{
    /// Starts a session on an already connected stream
    ///
    /// Writes the watch command before anything is read.
    pub async fn from_stream(mut stream: Stream, config: &SessionConfig) -> Result<Self> {
        stream.write_request(&config.handshake()).await?;
        tracing::debug!(addr = %config.addr(), "watch command sent");

        Ok(AsyncGpsdSession {
            framer: AsyncLineFramer::new(stream),
            state: SessionState::Open,
            read_timeout: config.read_timeout,
            skip_invalid_lines: config.skip_invalid_lines,
        })
    }

    /// Reads the next raw report line
    ///
    /// Returns `None` once the session has ended.
    pub async fn next_line(&mut self) -> Option<Result<String>> {
        if self.state != SessionState::Open {
            return None;
        }

        loop {
            match self.read_framed_line().await {
                Ok(Some(line)) => return Some(Ok(line)),
                Ok(None) => return Some(Err(self.fail(GpsdClientError::ConnectionClosed))),
                Err(err) if self.skip_invalid_lines && is_decode_failure(&err) => {
                    tracing::warn!(error = %err, "skipping undecodable line");
                }
                Err(err) => return Some(Err(self.fail(err))),
            }
        }
    }

    /// Reads and decodes the next record, skipping blank lines
    pub async fn next_record(&mut self) -> Option<Result<Record>> {
        loop {
            let line = match self.next_line().await? {
                Ok(line) => line,
                Err(err) => return Some(Err(err)),
            };
            if line.trim().is_empty() {
                continue;
            }

            match decode(&line) {
                Ok(record) => return Some(Ok(record)),
                Err(err) if self.skip_invalid_lines => {
                    tracing::warn!(error = %err, %line, "skipping undecodable line");
                }
                Err(err) => return Some(Err(self.fail(err))),
            }
        }
    }

    /// Reads, decodes and classifies the next report
    pub async fn next_report(&mut self, opts: ClassifyOptions) -> Option<Result<Report>> {
        let record = self.next_record().await?;
        Some(record.and_then(|record| classify(record, &opts)))
    }

    /// Raw line stream (pass-through JSON text)
    pub fn into_line_stream(self) -> impl futures_util::Stream<Item = Result<String>> {
        futures_util::stream::unfold(self, |mut session| async move {
            let item = session.next_line().await?;
            Some((item, session))
        })
    }

    /// Decoded record stream
    pub fn into_record_stream(self) -> impl futures_util::Stream<Item = Result<Record>> {
        futures_util::stream::unfold(self, |mut session| async move {
            let item = session.next_record().await?;
            Some((item, session))
        })
    }

    /// Classified report stream
    pub fn into_report_stream(
        self,
        opts: ClassifyOptions,
    ) -> impl futures_util::Stream<Item = Result<Report>> {
        futures_util::stream::unfold(self, move |mut session| async move {
            let item = session.next_report(opts).await?;
            Some((item, session))
        })
    }

    /// Classified report stream narrowed to the classes in `filter`
    pub fn into_filtered_stream(
        self,
        filter: ClassFilter,
        opts: ClassifyOptions,
    ) -> impl futures_util::Stream<Item = Result<Report>> {
        use futures_util::StreamExt;

        self.into_report_stream(opts)
            .filter(move |item| std::future::ready(filter.accepts_item(item)))
    }

    /// Shuts the connection down and releases the stream
    pub async fn close(mut self) -> Result<()> {
        use futures_util::AsyncWriteExt;

        match self.framer.get_mut().close().await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotConnected => {}
            Err(err) => return Err(GpsdClientError::Io(err)),
        }
        tracing::debug!("session closed");
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    #[cfg(feature = "tokio")]
    async fn read_framed_line(&mut self) -> Result<Option<String>> {
        let Some(timeout) = self.read_timeout else {
            return self.framer.read_line().await;
        };

        tokio::time::timeout(timeout, self.framer.read_line())
            .await
            .map_err(|_| {
                GpsdClientError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "no data from gpsd within read timeout",
                ))
            })?
    }

    #[cfg(not(feature = "tokio"))]
    async fn read_framed_line(&mut self) -> Result<Option<String>> {
        self.framer.read_line().await
    }

    fn fail(&mut self, err: GpsdClientError) -> GpsdClientError {
        tracing::warn!(error = %err, "session ended");
        self.state = SessionState::Failed;
        err
    }
}

#[cfg(feature = "tokio")]
impl AsyncGpsdSession<tokio_util::compat::Compat<tokio::net::TcpStream>> {
    /// Connects to GPSD over TCP and sends the watch command
    ///
    /// # Example
    /// ```no_run
    /// # use gpsdclient::client::{AsyncGpsdSession, SessionConfig};
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let session = AsyncGpsdSession::connect(&SessionConfig::new("127.0.0.1", 2947)).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(config: &SessionConfig) -> Result<Self> {
        use tokio_util::compat::TokioAsyncReadCompatExt;

        let addr = config.addr();
        let connecting = tokio::net::TcpStream::connect((config.host.as_str(), config.port));
        let stream = match tokio::time::timeout(config.connect_timeout, connecting).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(err)) => return Err(connect_error(addr, err)),
            Err(_) => {
                return Err(connect_error(
                    addr,
                    std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"),
                ));
            }
        };
        tracing::debug!(%addr, "connected to gpsd");

        Self::from_stream(stream.compat(), config).await
    }
}
