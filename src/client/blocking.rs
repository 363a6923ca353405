//! Blocking (synchronous) GPSD session
//!
//! Every pull blocks the calling thread until a full line is available, the
//! daemon closes the connection, or an error occurs. A session is drained by
//! one consumer at a time: the iterators borrow it mutably.
//!
//! # Example
//!
//! ```no_run
//! use gpsdclient::classify::{ClassifyOptions, Report};
//! use gpsdclient::client::blocking::GpsdSession;
//! use gpsdclient::filter::ClassFilter;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut session = GpsdSession::open("127.0.0.1", 2947)?;
//! let opts = ClassifyOptions::new().convert_datetime(true);
//! for report in session.filter(ClassFilter::new(["TPV"]), opts).take(10) {
//!     if let Report::Tpv(tpv) = report? {
//!         println!("{:?} {:?} {:?}", tpv.time(), tpv.lat(), tpv.lon());
//!     }
//! }
//! session.close()?;
//! # Ok(())
//! # }
//! ```

use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};

use crate::classify::{ClassifyOptions, Report, classify};
use crate::client::{SessionConfig, SessionState, connect_error, is_decode_failure};
use crate::error::GpsdClientError;
use crate::filter::{ClassFilter, FilterClasses, Filtered};
use crate::framer::{LineFramer, decode};
use crate::protocol::GpsdJsonEncode;
use crate::{Result, record::Record};

/// A byte stream a session can run over
///
/// `shutdown` tears the connection down in both directions; the default
/// does nothing and leaves release to `Drop`.
pub trait Transport: Read + Write {
    fn shutdown(&self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Transport for TcpStream {
    fn shutdown(&self) -> std::io::Result<()> {
        TcpStream::shutdown(self, Shutdown::Both)
    }
}

#[cfg(unix)]
impl Transport for std::os::unix::net::UnixStream {
    fn shutdown(&self) -> std::io::Result<()> {
        std::os::unix::net::UnixStream::shutdown(self, Shutdown::Both)
    }
}

/// Blocking GPSD session
///
/// Owns exactly one stream from open to close. Dropping the session (or
/// calling [`GpsdSession::close`]) releases it; iterators only borrow the
/// session, so abandoning one mid-stream leaks nothing.
///
/// # Type Parameters
/// * `Stream` - The underlying I/O stream type (e.g., TcpStream)
#[derive(Debug)]
pub struct GpsdSession<Stream: Transport> {
    framer: LineFramer<Stream>,
    state: SessionState,
    skip_invalid_lines: bool,
}

impl GpsdSession<TcpStream> {
    /// Connects to GPSD at `host:port` with default settings
    ///
    /// # Returns
    /// * `Ok(session)` - Connected, watch command sent
    /// * `Err(Connect)` - Endpoint unreachable, refused, or timed out
    /// * `Err(Environment)` - Local file descriptors exhausted
    pub fn open<H: Into<String>>(host: H, port: u16) -> Result<Self> {
        Self::open_with(&SessionConfig::new(host, port))
    }

    /// Connects to GPSD using an explicit configuration
    pub fn open_with(config: &SessionConfig) -> Result<Self> {
        let stream = connect_tcp(config)?;
        stream
            .set_read_timeout(config.read_timeout)
            .map_err(GpsdClientError::Io)?;
        tracing::debug!(addr = %config.addr(), "connected to gpsd");

        Self::from_stream(stream, config)
    }

    /// Returns a handle that can shut the connection down from another thread
    ///
    /// A blocked pull returns promptly once the handle is used.
    pub fn shutdown_handle(&self) -> Result<ShutdownHandle> {
        let stream = self
            .framer
            .get_ref()
            .try_clone()
            .map_err(GpsdClientError::Io)?;
        Ok(ShutdownHandle { stream })
    }
}

impl<Stream: Transport> GpsdSession<Stream> {
    /// Starts a session on an already connected stream
    ///
    /// Writes the watch command before anything is read; GPSD stays silent
    /// until it is watched.
    pub fn from_stream(mut stream: Stream, config: &SessionConfig) -> Result<Self> {
        stream.write_request(&config.handshake())?;
        tracing::debug!(addr = %config.addr(), "watch command sent");

        Ok(GpsdSession {
            framer: LineFramer::new(stream),
            state: SessionState::Open,
            skip_invalid_lines: config.skip_invalid_lines,
        })
    }

    /// Reads the next raw report line
    ///
    /// Returns `None` once the session has ended. Peer close is reported once
    /// as `ConnectionClosed` before that.
    pub fn next_line(&mut self) -> Option<Result<String>> {
        if self.state != SessionState::Open {
            return None;
        }

        loop {
            match self.framer.read_line() {
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
    pub fn next_record(&mut self) -> Option<Result<Record>> {
        loop {
            let line = match self.next_line()? {
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
    ///
    /// Classification failures (an unparsable TPV time) concern only that
    /// report; the session stays open.
    pub fn next_report(&mut self, opts: &ClassifyOptions) -> Option<Result<Report>> {
        let record = self.next_record()?;
        Some(record.and_then(|record| classify(record, opts)))
    }

    /// Raw line sequence (pass-through JSON text)
    pub fn lines(&mut self) -> Lines<'_, Stream> {
        Lines { session: self }
    }

    /// Decoded record sequence
    pub fn records(&mut self) -> Records<'_, Stream> {
        Records { session: self }
    }

    /// Classified report sequence
    pub fn reports(&mut self, opts: ClassifyOptions) -> Reports<'_, Stream> {
        Reports {
            session: self,
            opts,
        }
    }

    /// Classified report sequence narrowed to the classes in `filter`
    pub fn filter(
        &mut self,
        filter: ClassFilter,
        opts: ClassifyOptions,
    ) -> Filtered<Reports<'_, Stream>> {
        self.reports(opts).filter_classes(filter)
    }

    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    /// Shuts the connection down and releases the stream
    pub fn close(self) -> Result<()> {
        match Transport::shutdown(self.framer.get_ref()) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotConnected => {}
            Err(err) => return Err(GpsdClientError::Io(err)),
        }
        tracing::debug!("session closed");
        Ok(())
    }

    fn fail(&mut self, err: GpsdClientError) -> GpsdClientError {
        tracing::warn!(error = %err, "session ended");
        self.state = SessionState::Failed;
        err
    }
}

/// Iterator over raw report lines, see [`GpsdSession::lines`]
pub struct Lines<'a, Stream: Transport> {
    session: &'a mut GpsdSession<Stream>,
}

impl<Stream: Transport> Iterator for Lines<'_, Stream> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.session.next_line()
    }
}

/// Iterator over decoded records, see [`GpsdSession::records`]
pub struct Records<'a, Stream: Transport> {
    session: &'a mut GpsdSession<Stream>,
}

impl<Stream: Transport> Iterator for Records<'_, Stream> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.session.next_record()
    }
}

/// Iterator over classified reports, see [`GpsdSession::reports`]
pub struct Reports<'a, Stream: Transport> {
    session: &'a mut GpsdSession<Stream>,
    opts: ClassifyOptions,
}

impl<Stream: Transport> Iterator for Reports<'_, Stream> {
    type Item = Result<Report>;

    fn next(&mut self) -> Option<Self::Item> {
        self.session.next_report(&self.opts)
    }
}

/// Cloned socket handle used to interrupt a blocked session
#[derive(Debug)]
pub struct ShutdownHandle {
    stream: TcpStream,
}

impl ShutdownHandle {
    pub fn shutdown(&self) -> Result<()> {
        match self.stream.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(GpsdClientError::Io(err)),
        }
    }
}

/// Resolves the endpoint and tries each address within the connect timeout
fn connect_tcp(config: &SessionConfig) -> Result<TcpStream> {
    let addrs: Vec<SocketAddr> = (config.host.as_str(), config.port)
        .to_socket_addrs()
        .map_err(|err| GpsdClientError::Resolve {
            host: config.host.clone(),
            port: config.port,
            source: Some(err),
        })?
        .collect();

    let mut last_err = None;
    for addr in &addrs {
        let attempt = if config.connect_timeout.is_zero() {
            TcpStream::connect(addr)
        } else {
            TcpStream::connect_timeout(addr, config.connect_timeout)
        };
        match attempt {
            Ok(stream) => return Ok(stream),
            Err(err) => {
                tracing::debug!(%addr, error = %err, "connect attempt failed");
                last_err = Some(err);
            }
        }
    }

    match last_err {
        Some(err) => Err(connect_error(config.addr(), err)),
        None => Err(GpsdClientError::Resolve {
            host: config.host.clone(),
            port: config.port,
            source: None,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::record::Classed;

    /// Scripted transport recording what happens to it.
    struct MockTransport {
        input: Cursor<Vec<u8>>,
        log: Arc<Mutex<Vec<String>>>,
        drops: Arc<AtomicUsize>,
    }

    impl MockTransport {
        fn new(wire: &str) -> (Self, Arc<Mutex<Vec<String>>>, Arc<AtomicUsize>) {
            let log = Arc::new(Mutex::new(Vec::new()));
            let drops = Arc::new(AtomicUsize::new(0));
            let mock = MockTransport {
                input: Cursor::new(wire.as_bytes().to_vec()),
                log: Arc::clone(&log),
                drops: Arc::clone(&drops),
            };
            (mock, log, drops)
        }
    }

    impl Read for MockTransport {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.log.lock().unwrap().push("read".into());
            self.input.read(buf)
        }
    }

    impl Write for MockTransport {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.log
                .lock()
                .unwrap()
                .push(format!("write {}", String::from_utf8_lossy(buf)));
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Transport for MockTransport {
        fn shutdown(&self) -> std::io::Result<()> {
            self.log.lock().unwrap().push("shutdown".into());
            Ok(())
        }
    }

    impl Drop for MockTransport {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    const WIRE: &str = concat!(
        "{\"class\":\"VERSION\",\"release\":\"3.25\"}\r\n",
        "{\"class\":\"DEVICES\",\"devices\":[]}\r\n",
        "{\"class\":\"TPV\",\"mode\":2}\r\n",
        "{\"class\":\"SKY\",\"nSat\":9,\"uSat\":4}\r\n",
        "{\"class\":\"TPV\",\"mode\":3}\r\n",
        "{\"class\":\"SKY\",\"satellites\":[{\"used\":true}]}\r\n",
    );

    #[test]
    fn watch_command_precedes_first_read() {
        let (mock, log, _) = MockTransport::new(WIRE);
        let mut session = GpsdSession::from_stream(mock, &SessionConfig::default()).unwrap();
        session.next_line().unwrap().unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log[0], r#"write ?WATCH={"enable":true,"json":true};"#);
        assert_eq!(log[1], "read");
        assert_eq!(
            log.iter().filter(|entry| entry.starts_with("write")).count(),
            1
        );
    }

    #[test]
    fn filter_by_sky_keeps_order() {
        let (mock, _, _) = MockTransport::new(WIRE);
        let mut session = GpsdSession::from_stream(mock, &SessionConfig::default()).unwrap();

        let counts: Vec<u64> = session
            .filter(ClassFilter::new(["SKY"]), ClassifyOptions::new())
            .filter_map(|item| match item {
                Ok(Report::Sky(sky)) => Some(sky.satellite_count().unwrap()),
                Ok(other) => panic!("unexpected {:?}", other.class()),
                Err(_) => None,
            })
            .collect();

        assert_eq!(counts, vec![9, 1]);
        assert!(!session.is_open());
    }

    #[test]
    fn end_of_stream_is_reported_once() {
        let (mock, _, _) = MockTransport::new("{\"class\":\"TPV\"}\n{\"class\":\"TP");
        let mut session = GpsdSession::from_stream(mock, &SessionConfig::default()).unwrap();

        let items: Vec<_> = session.records().collect();
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(GpsdClientError::ConnectionClosed)));
        assert!(session.records().next().is_none());
    }

    #[test]
    fn sequences_resume_across_calls() {
        let (mock, _, _) = MockTransport::new(WIRE);
        let mut session = GpsdSession::from_stream(mock, &SessionConfig::default()).unwrap();

        let first: Vec<_> = session.records().take(2).map(|r| r.unwrap()).collect();
        let next = session.records().next().unwrap().unwrap();

        assert_eq!(first[1].class_name(), "DEVICES");
        assert_eq!(next.class_name(), "TPV");
    }

    #[test]
    fn decode_failure_terminates_by_default() {
        let (mock, _, _) = MockTransport::new("{\"class\":\"TPV\"}\n{oops\n{\"class\":\"SKY\"}\n");
        let mut session = GpsdSession::from_stream(mock, &SessionConfig::default()).unwrap();

        let items: Vec<_> = session.records().collect();
        assert_eq!(items.len(), 2);
        assert!(matches!(items[1], Err(GpsdClientError::Decode(_))));
    }

    #[test]
    fn skip_policy_drops_bad_lines() {
        let (mock, _, _) = MockTransport::new("{oops\n\"str\"\n{\"class\":\"SKY\"}\n");
        let config = SessionConfig::default().skip_invalid_lines(true);
        let mut session = GpsdSession::from_stream(mock, &config).unwrap();

        assert_eq!(
            session.next_record().unwrap().unwrap().class_name(),
            "SKY"
        );
    }

    #[test]
    fn raw_lines_are_passed_through() {
        let (mock, _, _) = MockTransport::new(WIRE);
        let mut session = GpsdSession::from_stream(mock, &SessionConfig::default()).unwrap();

        let line = session.lines().nth(2).unwrap().unwrap();
        assert_eq!(line, r#"{"class":"TPV","mode":2}"#);
    }

    #[test]
    fn bad_timestamp_does_not_end_session() {
        let wire = concat!(
            "{\"class\":\"TPV\",\"time\":\"soon\"}\n",
            "{\"class\":\"TPV\",\"time\":\"2024-01-01T00:00:00Z\"}\n",
        );
        let (mock, _, _) = MockTransport::new(wire);
        let mut session = GpsdSession::from_stream(mock, &SessionConfig::default()).unwrap();
        let opts = ClassifyOptions::new().convert_datetime(true);

        let mut reports = session.reports(opts);
        assert!(matches!(
            reports.next(),
            Some(Err(GpsdClientError::InvalidTimestamp { .. }))
        ));
        assert!(matches!(reports.next(), Some(Ok(Report::Tpv(_)))));
    }

    #[test]
    fn abandoned_iteration_releases_transport_once() {
        let (mock, _, drops) = MockTransport::new(WIRE);
        {
            let mut session = GpsdSession::from_stream(mock, &SessionConfig::default()).unwrap();
            let first = session.records().next();
            assert!(first.is_some());
            assert_eq!(drops.load(Ordering::SeqCst), 0);
        }
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn close_shuts_down_then_releases() {
        let (mock, log, drops) = MockTransport::new(WIRE);
        let mut session = GpsdSession::from_stream(mock, &SessionConfig::default()).unwrap();
        let _ = session.next_record();
        session.close().unwrap();

        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert_eq!(log.lock().unwrap().last().map(String::as_str), Some("shutdown"));
    }

    #[test]
    fn unresolvable_host_is_a_connection_error() {
        let config = SessionConfig::new("host.invalid", 2947);
        let err = GpsdSession::open_with(&config).unwrap_err();
        assert!(err.is_connection_error());
    }
}
