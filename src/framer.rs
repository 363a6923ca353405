//! Line framing for the GPSD report stream
//!
//! GPSD writes one JSON object per line. Socket reads deliver arbitrary
//! fragments of that stream, so bytes are accumulated until a full line is
//! available. A partial trailing line is always kept for the next read and
//! is discarded only when the peer closes the connection.

use std::io::{ErrorKind, Read};

use crate::{Result, error::GpsdClientError, record::Record};

const INITIAL_BUFFER_CAPACITY: usize = 4 * 1024;
const READ_CHUNK_SIZE: usize = 4 * 1024;

/// Byte accumulator that splits on `\n`
///
/// Lines are returned without their terminator; a `\r` directly before the
/// `\n` is stripped as well since GPSD terminates lines with CRLF.
#[derive(Debug)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl Default for LineBuffer {
    fn default() -> Self {
        LineBuffer {
            buf: Vec::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends freshly received bytes
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pops the next complete line, if one is buffered
    pub fn next_line(&mut self) -> Option<Result<String>> {
        let pos = self.buf.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }

        Some(String::from_utf8(line).map_err(GpsdClientError::InvalidUtf8))
    }

    /// Bytes received after the last complete line
    pub fn remainder(&self) -> &[u8] {
        &self.buf
    }

    /// Drops the unterminated remainder at end of stream
    fn discard_remainder(&mut self) {
        if !self.buf.is_empty() {
            tracing::warn!(
                bytes = self.buf.len(),
                "discarding unterminated line at end of stream"
            );
            self.buf.clear();
        }
    }
}

/// Reads complete lines from any blocking `Read` stream
///
/// Handles partial reads internally; callers always get complete lines.
/// Returns `Ok(None)` once the peer has closed the stream and every complete
/// buffered line has been handed out.
#[derive(Debug)]
pub struct LineFramer<R> {
    inner: R,
    buf: LineBuffer,
    eof: bool,
}

impl<R: Read> LineFramer<R> {
    pub fn new(inner: R) -> Self {
        LineFramer {
            inner,
            buf: LineBuffer::new(),
            eof: false,
        }
    }

    /// Reads the next complete line (blocking)
    pub fn read_line(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(line) = self.buf.next_line() {
                let line = line?;
                tracing::trace!(%line, "framed line");
                return Ok(Some(line));
            }
            if self.eof {
                return Ok(None);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(GpsdClientError::Io(err)),
            };

            if read == 0 {
                self.eof = true;
                self.buf.discard_remainder();
                return Ok(None);
            }

            self.buf.extend(&chunk[..read]);
        }
    }

    /// True once the peer closed the stream
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Iterator for LineFramer<R> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_line().transpose()
    }
}

/// Async counterpart of [`LineFramer`] for `futures_io::AsyncRead` streams
#[derive(Debug)]
pub struct AsyncLineFramer<R> {
    inner: R,
    buf: LineBuffer,
    eof: bool,
}

impl<R> AsyncLineFramer<R>
where
    R: futures_io::AsyncRead + Unpin,
{
    pub fn new(inner: R) -> Self {
        AsyncLineFramer {
            inner,
            buf: LineBuffer::new(),
            eof: false,
        }
    }

    /// Reads the next complete line
    pub async fn read_line(&mut self) -> Result<Option<String>> {
        use futures_util::AsyncReadExt;

        loop {
            if let Some(line) = self.buf.next_line() {
                let line = line?;
                tracing::trace!(%line, "framed line");
                return Ok(Some(line));
            }
            if self.eof {
                return Ok(None);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk).await {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(GpsdClientError::Io(err)),
            };

            if read == 0 {
                self.eof = true;
                self.buf.discard_remainder();
                return Ok(None);
            }

            self.buf.extend(&chunk[..read]);
        }
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// Parses one line as a JSON object carrying a "class" field
pub fn decode(line: &str) -> Result<Record> {
    let value: serde_json::Value = serde_json::from_str(line).map_err(GpsdClientError::Decode)?;
    Record::from_value(value)
}
