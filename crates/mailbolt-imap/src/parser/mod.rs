//! Streaming response parser.
//!
//! [`ResponseParser`] owns the connection's [`Transport`] slot and pulls
//! bytes on demand: one CRLF-terminated line at a time, plus the exact
//! number of octets any `{n}` literal announces. Nothing beyond the
//! current response unit is consumed from the transport, so the byte
//! source can be swapped mid-session (STARTTLS) whenever the read-ahead
//! buffer is empty.

mod lexer;
mod response;
mod types;

pub use lexer::{Lexer, Token};
pub use types::{
    FetchItem, Greeting, GreetingKind, ListData, Response, ResponseCode, ResponseData,
    ResponseItem, ResponseText, ServerStatusKind, Status, TaggedDone,
};

use std::collections::VecDeque;
use std::io::Write;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::transport::Transport;
use crate::{Error, Result};

/// Maximum line length before the response is rejected.
const MAX_LINE_LENGTH: usize = 1024 * 1024; // 1 MB

/// Maximum literal size before the response is rejected.
const MAX_LITERAL_SIZE: usize = 100 * 1024 * 1024; // 100 MB

/// How many trailing received bytes are kept for error diagnostics.
const LOG_CAPACITY: usize = 512;

/// Redirects literal payloads into caller-supplied storage.
///
/// When a `{n}` literal is announced, the parser asks the handler for a
/// destination. Given one, the `n` octets are streamed there and the
/// response tree carries an empty payload in their place; otherwise the
/// octets are captured in memory.
pub trait LiteralHandler {
    /// Decides where the `len` octets announced at the end of `line` go.
    fn target(&mut self, line: &[u8], len: usize) -> Option<&mut dyn Write>;
}

/// Streaming parser over the connection's byte stream.
pub struct ResponseParser {
    transport: Option<Transport>,
    buf: BytesMut,
    io_timeout: Duration,
    log: VecDeque<u8>,
    consumed: usize,
}

impl ResponseParser {
    /// Creates a parser bound to the given transport.
    #[must_use]
    pub fn new(transport: Transport, io_timeout: Duration) -> Self {
        Self {
            transport: Some(transport),
            buf: BytesMut::with_capacity(8 * 1024),
            io_timeout,
            log: VecDeque::with_capacity(LOG_CAPACITY),
            consumed: 0,
        }
    }

    /// Whether a transport is currently attached.
    #[must_use]
    pub const fn has_transport(&self) -> bool {
        self.transport.is_some()
    }

    /// Replaces the byte source.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Protocol`] if unread bytes are buffered: a
    /// swap would silently drop them.
    pub fn set_transport(&mut self, transport: Transport) -> Result<()> {
        if !self.buf.is_empty() {
            return Err(Error::Protocol(
                "unread data buffered across transport swap".to_string(),
            ));
        }
        self.transport = Some(transport);
        Ok(())
    }

    /// Detaches the byte source, e.g. to wrap it in TLS.
    ///
    /// # Errors
    ///
    /// Fails if unread bytes are buffered or no transport is attached.
    pub fn take_transport(&mut self) -> Result<Transport> {
        if !self.buf.is_empty() {
            return Err(Error::Protocol(
                "unread data buffered across transport swap".to_string(),
            ));
        }
        self.transport
            .take()
            .ok_or_else(|| Error::InvalidState("transport detached".to_string()))
    }

    /// Consumes the parser and returns the transport, if any.
    #[must_use]
    pub fn into_transport(self) -> Option<Transport> {
        self.transport
    }

    /// Writes raw bytes to the transport, retrying partial writes and
    /// flushing, bounded by the idle timeout.
    pub async fn send_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let timeout = self.io_timeout;
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| Error::InvalidState("transport detached".to_string()))?;

        tokio::time::timeout(timeout, async {
            transport.write_all(bytes).await?;
            transport.flush().await
        })
        .await
        .map_err(|_| Error::Timeout(timeout))??;

        Ok(())
    }

    /// Reads and parses the server's connection greeting.
    pub async fn read_greeting(&mut self) -> Result<Greeting> {
        let base = self.consumed;
        let unit = self.read_unit(&mut None).await?;
        response::parse_greeting(&unit).map_err(|e| self.locate(e, base))
    }

    /// Reads until the tagged completion matching `expected_tag`, or
    /// until a continuation request (then `done` is `None`).
    ///
    /// Untagged responses received while waiting are accumulated in
    /// arrival order. A tagged completion carrying a different tag is a
    /// protocol error: commands are strictly serialized, so a stray tag
    /// means the stream is desynchronized.
    pub async fn read_response(
        &mut self,
        expected_tag: Option<&str>,
        mut handler: Option<&mut dyn LiteralHandler>,
    ) -> Result<Response> {
        let mut items = Vec::new();

        loop {
            let base = self.consumed;
            let unit = self.read_unit(&mut handler).await?;
            match response::parse_unit(&unit).map_err(|e| self.locate(e, base))? {
                response::Parsed::Continuation(text) => {
                    items.push(ResponseItem::Continuation(text));
                    return Ok(Response { items, done: None });
                }
                response::Parsed::Data(data) => items.push(ResponseItem::Data(data)),
                response::Parsed::Done(done) => {
                    if let Some(expected) = expected_tag
                        && done.tag != expected
                    {
                        return Err(Error::Protocol(format!(
                            "response tag {} does not match command tag {expected}",
                            done.tag
                        )));
                    }
                    return Ok(Response {
                        items,
                        done: Some(done),
                    });
                }
            }
        }
    }

    /// Reads one unit: a line plus any literals it announces, with
    /// literal payloads inlined (or redirected to the handler, leaving a
    /// zero-length announcement in their place).
    async fn read_unit(
        &mut self,
        handler: &mut Option<&mut dyn LiteralHandler>,
    ) -> Result<Vec<u8>> {
        let mut unit = Vec::new();

        loop {
            let line = self.read_line().await?;

            let Some((open, len)) = literal_announce(&line) else {
                unit.extend_from_slice(&line);
                return Ok(unit);
            };

            if len > MAX_LITERAL_SIZE {
                return Err(self.parse_error(format!(
                    "literal too large: {len} bytes (max {MAX_LITERAL_SIZE})"
                )));
            }

            let mut redirected = false;
            if let Some(h) = handler
                && let Some(sink) = h.target(&line, len)
            {
                unit.extend_from_slice(&line[..open]);
                unit.extend_from_slice(b"{0}\r\n");
                self.drain_literal(len, sink).await?;
                redirected = true;
            }

            if !redirected {
                unit.extend_from_slice(&line);
                let mut data = Vec::with_capacity(len.min(64 * 1024));
                self.drain_literal(len, &mut data).await?;
                unit.extend_from_slice(&data);
            }
            // The unit continues on the next line after the literal.
        }
    }

    /// Reads one CRLF-terminated line, including the CRLF.
    async fn read_line(&mut self) -> Result<Vec<u8>> {
        let mut scanned = 0;
        loop {
            if let Some(pos) = find_crlf(&self.buf[scanned..]) {
                let end = scanned + pos + 2;
                let line = self.buf.split_to(end).to_vec();
                self.consumed += end;
                return Ok(line);
            }

            if self.buf.len() > MAX_LINE_LENGTH {
                return Err(self.parse_error("line too long".to_string()));
            }

            scanned = self.buf.len().saturating_sub(1);
            self.fill().await?;
        }
    }

    /// Streams exactly `n` literal octets into `out`, retrying short
    /// transport reads.
    async fn drain_literal(&mut self, mut n: usize, out: &mut dyn Write) -> Result<()> {
        while n > 0 {
            if self.buf.is_empty() {
                self.fill().await?;
            }
            let take = self.buf.len().min(n);
            out.write_all(&self.buf[..take])?;
            self.buf.advance(take);
            self.consumed += take;
            n -= take;
        }
        Ok(())
    }

    /// Pulls at least one byte from the transport into the buffer.
    async fn fill(&mut self) -> Result<()> {
        let timeout = self.io_timeout;
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| Error::InvalidState("transport detached".to_string()))?;

        let old_len = self.buf.len();
        let read = tokio::time::timeout(timeout, transport.read_buf(&mut self.buf))
            .await
            .map_err(|_| Error::Timeout(timeout))??;

        if read == 0 {
            return Err(Error::ConnectionLost(
                "server closed the connection".to_string(),
            ));
        }

        let fresh: Vec<u8> = self.buf[old_len..].to_vec();
        self.log_push(&fresh);
        Ok(())
    }

    fn log_push(&mut self, bytes: &[u8]) {
        for &b in bytes {
            if self.log.len() == LOG_CAPACITY {
                self.log.pop_front();
            }
            self.log.push_back(b);
        }
    }

    /// The trailing bytes received on this connection, for diagnostics.
    #[must_use]
    pub fn error_log(&self) -> String {
        let (head, tail) = self.log.as_slices();
        let mut s = String::from_utf8_lossy(head).into_owned();
        s.push_str(&String::from_utf8_lossy(tail));
        s
    }

    fn parse_error(&self, message: String) -> Error {
        Error::Parse {
            position: self.consumed + self.buf.len(),
            message,
            log: self.error_log(),
        }
    }

    /// Rebases a grammar error onto the stream offset and attaches the
    /// received-bytes log.
    fn locate(&self, error: Error, base: usize) -> Error {
        match error {
            Error::Parse {
                position, message, ..
            } => Error::Parse {
                position: base + position,
                message,
                log: self.error_log(),
            },
            other => other,
        }
    }
}

impl std::fmt::Debug for ResponseParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseParser")
            .field("transport", &self.transport)
            .field("buffered", &self.buf.len())
            .field("consumed", &self.consumed)
            .finish_non_exhaustive()
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Matches a literal announcement `{n}` (or `{n+}`) at the end of a
/// line, returning the offset of the `{` and the announced length.
fn literal_announce(line: &[u8]) -> Option<(usize, usize)> {
    let body = line.strip_suffix(b"\r\n")?;
    let open = body.iter().rposition(|&b| b == b'{')?;

    let inner = body.get(open + 1..body.len().checked_sub(1)?)?;
    if !body.ends_with(b"}") {
        return None;
    }
    let digits = inner.strip_suffix(b"+").unwrap_or(inner);
    if digits.is_empty() {
        return None;
    }

    let len = std::str::from_utf8(digits).ok()?.parse().ok()?;
    Some((open, len))
}
