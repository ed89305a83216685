//! Blocking byte-stream transport used to carry encapsulation messages.
//!
//! Mirrors the read-framing discipline of the teacher crate's socket
//! transports (`read_exact` a fixed prefix, decode a length field, then
//! `read_exact` the remainder) but synchronously, and sized to one
//! EtherNet/IP encapsulation header instead of a generic 4-byte length
//! prefix: the first 24 bytes are always the header, and the header's
//! own length field at offset 2 tells us how many more bytes follow.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use tracing::trace;

use crate::encapsulation::HEADER_LEN;
use crate::error::{CipError, CipResult};

/// A connection-oriented byte stream carrying whole encapsulation
/// messages. Implementations need not understand CIP; they only need to
/// deliver exactly the bytes of one logical request/reply per call.
pub trait Transport {
    /// Open the underlying connection to `host:port`.
    fn connect(&mut self, host: &str, port: u16) -> CipResult<()>;

    /// Write the full buffer, or fail with [`CipError::Transport`].
    fn send(&mut self, bytes: &[u8]) -> CipResult<()>;

    /// Read exactly one encapsulation message: the 24-byte header,
    /// followed by however many bytes its length field declares.
    fn recv(&mut self) -> CipResult<Vec<u8>>;

    /// Close the underlying connection. Idempotent.
    fn close(&mut self) -> CipResult<()>;
}

/// Default [`Transport`] implementation over a blocking `std::net::TcpStream`.
pub struct TcpTransport {
    stream: Option<TcpStream>,
    timeout: Duration,
}

impl TcpTransport {
    /// Create a transport that has not yet connected. `timeout` bounds
    /// both read and write operations once connected.
    pub fn new(timeout: Duration) -> Self {
        Self {
            stream: None,
            timeout,
        }
    }

    fn stream_mut(&mut self) -> CipResult<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| CipError::transport("not connected"))
    }

    fn read_exact_into(stream: &mut TcpStream, buf: &mut [u8]) -> CipResult<()> {
        // `read_exact` already loops internally on short reads, but we keep
        // this as a named seam so behavior here stays obvious at the call
        // site and is easy to swap for manual looping if a future
        // transport can't rely on `Read::read_exact` (e.g. a non-blocking
        // socket wrapped in retries).
        stream
            .read_exact(buf)
            .map_err(|e| CipError::transport(e.to_string()))
    }
}

impl Transport for TcpTransport {
    fn connect(&mut self, host: &str, port: u16) -> CipResult<()> {
        let stream = TcpStream::connect((host, port)).map_err(|e| CipError::transport(e.to_string()))?;
        stream
            .set_read_timeout(Some(self.timeout))
            .map_err(|e| CipError::transport(e.to_string()))?;
        stream
            .set_write_timeout(Some(self.timeout))
            .map_err(|e| CipError::transport(e.to_string()))?;
        stream
            .set_nodelay(true)
            .map_err(|e| CipError::transport(e.to_string()))?;
        self.stream = Some(stream);
        Ok(())
    }

    fn send(&mut self, bytes: &[u8]) -> CipResult<()> {
        trace!(len = bytes.len(), "send");
        let stream = self.stream_mut()?;
        stream
            .write_all(bytes)
            .map_err(|e| CipError::transport(e.to_string()))
    }

    fn recv(&mut self) -> CipResult<Vec<u8>> {
        let stream = self.stream_mut()?;
        let mut header = vec![0u8; HEADER_LEN];
        Self::read_exact_into(stream, &mut header)?;

        let data_len = u16::from_le_bytes([header[2], header[3]]) as usize;
        let mut tail = vec![0u8; data_len];
        if data_len > 0 {
            Self::read_exact_into(stream, &mut tail)?;
        }

        let mut message = header;
        message.extend_from_slice(&tail);
        trace!(len = message.len(), "recv");
        Ok(message)
    }

    fn close(&mut self) -> CipResult<()> {
        // `TcpStream` has no explicit close; dropping it shuts the socket.
        self.stream = None;
        Ok(())
    }
}
