// MIT License - Copyright (c) 2026 Peter Wright
// Stream abstraction and reply framing

pub mod command;
pub mod direct;

#[cfg(test)]
pub(crate) mod mock;

use std::io;

pub use command::Transport;
pub use direct::Endpoint;

use crate::error::{F4Error, Result};
use crate::protocol::{decode_lines, decode_text};

/// Byte stream the transport talks over.
///
/// Implemented for [`tokio::net::TcpStream`]; tests substitute a scripted
/// stream. Reads are non-blocking: `try_read` returns
/// [`io::ErrorKind::WouldBlock`] when nothing is buffered and `readable`
/// resolves once it might not.
#[allow(async_fn_in_trait)]
pub trait SensorStream: Send {
    /// Write some of `buf`, returning how many bytes were accepted.
    async fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Read whatever is available without waiting. `Ok(0)` means the peer closed.
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Wait until the stream may have data to read.
    async fn readable(&self) -> io::Result<()>;

    /// Close the write side of the stream.
    async fn shutdown(&mut self) -> io::Result<()>;
}

/// How the sensor's reply is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Text replies ending with ETX.
    Terminator,
    /// Bulk replies ending when the sensor closes the connection.
    Drain,
}

/// Why a receive loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEnd {
    /// The last byte read was ETX.
    Terminator,
    /// A zero-length read; the transport has dropped the connection.
    PeerClosed,
    /// The retry budget ran out. Data may be partial or empty, and the
    /// transport has dropped the connection.
    TimedOut,
}

/// Bytes accumulated by one exchange, tagged with how it ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    data: Vec<u8>,
    end: FrameEnd,
}

impl Response {
    pub fn new(data: Vec<u8>, end: FrameEnd) -> Self {
        Self { data, end }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn end(&self) -> FrameEnd {
        self.end
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_timed_out(&self) -> bool {
        self.end == FrameEnd::TimedOut
    }

    /// Decoded single-value text.
    pub fn text(&self) -> String {
        decode_text(&self.data)
    }

    /// Decoded non-empty lines.
    pub fn lines(&self) -> Vec<String> {
        decode_lines(&self.data)
    }

    /// Require an ETX-terminated reply, turning anything else into an error
    /// that still carries the bytes received.
    pub fn into_terminated(self) -> Result<Vec<u8>> {
        match self.end {
            FrameEnd::Terminator => Ok(self.data),
            FrameEnd::PeerClosed => Err(F4Error::PeerClosed { partial: self.data }),
            FrameEnd::TimedOut => Err(F4Error::ResponseTimeout { partial: self.data }),
        }
    }
}
