// MIT License - Copyright (c) 2026 Peter Wright
// Error types

use crate::protocol::Attribute;

/// All errors that can occur while talking to a sensor.
#[derive(Debug, thiserror::Error)]
pub enum F4Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to connect to {addr}: {source}")]
    Connection {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Connection timeout: {addr}")]
    ConnectionTimeout { addr: String },

    #[error("Not connected")]
    NotConnected,

    /// The read retry budget ran out before the reply was complete.
    #[error("Response timeout ({} bytes received)", partial.len())]
    ResponseTimeout { partial: Vec<u8> },

    /// The sensor closed the connection before the reply was complete.
    #[error("Connection closed by sensor ({} bytes received)", partial.len())]
    PeerClosed { partial: Vec<u8> },

    /// Any socket error other than would-block. The connection is dropped.
    #[error("Socket fault: {source} ({} bytes received)", partial.len())]
    SocketFault {
        #[source]
        source: std::io::Error,
        partial: Vec<u8>,
    },

    #[error("Attribute number out of range: {number} (valid: 1-200)")]
    AttributeRange { number: u32 },

    #[error("Could not parse {attribute} value: {value:?}")]
    Parse { attribute: Attribute, value: String },

    #[error("Invalid response: {details}")]
    InvalidResponse { details: String },

    #[error("Sensor did not report online within {waited_ms} ms")]
    OnlineTimeout { waited_ms: u64 },

    #[error("FTP error {code}: {message}")]
    Ftp { code: u16, message: String },
}

impl F4Error {
    /// Whether this error is transient and the command may be retried
    /// (after a reconnect where the connection was dropped).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            F4Error::Io(_)
                | F4Error::Connection { .. }
                | F4Error::ConnectionTimeout { .. }
                | F4Error::NotConnected
                | F4Error::ResponseTimeout { .. }
                | F4Error::PeerClosed { .. }
                | F4Error::SocketFault { .. }
        )
    }

    /// Bytes received before the exchange failed, if any were kept.
    pub fn partial_data(&self) -> Option<&[u8]> {
        match self {
            F4Error::ResponseTimeout { partial }
            | F4Error::PeerClosed { partial }
            | F4Error::SocketFault { partial, .. } => Some(partial),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, F4Error>;
