// MIT License - Copyright (c) 2026 Peter Wright
// Command/response engine

use std::io;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::ReceivePolicy;
use crate::constants::ETX;
use crate::error::{F4Error, Result};
use crate::protocol::Command;
use crate::transport::direct::Endpoint;
use crate::transport::{FrameEnd, Framing, Response, SensorStream};

/// Owns the connection to one sensor and runs one command at a time.
///
/// Every exchanging method takes `&mut self`, so a second command cannot be
/// started while one is in flight. Share a transport between tasks by
/// wrapping it in a `tokio::sync::Mutex`.
pub struct Transport<S = TcpStream> {
    stream: Option<S>,
    pub(crate) endpoint: Option<Endpoint>,
    policy: ReceivePolicy,
}

impl<S: SensorStream> Transport<S> {
    /// Wrap an already-connected stream.
    pub fn from_stream(stream: S, policy: ReceivePolicy) -> Self {
        Self {
            stream: Some(stream),
            endpoint: None,
            policy,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Remote endpoint recorded at connect time.
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    pub fn policy(&self) -> &ReceivePolicy {
        &self.policy
    }

    /// Send a command whose reply ends with ETX.
    pub async fn send_framed(&mut self, command: &Command) -> Result<Response> {
        self.exchange(command, Framing::Terminator).await
    }

    /// Send a command whose reply ends only when the sensor closes the
    /// connection. ETX bytes inside the reply are data.
    pub async fn send_drain(&mut self, command: &Command) -> Result<Response> {
        self.exchange(command, Framing::Drain).await
    }

    /// Release the connection. Safe to call more than once.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            debug!("Closing sensor connection");
            if let Err(e) = stream.shutdown().await {
                debug!("Shutdown after close: {}", e);
            }
        }
    }

    pub(crate) fn attach(&mut self, stream: S) {
        self.stream = Some(stream);
    }

    async fn exchange(&mut self, command: &Command, framing: Framing) -> Result<Response> {
        let policy = self.policy;
        let stream = self.stream.as_mut().ok_or(F4Error::NotConnected)?;

        debug!("Sending command: {}", command);
        if let Err(e) = write_all(stream, &command.encode()).await {
            error!("Failed to write command {}: {}", command.verb(), e);
            self.close().await;
            return Err(F4Error::SocketFault {
                source: e,
                partial: Vec::new(),
            });
        }

        match receive(stream, framing, &policy).await {
            Ok(response) => {
                match response.end() {
                    FrameEnd::Terminator => {
                        debug!("Reply to {} complete ({} bytes)", command.verb(), response.len())
                    }
                    FrameEnd::PeerClosed => {
                        info!(
                            "Sensor closed the connection after {} ({} bytes)",
                            command.verb(),
                            response.len()
                        );
                        self.close().await;
                    }
                    FrameEnd::TimedOut => {
                        // The rest of the reply may still arrive; a later
                        // command must not read it as its own.
                        warn!(
                            "No more data for {} after {} retries ({} bytes), dropping connection",
                            command.verb(),
                            policy.retry_limit,
                            response.len()
                        );
                        self.close().await;
                    }
                }
                Ok(response)
            }
            Err((source, partial)) => {
                error!("Socket error while reading reply to {}: {}", command.verb(), source);
                self.close().await;
                Err(F4Error::SocketFault { source, partial })
            }
        }
    }
}

/// Write every byte of `buf`, resuming after short writes.
async fn write_all<S: SensorStream>(stream: &mut S, mut buf: &[u8]) -> io::Result<()> {
    while !buf.is_empty() {
        match stream.write(buf).await {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => buf = &buf[n..],
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Accumulate a reply until the framing's end condition or the retry budget.
///
/// Each would-block costs one retry and waits up to `retry_interval` for the
/// stream to become readable; a successful read resets the count.
async fn receive<S: SensorStream>(
    stream: &mut S,
    framing: Framing,
    policy: &ReceivePolicy,
) -> std::result::Result<Response, (io::Error, Vec<u8>)> {
    let mut data = Vec::new();
    // An empty buffer would read as a peer close.
    let mut chunk = vec![0u8; policy.chunk_size.max(1)];
    let mut retries = 0u32;

    loop {
        match stream.try_read(&mut chunk) {
            Ok(0) => return Ok(Response::new(data, FrameEnd::PeerClosed)),
            Ok(n) => {
                retries = 0;
                data.extend_from_slice(&chunk[..n]);
                if framing == Framing::Terminator && chunk[n - 1] == ETX {
                    return Ok(Response::new(data, FrameEnd::Terminator));
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                if retries >= policy.retry_limit {
                    return Ok(Response::new(data, FrameEnd::TimedOut));
                }
                retries += 1;
                // A readiness error shows up again on the next read.
                let _ = timeout(policy.retry_interval, stream.readable()).await;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err((e, data)),
        }
    }
}
