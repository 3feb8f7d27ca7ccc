// MIT License - Copyright (c) 2026 Peter Wright
// Direct TCP connection to the sensor

use std::fmt;
use std::io;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, warn};

use crate::config::ReceivePolicy;
use crate::error::{F4Error, Result};
use crate::transport::{SensorStream, Transport};

/// Host and port of a sensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl SensorStream for TcpStream {
    async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        AsyncWriteExt::write(self, buf).await
    }

    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        TcpStream::try_read(self, buf)
    }

    async fn readable(&self) -> io::Result<()> {
        TcpStream::readable(self).await
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        AsyncWriteExt::shutdown(self).await
    }
}

/// Open a TCP connection, bounded by `connect_timeout`.
pub(crate) async fn open_stream(endpoint: &Endpoint, connect_timeout: Duration) -> Result<TcpStream> {
    let addr = endpoint.to_string();
    let stream = match timeout(
        connect_timeout,
        TcpStream::connect((endpoint.host.as_str(), endpoint.port)),
    )
    .await
    {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            error!("TCP connect to {} failed: {}", addr, e);
            return Err(F4Error::Connection { addr, source: e });
        }
        Err(_) => {
            error!("TCP connect to {} timed out", addr);
            return Err(F4Error::ConnectionTimeout { addr });
        }
    };

    // Commands are single short lines; don't let Nagle hold them back.
    if let Err(e) = stream.set_nodelay(true) {
        warn!("Could not disable Nagle on {}: {}", addr, e);
    }
    debug!("TCP socket connected to {}", addr);
    Ok(stream)
}

impl Transport<TcpStream> {
    /// Connect to a sensor and record its endpoint.
    pub async fn connect(
        host: &str,
        port: u16,
        policy: ReceivePolicy,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let endpoint = Endpoint {
            host: host.to_string(),
            port,
        };
        info!("Connecting to sensor at {}", endpoint);
        let stream = open_stream(&endpoint, connect_timeout).await?;
        let mut transport = Transport::from_stream(stream, policy);
        transport.endpoint = Some(endpoint);
        Ok(transport)
    }

    /// Drop any current connection and connect again to the recorded endpoint.
    pub async fn reconnect(&mut self, connect_timeout: Duration) -> Result<()> {
        let endpoint = self.endpoint.clone().ok_or(F4Error::NotConnected)?;
        self.close().await;
        info!("Reconnecting to sensor at {}", endpoint);
        let stream = open_stream(&endpoint, connect_timeout).await?;
        self.attach(stream);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Command;
    use crate::transport::FrameEnd;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_and_exchange_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 64];
            let n = socket.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"GET int4\r");
            socket.write_all(b"42\r\n").await.unwrap();
            socket.write_all(b"\x03").await.unwrap();
        });

        let mut transport = Transport::connect(
            "127.0.0.1",
            port,
            ReceivePolicy::default(),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert_eq!(transport.endpoint().unwrap().port, port);

        let response = transport.send_framed(&Command::get("int4")).await.unwrap();
        assert_eq!(response.end(), FrameEnd::Terminator);
        assert_eq!(response.text(), "42");

        server.await.unwrap();
        transport.close().await;
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port nothing is listening on.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let result = Transport::connect(
            "127.0.0.1",
            port,
            ReceivePolicy::default(),
            Duration::from_secs(5),
        )
        .await;
        assert!(matches!(result, Err(F4Error::Connection { .. })));
    }

    #[test]
    fn test_endpoint_display() {
        let endpoint = Endpoint {
            host: "10.1.1.5".to_string(),
            port: 49211,
        };
        assert_eq!(endpoint.to_string(), "10.1.1.5:49211");
    }
}
