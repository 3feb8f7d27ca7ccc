// MIT License - Copyright (c) 2026 Peter Wright
// Connection configuration

use tokio::time::Duration;

use crate::constants::{
    DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_FTP_PASSWORD, DEFAULT_FTP_PORT, DEFAULT_FTP_USERNAME,
    DEFAULT_ONLINE_POLL_INTERVAL_MS, DEFAULT_PORT, DEFAULT_READ_CHUNK, DEFAULT_RETRY_INTERVAL_MS,
    DEFAULT_RETRY_LIMIT,
};

/// Configuration for connecting to a sensor.
#[derive(Debug, Clone)]
pub struct SensorConfig {
    /// Sensor IP address or host name
    pub host: String,
    /// Command port (default: 49211)
    pub port: u16,
    /// TCP connect timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Consecutive would-block retries before a receive gives up (default: 100)
    pub retry_limit: u32,
    /// Wait per retry in milliseconds (default: 10)
    pub retry_interval_ms: u64,
    /// Bytes requested per socket read (default: 1024)
    pub read_chunk_size: usize,
    /// Delay between `ONLINE?` polls after a job load (default: 100)
    pub online_poll_interval_ms: u64,
    /// Upper bound on waiting for the sensor to come online after a job
    /// load. `None` waits indefinitely.
    pub online_timeout_ms: Option<u64>,
    /// FTP control port used for job transfer (default: 21)
    pub ftp_port: u16,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            host: "192.168.0.10".to_string(),
            port: DEFAULT_PORT,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            retry_limit: DEFAULT_RETRY_LIMIT,
            retry_interval_ms: DEFAULT_RETRY_INTERVAL_MS,
            read_chunk_size: DEFAULT_READ_CHUNK,
            online_poll_interval_ms: DEFAULT_ONLINE_POLL_INTERVAL_MS,
            online_timeout_ms: None,
            ftp_port: DEFAULT_FTP_PORT,
        }
    }
}

impl SensorConfig {
    /// Create a new config builder starting from defaults.
    pub fn builder() -> SensorConfigBuilder {
        SensorConfigBuilder::default()
    }

    /// Receive loop settings derived from this config.
    pub fn receive_policy(&self) -> ReceivePolicy {
        ReceivePolicy {
            retry_limit: self.retry_limit,
            retry_interval: Duration::from_millis(self.retry_interval_ms),
            chunk_size: self.read_chunk_size.max(1),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn online_poll_interval(&self) -> Duration {
        Duration::from_millis(self.online_poll_interval_ms)
    }

    pub fn online_timeout(&self) -> Option<Duration> {
        self.online_timeout_ms.map(Duration::from_millis)
    }
}

/// Builder for SensorConfig.
#[derive(Debug, Clone, Default)]
pub struct SensorConfigBuilder {
    config: SensorConfig,
}

impl SensorConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connect_timeout_ms = ms;
        self
    }

    pub fn retry_limit(mut self, retries: u32) -> Self {
        self.config.retry_limit = retries;
        self
    }

    pub fn retry_interval_ms(mut self, ms: u64) -> Self {
        self.config.retry_interval_ms = ms;
        self
    }

    pub fn read_chunk_size(mut self, bytes: usize) -> Self {
        self.config.read_chunk_size = bytes;
        self
    }

    pub fn online_poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.online_poll_interval_ms = ms;
        self
    }

    pub fn online_timeout_ms(mut self, ms: Option<u64>) -> Self {
        self.config.online_timeout_ms = ms;
        self
    }

    pub fn ftp_port(mut self, port: u16) -> Self {
        self.config.ftp_port = port;
        self
    }

    pub fn build(self) -> SensorConfig {
        self.config
    }
}

/// How a receive loop reads and when it gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceivePolicy {
    pub retry_limit: u32,
    pub retry_interval: Duration,
    pub chunk_size: usize,
}

impl Default for ReceivePolicy {
    fn default() -> Self {
        SensorConfig::default().receive_policy()
    }
}

/// FTP login for job archive transfer. Supplied per call, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtpCredentials {
    pub username: String,
    pub password: String,
}

impl FtpCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl Default for FtpCredentials {
    fn default() -> Self {
        Self::new(DEFAULT_FTP_USERNAME, DEFAULT_FTP_PASSWORD)
    }
}
