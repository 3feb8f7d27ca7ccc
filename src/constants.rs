// MIT License - Copyright (c) 2026 Peter Wright
// Protocol constants

/// Protocol framing bytes.
pub const ETX: u8 = 0x03; // End of text reply
pub const CR: u8 = b'\r'; // Command terminator

/// Default TCP port of the sensor's command interface.
pub const DEFAULT_PORT: u16 = 49211;

/// Default FTP control port used for job archive transfer.
pub const DEFAULT_FTP_PORT: u16 = 21;

/// Default FTP credentials of the sensor.
pub const DEFAULT_FTP_USERNAME: &str = "target";
pub const DEFAULT_FTP_PASSWORD: &str = "password";

/// Device-side directory holding saved job archives.
pub const FTP_JOB_DIRECTORY: &str = "/sd0:0/Jobs/Job1";

/// Attribute numbers are 1-based, 200 slots per attribute type.
pub const ATTRIBUTE_MIN: u32 = 1;
pub const ATTRIBUTE_MAX: u32 = 200;

/// `ONLINE?` reply when the sensor is running its job.
pub const ONLINE_SENTINEL: &str = "!1";

/// Device tree path of the sensor's configured name.
pub const SYSTEM_NAME_PATH: &str = "system.name";

/// Receive loop defaults: 100 retries of 10 ms, read 1024 bytes at a time.
pub const DEFAULT_RETRY_LIMIT: u32 = 100;
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 10;
pub const DEFAULT_READ_CHUNK: usize = 1024;

/// Delay between `ONLINE?` polls while waiting for a loaded job to start.
pub const DEFAULT_ONLINE_POLL_INTERVAL_MS: u64 = 100;

pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;

/// Timestamp layout used to name a saved copy of the running job.
pub const JOB_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";
