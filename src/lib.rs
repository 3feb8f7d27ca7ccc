// MIT License - Copyright (c) 2026 Peter Wright
// F4 vision sensor client
//
//! # f4-sensor
//!
//! Client for F4 vision sensors: the text command protocol on TCP port
//! 49211 and the FTP job store used to move job archives on and off the
//! device.
//!
//! Commands are single lines terminated by a carriage return. Text replies
//! end with an ETX byte (0x03). Image replies are binary and end when the
//! sensor closes the connection.
//!
//! ## Quick Start
//!
//! ```no_run
//! use f4_sensor::{Sensor, SensorConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = SensorConfig::builder()
//!         .host("192.168.0.10")
//!         .online_timeout_ms(Some(30_000))
//!         .build();
//!
//!     let mut sensor = Sensor::connect(config).await?;
//!     println!("Connected to {}", sensor.camera_name().await?);
//!
//!     for job in sensor.job_list().await? {
//!         println!("slot {}: {}", job.slot, job.name);
//!     }
//!     sensor.job_load(1).await?;
//!
//!     sensor.close().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod ftp;
pub mod protocol;
pub mod sensor;
pub mod transport;

// Re-exports for convenience
pub use config::{FtpCredentials, ReceivePolicy, SensorConfig, SensorConfigBuilder};
pub use error::{F4Error, Result};
pub use ftp::{FtpClient, JobFileStore};
pub use protocol::{Attribute, AttributeKind, AttributeNumber, Command, ImageRegion, ImageRequest, JobEntry};
pub use sensor::{InfoNode, Sensor};
pub use transport::{FrameEnd, Response, SensorStream, Transport};
