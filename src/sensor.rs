// MIT License - Copyright (c) 2026 Peter Wright
// Sensor client

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::Local;
use tokio::net::TcpStream;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::{FtpCredentials, SensorConfig};
use crate::constants::{FTP_JOB_DIRECTORY, JOB_TIMESTAMP_FORMAT, ONLINE_SENTINEL, SYSTEM_NAME_PATH};
use crate::error::{F4Error, Result};
use crate::ftp::{FtpClient, JobFileStore};
use crate::protocol::{
    decode_lines, decode_text, next_available_slot, parse_job_list, Attribute, AttributeKind,
    Command, ImageRequest, JobEntry,
};
use crate::transport::{Response, SensorStream, Transport};

/// One entry of the sensor's `INFO` tree.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct InfoNode {
    /// Nesting level, 0 for children of the starting path.
    pub depth: usize,
    /// Dotted path usable with `INFO`, e.g. `system.name`.
    pub path: String,
    pub name: String,
}

/// The main public API for talking to a sensor.
///
/// # Example
///
/// ```no_run
/// use f4_sensor::{Sensor, SensorConfig};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = SensorConfig::builder().host("192.168.0.10").build();
///     let mut sensor = Sensor::connect(config).await?;
///
///     sensor.set_bool(3, true).await?;
///     let count = sensor.get_long(1).await?;
///     println!("count = {count}");
///
///     sensor.close().await;
///     Ok(())
/// }
/// ```
pub struct Sensor<S = TcpStream> {
    transport: Transport<S>,
    config: SensorConfig,
    camera_name: Option<String>,
}

impl Sensor<TcpStream> {
    /// Connect to the sensor described by `config`.
    pub async fn connect(config: SensorConfig) -> Result<Self> {
        let transport = Transport::connect(
            &config.host,
            config.port,
            config.receive_policy(),
            config.connect_timeout(),
        )
        .await?;
        info!("Connected to sensor at {}:{}", config.host, config.port);
        Ok(Self::with_transport(transport, config))
    }

    /// Re-open the command connection, e.g. after an image transfer closed it.
    pub async fn reconnect(&mut self) -> Result<()> {
        self.transport.reconnect(self.config.connect_timeout()).await
    }

    /// Open an FTP session to the same sensor for job transfer.
    pub async fn open_ftp(&self, credentials: &FtpCredentials) -> Result<FtpClient> {
        FtpClient::connect(
            &self.config.host,
            self.config.ftp_port,
            credentials,
            self.config.connect_timeout(),
        )
        .await
    }
}

impl<S: SensorStream> Sensor<S> {
    pub fn with_transport(transport: Transport<S>, config: SensorConfig) -> Self {
        Self {
            transport,
            config,
            camera_name: None,
        }
    }

    pub fn config(&self) -> &SensorConfig {
        &self.config
    }

    pub fn transport(&mut self) -> &mut Transport<S> {
        &mut self.transport
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub async fn close(&mut self) {
        info!("Closing sensor connection");
        self.transport.close().await;
    }

    async fn exchange_text(&mut self, command: &Command) -> Result<Vec<u8>> {
        self.transport.send_framed(command).await?.into_terminated()
    }

    async fn command_text(&mut self, command: &Command) -> Result<String> {
        let raw = self.exchange_text(command).await?;
        let text = decode_text(&raw);
        debug!("{} -> {:?}", command.verb(), text);
        Ok(text)
    }

    async fn command_lines(&mut self, command: &Command) -> Result<Vec<String>> {
        let raw = self.exchange_text(command).await?;
        Ok(decode_lines(&raw))
    }

    // -- Device information -------------------------------------------------

    /// The sensor's configured name, fetched once and cached.
    pub async fn camera_name(&mut self) -> Result<String> {
        if let Some(name) = &self.camera_name {
            return Ok(name.clone());
        }
        let name = self.command_text(&Command::get(SYSTEM_NAME_PATH)).await?;
        self.camera_name = Some(name.clone());
        Ok(name)
    }

    pub async fn help(&mut self) -> Result<String> {
        self.command_text(&Command::help()).await
    }

    /// Children of `path` in the sensor's information tree (the root if `None`).
    pub async fn info(&mut self, path: Option<&str>) -> Result<Vec<String>> {
        self.command_lines(&Command::info(path)).await
    }

    /// Walk the information tree below `start` in pre-order, descending at
    /// most `max_depth` levels.
    pub async fn info_tree(&mut self, start: &str, max_depth: usize) -> Result<Vec<InfoNode>> {
        let mut nodes = Vec::new();
        if max_depth == 0 {
            return Ok(nodes);
        }

        let mut stack = self.info_children(start, 0).await?;
        stack.reverse();
        while let Some(node) = stack.pop() {
            if node.depth + 1 < max_depth {
                let mut children = self.info_children(&node.path, node.depth + 1).await?;
                children.reverse();
                stack.extend(children);
            }
            nodes.push(node);
        }
        Ok(nodes)
    }

    async fn info_children(&mut self, parent: &str, depth: usize) -> Result<Vec<InfoNode>> {
        let names = self.info(Some(parent)).await?;
        Ok(names
            .into_iter()
            .map(|name| {
                let name = name.trim().to_string();
                let path = if parent.is_empty() {
                    name.clone()
                } else {
                    format!("{parent}.{name}")
                };
                InfoNode { depth, path, name }
            })
            .collect())
    }

    // -- Inspection and images ---------------------------------------------

    /// Trigger one inspection. The reply is returned raw.
    ///
    /// The reply is read until the sensor goes quiet, which drops the
    /// connection; call [`Sensor::reconnect`] before the next command.
    pub async fn trigger(&mut self) -> Result<Response> {
        self.transport.send_drain(&Command::trigger()).await
    }

    /// Fetch an image. The sensor ends the transfer by closing the command
    /// connection, so call [`Sensor::reconnect`] before the next command.
    /// A transfer that stalls also leaves the sensor disconnected.
    pub async fn get_image(&mut self, request: &ImageRequest) -> Result<Response> {
        if request.region.is_some() {
            debug!("Image region is not part of GETIMAGE; requesting the full image");
        }
        let response = self.transport.send_drain(&Command::get_image(request)).await?;
        if response.is_timed_out() {
            warn!("Image transfer ended without the sensor closing the connection");
        }
        Ok(response)
    }

    /// Fetch an image and write its bytes verbatim to `path`.
    pub async fn save_image(&mut self, request: &ImageRequest, path: impl AsRef<Path>) -> Result<usize> {
        let response = self.get_image(request).await?;
        tokio::fs::write(path.as_ref(), response.bytes()).await?;
        info!("Saved {} image bytes to {}", response.len(), path.as_ref().display());
        Ok(response.len())
    }

    // -- Attributes ---------------------------------------------------------

    async fn get_attribute(&mut self, attribute: Attribute) -> Result<String> {
        self.command_text(&Command::get(attribute)).await
    }

    async fn set_attribute(&mut self, attribute: Attribute, value: impl fmt::Display) -> Result<String> {
        self.command_text(&Command::set(attribute, value)).await
    }

    async fn get_parsed<T: FromStr>(&mut self, attribute: Attribute) -> Result<T> {
        let text = self.get_attribute(attribute).await?;
        text.trim()
            .parse::<T>()
            .map_err(|_| F4Error::Parse { attribute, value: text })
    }

    /// Get the string stored at the given attribute number.
    pub async fn get_string(&mut self, number: u32) -> Result<String> {
        let attribute = Attribute::checked(AttributeKind::String, number)?;
        self.get_attribute(attribute).await
    }

    /// Set the string stored at the given attribute number.
    pub async fn set_string(&mut self, number: u32, value: &str) -> Result<String> {
        let attribute = Attribute::checked(AttributeKind::String, number)?;
        self.set_attribute(attribute, value).await
    }

    /// Get a boolean; the sensor reports true as `1`.
    pub async fn get_bool(&mut self, number: u32) -> Result<bool> {
        let attribute = Attribute::checked(AttributeKind::Bool, number)?;
        Ok(self.get_attribute(attribute).await? == "1")
    }

    pub async fn set_bool(&mut self, number: u32, value: bool) -> Result<String> {
        let attribute = Attribute::checked(AttributeKind::Bool, number)?;
        self.set_attribute(attribute, if value { "1" } else { "0" }).await
    }

    /// Get a 16-bit integer.
    pub async fn get_int(&mut self, number: u32) -> Result<i16> {
        let attribute = Attribute::checked(AttributeKind::Int, number)?;
        self.get_parsed(attribute).await
    }

    pub async fn set_int(&mut self, number: u32, value: i16) -> Result<String> {
        let attribute = Attribute::checked(AttributeKind::Int, number)?;
        self.set_attribute(attribute, value).await
    }

    /// Get a 32-bit integer.
    pub async fn get_long(&mut self, number: u32) -> Result<i32> {
        let attribute = Attribute::checked(AttributeKind::Long, number)?;
        self.get_parsed(attribute).await
    }

    pub async fn set_long(&mut self, number: u32, value: i32) -> Result<String> {
        let attribute = Attribute::checked(AttributeKind::Long, number)?;
        self.set_attribute(attribute, value).await
    }

    pub async fn get_float(&mut self, number: u32) -> Result<f64> {
        let attribute = Attribute::checked(AttributeKind::Float, number)?;
        self.get_parsed(attribute).await
    }

    pub async fn set_float(&mut self, number: u32, value: f64) -> Result<String> {
        let attribute = Attribute::checked(AttributeKind::Float, number)?;
        self.set_attribute(attribute, value).await
    }

    // -- Online state -------------------------------------------------------

    pub async fn go_offline(&mut self) -> Result<String> {
        self.command_text(&Command::offline()).await
    }

    pub async fn go_online(&mut self) -> Result<String> {
        self.command_text(&Command::online()).await
    }

    /// Raw `ONLINE?` reply; `!1` while the job is running.
    pub async fn online_status(&mut self) -> Result<String> {
        self.command_text(&Command::online_status()).await
    }

    pub async fn is_online(&mut self) -> Result<bool> {
        Ok(self.online_status().await? == ONLINE_SENTINEL)
    }

    /// Poll `ONLINE?` until the sensor reports online.
    ///
    /// With `limit` set to `None` this waits indefinitely. A poll that gets
    /// no reply within the retry budget fails with `ResponseTimeout` and
    /// leaves the sensor disconnected.
    pub async fn wait_online(&mut self, limit: Option<Duration>) -> Result<()> {
        let started = Instant::now();
        let interval = self.config.online_poll_interval();
        loop {
            if self.is_online().await? {
                return Ok(());
            }
            if let Some(limit) = limit {
                if started.elapsed() >= limit {
                    return Err(F4Error::OnlineTimeout {
                        waited_ms: started.elapsed().as_millis() as u64,
                    });
                }
            }
            sleep(interval).await;
        }
    }

    // -- Jobs ---------------------------------------------------------------

    pub async fn job_save(&mut self, slot: Option<u32>) -> Result<String> {
        self.command_text(&Command::job_save(slot)).await
    }

    pub async fn job_save_as(&mut self, name: &str, slot: Option<u32>) -> Result<String> {
        self.command_text(&Command::job_save_as(name, slot)).await
    }

    /// Load and run the job in `slot`, then wait for the sensor to come back
    /// online. Waits indefinitely unless `online_timeout_ms` is configured.
    pub async fn job_load(&mut self, slot: u32) -> Result<String> {
        let limit = self.config.online_timeout();
        self.load_job(slot, limit).await
    }

    /// As [`Sensor::job_load`], failing with `OnlineTimeout` after `limit`.
    pub async fn job_load_with_timeout(&mut self, slot: u32, limit: Duration) -> Result<String> {
        self.load_job(slot, Some(limit)).await
    }

    async fn load_job(&mut self, slot: u32, limit: Option<Duration>) -> Result<String> {
        let reply = self.command_text(&Command::job_load(slot)).await?;
        info!("Loaded job slot {}: {}", slot, reply);
        self.go_online().await?;
        self.wait_online(limit).await?;
        Ok(reply)
    }

    pub async fn job_delete(&mut self, slot: u32) -> Result<String> {
        self.command_text(&Command::job_delete(slot)).await
    }

    pub async fn job_delete_all(&mut self) -> Result<String> {
        self.command_text(&Command::job_delete_all()).await
    }

    /// `JOBINFO` reply: the job listing, or one slot's entry with a query.
    pub async fn job_info(&mut self, query: Option<&str>) -> Result<String> {
        self.command_text(&Command::job_info(query)).await
    }

    pub async fn job_download(&mut self, size_in_bytes: Option<u64>) -> Result<String> {
        self.command_text(&Command::job_download(size_in_bytes)).await
    }

    pub async fn job_download_cancel(&mut self) -> Result<String> {
        self.command_text(&Command::job_download_cancel()).await
    }

    /// Jobs stored on the sensor, in the order it lists them.
    pub async fn job_list(&mut self) -> Result<Vec<JobEntry>> {
        let listing = self.job_info(None).await?;
        parse_job_list(&listing)
    }

    pub async fn used_job_slots(&mut self) -> Result<Vec<u32>> {
        Ok(self.job_list().await?.into_iter().map(|job| job.slot).collect())
    }

    /// First unused slot; `None` when the used slots run 1..=n without a gap.
    pub async fn next_available_slot(&mut self) -> Result<Option<u32>> {
        let used = self.used_job_slots().await?;
        Ok(next_available_slot(&used))
    }

    // -- Job transfer -------------------------------------------------------

    /// Copy the job archive in `slot` to `local_dir`, named as on the sensor.
    pub async fn transfer_job_from_sensor<F: JobFileStore>(
        &mut self,
        store: &mut F,
        slot: u32,
        local_dir: &Path,
    ) -> Result<PathBuf> {
        let entry = self.job_info(Some(&slot.to_string())).await?;
        let name = job_file_name(&entry)?;
        let remote_name = format!("slot{slot}_{name}");

        let data = store.retrieve(FTP_JOB_DIRECTORY, &remote_name).await?;
        let local_path = local_dir.join(&name);
        tokio::fs::write(&local_path, &data).await?;
        info!(
            "Transferred job slot {} to {} ({} bytes)",
            slot,
            local_path.display(),
            data.len()
        );
        Ok(local_path)
    }

    /// Save the running job to a free slot under a timestamped name, copy it
    /// to `local_dir`, then delete that slot again.
    pub async fn transfer_running_job_from_sensor<F: JobFileStore>(
        &mut self,
        store: &mut F,
        local_dir: &Path,
    ) -> Result<PathBuf> {
        let used = self.used_job_slots().await?;
        let slot = next_available_slot(&used)
            .unwrap_or_else(|| used.last().map_or(1, |last| last + 1));
        let name = format!(
            "{}_{}",
            Local::now().format(JOB_TIMESTAMP_FORMAT),
            self.camera_name().await?
        );

        self.job_save_as(&name, Some(slot)).await?;
        let transferred = self.transfer_job_from_sensor(store, slot, local_dir).await;
        let deleted = self.job_delete(slot).await;
        let path = transferred?;
        deleted?;
        Ok(path)
    }

    /// Upload a local job archive into `slot`'s file on the sensor.
    pub async fn transfer_job_to_sensor<F: JobFileStore>(
        &mut self,
        store: &mut F,
        local_file: &Path,
        slot: u32,
    ) -> Result<String> {
        let file_name = local_file
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| F4Error::InvalidResponse {
                details: format!("not a job file path: {}", local_file.display()),
            })?;
        let remote_name = format!("slot{slot}_{file_name}");
        let data = tokio::fs::read(local_file).await?;
        store.store(FTP_JOB_DIRECTORY, &remote_name, &data).await?;
        info!("Uploaded {} to {} ({} bytes)", local_file.display(), remote_name, data.len());
        Ok(remote_name)
    }
}

/// File name of a job from a `jobN=name` reply, reduced to its last path
/// component so it can't escape the target directory.
fn job_file_name(reply: &str) -> Result<String> {
    let invalid = || F4Error::InvalidResponse {
        details: format!("job entry: {reply:?}"),
    };
    let (_, name) = reply.split_once('=').ok_or_else(invalid)?;
    Path::new(name.trim())
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(invalid)
}
