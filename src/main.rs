// MIT License - Copyright (c) 2026 Peter Wright
// Command line front end

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::Duration;
use tracing::{debug, info};

use f4_sensor::constants::{DEFAULT_FTP_PASSWORD, DEFAULT_FTP_PORT, DEFAULT_FTP_USERNAME, DEFAULT_PORT};
use f4_sensor::{Attribute, AttributeKind, FtpCredentials, ImageRequest, Sensor, SensorConfig};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "f4ctl")]
#[command(about = "Control an F4 vision sensor over its TCP command port")]
#[command(disable_help_subcommand = true)]
struct Cli {
    /// Path to an optional TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Sensor address, overrides the config file
    #[arg(long)]
    host: Option<String>,

    /// Command port, overrides the config file
    #[arg(long)]
    port: Option<u16>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read an attribute, e.g. `get long3`
    Get { attribute: String },
    /// Write an attribute, e.g. `set bool12 1`
    Set { attribute: String, value: String },
    /// Show the sensor's own command help (use --help for f4ctl)
    Help,
    /// List the information tree below a path
    Info {
        path: Option<String>,
        /// Walk the whole tree instead of one level
        #[arg(long)]
        tree: bool,
        /// Levels to descend with --tree
        #[arg(long, default_value_t = 4)]
        depth: usize,
    },
    /// Trigger one inspection
    Trigger,
    /// Save an image to a file
    Image {
        output: PathBuf,
        #[arg(long)]
        format: Option<String>,
        #[arg(long)]
        quality: Option<u8>,
        #[arg(long)]
        inspection: Option<u32>,
    },
    /// Put the sensor online
    Online,
    /// Take the sensor offline
    Offline,
    /// Report whether the sensor is online
    Status,
    /// List stored jobs
    Jobs,
    /// Job slot management
    Job {
        #[command(subcommand)]
        command: JobCommand,
    },
    /// Copy a stored job to a local directory
    Pull {
        slot: u32,
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
    /// Copy the running job to a local directory
    PullRunning {
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
    /// Upload a local job archive into a slot
    Push { file: PathBuf, slot: u32 },
}

#[derive(Subcommand)]
enum JobCommand {
    /// Save the running job, optionally to a given slot
    Save { slot: Option<u32> },
    /// Save the running job under a new name
    SaveAs {
        name: String,
        #[arg(long)]
        slot: Option<u32>,
    },
    /// Load a job and wait for the sensor to come online
    Load {
        slot: u32,
        /// Give up waiting for online after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Delete the job in a slot
    Delete { slot: u32 },
    /// Delete every stored job
    DeleteAll,
    /// Print the first free slot
    NextSlot,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct Config {
    #[serde(default)]
    sensor: SensorToml,
    #[serde(default)]
    ftp: FtpToml,
}

#[derive(Debug, Deserialize)]
struct SensorToml {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_connect_timeout")]
    connect_timeout_ms: u64,
    #[serde(default = "default_retry_limit")]
    retry_limit: u32,
    #[serde(default = "default_retry_interval")]
    retry_interval_ms: u64,
    #[serde(default = "default_read_chunk")]
    read_chunk_size: usize,
    #[serde(default = "default_online_poll_interval")]
    online_poll_interval_ms: u64,
    #[serde(default)]
    online_timeout_ms: Option<u64>,
}

impl Default for SensorToml {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            connect_timeout_ms: default_connect_timeout(),
            retry_limit: default_retry_limit(),
            retry_interval_ms: default_retry_interval(),
            read_chunk_size: default_read_chunk(),
            online_poll_interval_ms: default_online_poll_interval(),
            online_timeout_ms: None,
        }
    }
}

fn default_host() -> String {
    SensorConfig::default().host
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_connect_timeout() -> u64 {
    SensorConfig::default().connect_timeout_ms
}
fn default_retry_limit() -> u32 {
    SensorConfig::default().retry_limit
}
fn default_retry_interval() -> u64 {
    SensorConfig::default().retry_interval_ms
}
fn default_read_chunk() -> usize {
    SensorConfig::default().read_chunk_size
}
fn default_online_poll_interval() -> u64 {
    SensorConfig::default().online_poll_interval_ms
}

#[derive(Debug, Deserialize)]
struct FtpToml {
    #[serde(default = "default_ftp_port")]
    port: u16,
    #[serde(default = "default_ftp_username")]
    username: String,
    #[serde(default = "default_ftp_password")]
    password: String,
}

impl Default for FtpToml {
    fn default() -> Self {
        Self {
            port: default_ftp_port(),
            username: default_ftp_username(),
            password: default_ftp_password(),
        }
    }
}

fn default_ftp_port() -> u16 {
    DEFAULT_FTP_PORT
}
fn default_ftp_username() -> String {
    DEFAULT_FTP_USERNAME.to_string()
}
fn default_ftp_password() -> String {
    DEFAULT_FTP_PASSWORD.to_string()
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    toml::from_str(&text).context("Failed to parse config file")
}

fn build_sensor_config(cli: &Cli, config: &Config) -> SensorConfig {
    let sensor = &config.sensor;
    SensorConfig::builder()
        .host(cli.host.clone().unwrap_or_else(|| sensor.host.clone()))
        .port(cli.port.unwrap_or(sensor.port))
        .connect_timeout_ms(sensor.connect_timeout_ms)
        .retry_limit(sensor.retry_limit)
        .retry_interval_ms(sensor.retry_interval_ms)
        .read_chunk_size(sensor.read_chunk_size)
        .online_poll_interval_ms(sensor.online_poll_interval_ms)
        .online_timeout_ms(sensor.online_timeout_ms)
        .ftp_port(config.ftp.port)
        .build()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse an attribute name such as `bool12` or `float7`.
fn parse_attribute(name: &str) -> Result<Attribute> {
    let split = name
        .find(|c: char| c.is_ascii_digit())
        .with_context(|| format!("Attribute {name:?} has no number"))?;
    let (prefix, number) = name.split_at(split);
    let Some(kind) = AttributeKind::from_prefix(prefix) else {
        bail!("Unknown attribute type {prefix:?} (expected string, bool, int, long or float)");
    };
    let number: u32 = number
        .parse()
        .with_context(|| format!("Invalid attribute number in {name:?}"))?;
    Ok(Attribute::checked(kind, number)?)
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" => Ok(true),
        "0" | "false" | "off" => Ok(false),
        _ => bail!("Invalid boolean value {value:?}"),
    }
}

/// Print `text`, or `value` as JSON when `--json` was given.
fn emit(json_output: bool, value: Value, text: impl std::fmt::Display) -> Result<()> {
    if json_output {
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{text}");
    }
    Ok(())
}

async fn get_attribute(sensor: &mut Sensor, attribute: Attribute) -> Result<Value> {
    let n = attribute.number.get();
    let value = match attribute.kind {
        AttributeKind::String => json!(sensor.get_string(n).await?),
        AttributeKind::Bool => json!(sensor.get_bool(n).await?),
        AttributeKind::Int => json!(sensor.get_int(n).await?),
        AttributeKind::Long => json!(sensor.get_long(n).await?),
        AttributeKind::Float => json!(sensor.get_float(n).await?),
    };
    Ok(value)
}

async fn set_attribute(sensor: &mut Sensor, attribute: Attribute, value: &str) -> Result<String> {
    let n = attribute.number.get();
    let reply = match attribute.kind {
        AttributeKind::String => sensor.set_string(n, value).await?,
        AttributeKind::Bool => sensor.set_bool(n, parse_bool(value)?).await?,
        AttributeKind::Int => {
            let v: i16 = value.parse().with_context(|| format!("Invalid int value {value:?}"))?;
            sensor.set_int(n, v).await?
        }
        AttributeKind::Long => {
            let v: i32 = value.parse().with_context(|| format!("Invalid long value {value:?}"))?;
            sensor.set_long(n, v).await?
        }
        AttributeKind::Float => {
            let v: f64 = value.parse().with_context(|| format!("Invalid float value {value:?}"))?;
            sensor.set_float(n, v).await?
        }
    };
    Ok(reply)
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

async fn run(cli: &Cli, sensor: &mut Sensor, credentials: &FtpCredentials) -> Result<()> {
    let json_output = cli.json;
    match &cli.command {
        Commands::Get { attribute } => {
            let attribute = parse_attribute(attribute)?;
            let value = get_attribute(sensor, attribute).await?;
            let text = match &value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            emit(json_output, json!({ "attribute": attribute.to_string(), "value": value }), text)
        }
        Commands::Set { attribute, value } => {
            let attribute = parse_attribute(attribute)?;
            let reply = set_attribute(sensor, attribute, value).await?;
            emit(json_output, json!({ "attribute": attribute.to_string(), "reply": reply }), reply)
        }
        Commands::Help => {
            let text = sensor.help().await?;
            emit(json_output, json!({ "help": text }), &text)
        }
        Commands::Info { path, tree, depth } => {
            if *tree {
                let nodes = sensor.info_tree(path.as_deref().unwrap_or(""), *depth).await?;
                let text = nodes
                    .iter()
                    .map(|node| format!("{}{}", "  ".repeat(node.depth), node.name))
                    .collect::<Vec<_>>()
                    .join("\n");
                emit(json_output, serde_json::to_value(&nodes)?, text)
            } else {
                let entries = sensor.info(path.as_deref()).await?;
                emit(json_output, json!(entries), entries.join("\n"))
            }
        }
        Commands::Trigger => {
            let response = sensor.trigger().await?;
            let text = response.text();
            emit(
                json_output,
                json!({ "bytes": response.len(), "end": format!("{:?}", response.end()), "reply": text }),
                &text,
            )
        }
        Commands::Image {
            output,
            format,
            quality,
            inspection,
        } => {
            let request = ImageRequest {
                format: format.clone(),
                quality: *quality,
                inspection: *inspection,
                region: None,
            };
            let bytes = sensor.save_image(&request, output).await?;
            emit(
                json_output,
                json!({ "path": output, "bytes": bytes }),
                format!("Saved {} bytes to {}", bytes, output.display()),
            )
        }
        Commands::Online => {
            let reply = sensor.go_online().await?;
            emit(json_output, json!({ "reply": reply }), reply)
        }
        Commands::Offline => {
            let reply = sensor.go_offline().await?;
            emit(json_output, json!({ "reply": reply }), reply)
        }
        Commands::Status => {
            let online = sensor.is_online().await?;
            emit(
                json_output,
                json!({ "online": online, "checked": Utc::now().to_rfc3339() }),
                if online { "online" } else { "offline" },
            )
        }
        Commands::Jobs => {
            let jobs = sensor.job_list().await?;
            let text = jobs
                .iter()
                .map(|job| format!("{:>3}  {}", job.slot, job.name))
                .collect::<Vec<_>>()
                .join("\n");
            emit(json_output, serde_json::to_value(&jobs)?, text)
        }
        Commands::Job { command } => run_job_command(json_output, sensor, command).await,
        Commands::Pull { slot, dir } => {
            let mut ftp = sensor.open_ftp(credentials).await?;
            let path = sensor.transfer_job_from_sensor(&mut ftp, *slot, dir).await?;
            ftp.quit().await?;
            emit(json_output, json!({ "path": path }), path.display())
        }
        Commands::PullRunning { dir } => {
            let mut ftp = sensor.open_ftp(credentials).await?;
            let path = sensor.transfer_running_job_from_sensor(&mut ftp, dir).await?;
            ftp.quit().await?;
            emit(json_output, json!({ "path": path }), path.display())
        }
        Commands::Push { file, slot } => {
            let mut ftp = sensor.open_ftp(credentials).await?;
            let remote = sensor.transfer_job_to_sensor(&mut ftp, file, *slot).await?;
            ftp.quit().await?;
            emit(json_output, json!({ "remote": remote }), remote)
        }
    }
}

async fn run_job_command(json_output: bool, sensor: &mut Sensor, command: &JobCommand) -> Result<()> {
    let reply = match command {
        JobCommand::Save { slot } => sensor.job_save(*slot).await?,
        JobCommand::SaveAs { name, slot } => sensor.job_save_as(name, *slot).await?,
        JobCommand::Load { slot, timeout_ms } => match timeout_ms {
            Some(ms) => sensor.job_load_with_timeout(*slot, Duration::from_millis(*ms)).await?,
            None => sensor.job_load(*slot).await?,
        },
        JobCommand::Delete { slot } => sensor.job_delete(*slot).await?,
        JobCommand::DeleteAll => sensor.job_delete_all().await?,
        JobCommand::NextSlot => {
            let slot = sensor.next_available_slot().await?;
            let text = slot.map_or_else(|| "none".to_string(), |s| s.to_string());
            return emit(json_output, json!({ "slot": slot }), text);
        }
    };
    emit(json_output, json!({ "reply": reply }), reply)
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

/// Log filter used when RUST_LOG is unset.
const DEFAULT_LOG_FILTER: &str = "info";

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity (e.g. RUST_LOG=debug or RUST_LOG=f4_sensor=trace).
    // Default: info. Logs go to stderr so command output on stdout stays parseable.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));

    // systemd journal already adds timestamps, so omit them when running under systemd
    if std::env::var_os("JOURNAL_STREAM").is_some() {
        tracing_subscriber::fmt()
            .without_time()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    let sensor_config = build_sensor_config(&cli, &config);
    let credentials = FtpCredentials::new(&config.ftp.username, &config.ftp.password);
    debug!("Sensor config: {:?}", sensor_config);

    let mut sensor = Sensor::connect(sensor_config)
        .await
        .context("Failed to connect to sensor")?;

    let result = run(&cli, &mut sensor, &credentials).await;
    sensor.close().await;
    info!("Done");
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_attribute() {
        let attribute = parse_attribute("bool12").unwrap();
        assert_eq!(attribute.kind, AttributeKind::Bool);
        assert_eq!(attribute.number.get(), 12);
        assert_eq!(parse_attribute("float200").unwrap().to_string(), "float200");

        assert!(parse_attribute("bool").is_err());
        assert!(parse_attribute("word3").is_err());
        assert!(parse_attribute("int201").is_err());
    }

    #[test]
    fn test_default_log_filter_is_info() {
        assert_eq!(DEFAULT_LOG_FILTER, "info");
        assert!(DEFAULT_LOG_FILTER.parse::<tracing_subscriber::EnvFilter>().is_ok());
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("1").unwrap());
        assert!(parse_bool("TRUE").unwrap());
        assert!(!parse_bool("off").unwrap());
        assert!(parse_bool("maybe").is_err());
    }

    #[test]
    fn test_config_defaults_and_overrides() {
        let config: Config = toml::from_str(
            r#"
            [sensor]
            host = "10.0.0.7"
            online_timeout_ms = 20000

            [ftp]
            password = "secret"
            "#,
        )
        .unwrap();
        assert_eq!(config.sensor.port, DEFAULT_PORT);
        assert_eq!(config.ftp.username, "target");

        let cli = Cli::parse_from(["f4ctl", "--port", "5000", "jobs"]);
        let sensor = build_sensor_config(&cli, &config);
        assert_eq!(sensor.host, "10.0.0.7");
        assert_eq!(sensor.port, 5000);
        assert_eq!(sensor.online_timeout_ms, Some(20000));
    }

    #[test]
    fn test_empty_config_is_all_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.sensor.retry_limit, 100);
        assert_eq!(config.ftp.port, 21);
    }

    #[test]
    fn test_cli_job_subcommands() {
        let cli = Cli::parse_from(["f4ctl", "--json", "job", "load", "3", "--timeout-ms", "500"]);
        assert!(cli.json);
        match cli.command {
            Commands::Job {
                command: JobCommand::Load { slot, timeout_ms },
            } => {
                assert_eq!(slot, 3);
                assert_eq!(timeout_ms, Some(500));
            }
            _ => panic!("expected job load"),
        }
    }
}
