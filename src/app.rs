//! Core application runner (business logic) for `switchbot-listener`.
//!
//! This module is intentionally decoupled from CLI parsing and process exit codes
//! so it can be tested deterministically with an injected scanner and transport.

use crate::device::{DeviceDescriptor, DeviceType, parse_device, validate_location};
use crate::mac_address::MacAddress;
use crate::output::console::ConsoleFormatter;
use crate::output::influxdb::{DEFAULT_MEASUREMENT, InfluxDbFormatter};
use crate::output::{OutputFormat, OutputFormatter};
use crate::publish::{ConfigError, DEFAULT_DATABASE, PublishConfig, Publisher, Transport};
use crate::registry::DeviceRegistry;
use crate::scanner::{Backend, Scanner};
use crate::session::{ScanSession, SessionError};
use clap::Parser;
use std::io;
use std::io::Write;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Configuration for one collection run.
#[derive(Parser, Debug, Clone)]
#[command(author, about, version)]
pub struct Options {
    /// Device to collect from.
    /// Format: --device AA:BB:CC:DD:EE:FF=bedroom[,meter|co2]
    #[arg(long = "device", value_parser = parse_device, value_name = "DEVICE")]
    pub devices: Vec<DeviceDescriptor>,

    /// MAC address to collect from (repeatable), tagged with --location and --device-type
    #[arg(long = "mac", value_name = "MAC")]
    pub macs: Vec<MacAddress>,

    /// Location tag for addresses given with --mac
    #[arg(long, default_value = "unknown", value_parser = parse_location)]
    pub location: String,

    /// Device type for addresses given with --mac
    #[arg(long, default_value_t, value_enum)]
    pub device_type: DeviceType,

    /// How long to collect advertisements.
    /// Accepts duration with suffix: 10s, 1m, 500ms.
    /// Without suffix, value is interpreted as seconds.
    #[arg(long, default_value = "10s", value_parser = crate::duration::parse_scan_duration)]
    pub scan_duration: Duration,

    /// Output format for readings on stdout
    #[arg(long, default_value_t, value_enum)]
    pub format: OutputFormat,

    /// Publish readings to InfluxDB 3
    #[arg(long)]
    pub influxdb: bool,

    /// InfluxDB 3 URL (e.g. http://localhost:8181)
    #[arg(long, env = "INFLUXDB3_URL")]
    pub influxdb_url: Option<String>,

    /// InfluxDB 3 API token
    #[arg(long, env = "INFLUXDB3_TOKEN", hide_env_values = true)]
    pub influxdb_token: Option<String>,

    /// InfluxDB 3 database name
    #[arg(long, env = "INFLUXDB3_DATABASE", default_value = DEFAULT_DATABASE)]
    pub influxdb_database: String,

    /// The name of the measurement in InfluxDB line protocol.
    #[arg(long, default_value = DEFAULT_MEASUREMENT)]
    pub influxdb_measurement: String,

    /// Verbose output, log ignored devices and undecodable frames
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Bluetooth scanner backend to use
    #[arg(long, default_value_t, value_enum)]
    pub backend: Backend,
}

fn parse_location(src: &str) -> Result<String, String> {
    validate_location(src)?;
    Ok(src.to_string())
}

impl Options {
    /// Registry from --device and --mac entries, or the built-in set when neither is given.
    pub fn registry(&self) -> DeviceRegistry {
        let mut descriptors = self.devices.clone();
        descriptors.extend(
            self.macs
                .iter()
                .map(|&mac| DeviceDescriptor::new(mac, self.location.clone(), self.device_type)),
        );
        DeviceRegistry::from_descriptors_or_builtin(descriptors)
    }

    /// Publishing parameters, `None` when publishing is disabled.
    pub fn publish_config(&self) -> Result<Option<PublishConfig>, ConfigError> {
        if !self.influxdb {
            return Ok(None);
        }
        PublishConfig::new(
            self.influxdb_url.clone(),
            self.influxdb_token.clone(),
            self.influxdb_database.clone(),
        )
        .map(Some)
    }

    pub fn formatter(&self) -> Box<dyn OutputFormatter> {
        match self.format {
            OutputFormat::Console => Box::new(ConsoleFormatter),
            OutputFormat::Influxdb => Box::new(InfluxDbFormatter::new(
                self.influxdb_measurement.clone(),
            )),
        }
    }
}

/// Errors returned by the core run loop.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Outcome counts of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub devices: usize,
    pub published: usize,
    pub failed: usize,
}

/// Run one scan window, writing a line per device to `out` and publish failures to `err`.
///
/// - Publishing configuration is validated before discovery starts.
/// - A failed publish is reported and does not affect other devices.
pub async fn run_with_io(
    options: Options,
    scanner: &dyn Scanner,
    transport: &dyn Transport,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<RunSummary, RunError> {
    let publisher = options
        .publish_config()?
        .map(|config| Publisher::new(config, transport));
    let registry = options.registry();
    let formatter = options.formatter();
    let encoder = InfluxDbFormatter::new(options.influxdb_measurement.clone());

    for device in registry.iter() {
        info!(device = %device, "watching");
    }
    if let Some(publisher) = &publisher {
        info!(
            url = %publisher.config().url,
            database = %publisher.config().database,
            "publishing to InfluxDB"
        );
    }

    let snapshot = ScanSession::new(&registry)
        .run_once(scanner, options.scan_duration)
        .await?;

    let mut summary = RunSummary {
        devices: snapshot.len(),
        ..Default::default()
    };

    for entry in snapshot.iter() {
        writeln!(out, "{}", formatter.format(entry))?;

        let Some(publisher) = &publisher else {
            continue;
        };
        let line = encoder.encode(&entry.descriptor, &entry.reading);
        match publisher.publish(&line).await {
            Ok(()) => {
                summary.published += 1;
                info!(address = %entry.descriptor.address, "published");
            }
            Err(e) => {
                summary.failed += 1;
                writeln!(err, "error: failed to publish {}: {e}", entry.descriptor.address)?;
            }
        }
    }

    Ok(summary)
}
