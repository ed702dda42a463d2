use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use serde::de::DeserializeOwned;
use tracing::trace;

use crate::{ChipModel, monitors::sensors::SimulatedLeak};

/// Discovery settings shared by the hub's responder and the device's client
#[derive(Debug, Clone, serde::Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Multicast group (a unicast address also works, e.g. for loopback tests)
    #[serde(default = "default_discovery_group")]
    pub group: IpAddr,

    #[serde(default = "default_discovery_port")]
    pub port: u16,

    /// How long a device waits for a response before falling back
    #[serde(default = "default_discovery_timeout_ms")]
    pub timeout_ms: u64,

    /// How often the hub multicasts an unsolicited announcement
    #[serde(default = "default_announce_interval_secs")]
    pub announce_interval_secs: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            group: default_discovery_group(),
            port: default_discovery_port(),
            timeout_ms: default_discovery_timeout_ms(),
            announce_interval_secs: default_announce_interval_secs(),
        }
    }
}

impl DiscoveryConfig {
    pub fn target(&self) -> SocketAddr {
        SocketAddr::new(self.group, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn announce_interval(&self) -> Duration {
        Duration::from_secs(self.announce_interval_secs.max(1))
    }
}

fn default_true() -> bool {
    true
}

fn default_discovery_group() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(239, 255, 77, 77))
}

fn default_discovery_port() -> u16 {
    5354
}

fn default_discovery_timeout_ms() -> u64 {
    3000
}

fn default_announce_interval_secs() -> u64 {
    5
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct HubConfig {
    /// Bind address, overridden by HUB_ADDR/HUB_PORT
    pub bind: Option<SocketAddr>,

    /// Bearer token for the report and control routes, overridden by HUB_SECRET.
    /// Read routes and the WebSocket stay open.
    pub secret: Option<String>,

    /// Number of sensor channels a device may report (ids 1..=channels)
    #[serde(default = "default_channel_count")]
    pub channels: u8,

    /// A device counts as online while its last status report is younger than this
    #[serde(default = "default_heartbeat_window_secs")]
    pub heartbeat_window_secs: u64,

    /// Minimum spacing of heartbeat-only status broadcasts
    #[serde(default = "default_status_coalesce_ms")]
    pub status_coalesce_ms: u64,

    /// Human name advertised over discovery
    #[serde(default = "default_hub_name")]
    pub name: String,

    #[serde(default = "default_true")]
    pub enable_cors: bool,

    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind: None,
            secret: None,
            channels: default_channel_count(),
            heartbeat_window_secs: default_heartbeat_window_secs(),
            status_coalesce_ms: default_status_coalesce_ms(),
            name: default_hub_name(),
            enable_cors: true,
            discovery: DiscoveryConfig::default(),
        }
    }
}

impl HubConfig {
    pub fn heartbeat_window(&self) -> Duration {
        Duration::from_secs(self.heartbeat_window_secs)
    }

    pub fn status_coalesce(&self) -> Duration {
        Duration::from_millis(self.status_coalesce_ms)
    }
}

fn default_channel_count() -> u8 {
    3
}

fn default_heartbeat_window_secs() -> u64 {
    90
}

fn default_status_coalesce_ms() -> u64 {
    1000
}

fn default_hub_name() -> String {
    String::from("LeakWatch Hub")
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ChannelConfig {
    pub id: u32,
    pub label: String,
    /// Overrides the device-wide threshold for this channel
    pub threshold: Option<f32>,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    Simulated {
        #[serde(default)]
        seed: u64,
        #[serde(default = "default_resting_value")]
        resting: f32,
        #[serde(default = "default_noise")]
        noise: f32,
        leak: Option<SimulatedLeak>,
    },
    File {
        /// Channel id (as a JSON object key) to the file holding its reading
        paths: HashMap<String, PathBuf>,
    },
}

impl SourceConfig {
    /// Channel paths of a file source keyed by channel id; empty for other sources
    pub fn file_paths(&self) -> anyhow::Result<HashMap<u32, PathBuf>> {
        let SourceConfig::File { paths } = self else {
            return Ok(HashMap::new());
        };

        paths
            .iter()
            .map(|(key, path)| {
                let id = key
                    .trim()
                    .parse::<u32>()
                    .with_context(|| format!("file source key {key:?} is not a channel id"))?;
                Ok((id, path.clone()))
            })
            .collect()
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Simulated {
            seed: 0,
            resting: default_resting_value(),
            noise: default_noise(),
            leak: None,
        }
    }
}

fn default_resting_value() -> f32 {
    1000.0
}

fn default_noise() -> f32 {
    5.0
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct DeviceConfig {
    /// Operator-supplied hub base URL used when discovery finds nothing
    pub hub: Option<String>,

    pub token: Option<String>,

    /// Address reported to the hub; detected from the route to the hub if absent
    pub device_ip: Option<IpAddr>,

    #[serde(default = "default_chip")]
    pub chip: ChipModel,

    #[serde(default = "default_firmware_version")]
    pub firmware_version: String,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_calibration_samples")]
    pub calibration_samples: usize,

    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    #[serde(default = "default_threshold")]
    pub threshold: f32,

    /// Consecutive failed status reports before discovery runs again
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: usize,

    #[serde(default = "default_channels")]
    pub channels: Vec<ChannelConfig>,

    #[serde(default)]
    pub discovery: DiscoveryConfig,

    #[serde(default)]
    pub source: SourceConfig,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            hub: None,
            token: None,
            device_ip: None,
            chip: default_chip(),
            firmware_version: default_firmware_version(),
            poll_interval_ms: default_poll_interval_ms(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            request_timeout_ms: default_request_timeout_ms(),
            calibration_samples: default_calibration_samples(),
            cooldown_ms: default_cooldown_ms(),
            threshold: default_threshold(),
            failure_threshold: default_failure_threshold(),
            channels: default_channels(),
            discovery: DiscoveryConfig::default(),
            source: SourceConfig::default(),
        }
    }
}

impl DeviceConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn threshold_for(&self, channel: &ChannelConfig) -> f32 {
        channel.threshold.unwrap_or(self.threshold)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.channels.is_empty() {
            anyhow::bail!("at least one sensor channel must be configured");
        }

        let mut seen = HashSet::new();
        for channel in &self.channels {
            if channel.id == 0 {
                anyhow::bail!("sensor ids start at 1 ({} uses 0)", channel.label);
            }
            if !seen.insert(channel.id) {
                anyhow::bail!("sensor id {} is configured twice", channel.id);
            }
            if self.threshold_for(channel) < 0.0 {
                anyhow::bail!("threshold for sensor {} must not be negative", channel.id);
            }
        }

        if !self.discovery.enabled && self.hub.is_none() {
            anyhow::bail!("discovery is disabled and no static hub address is configured");
        }

        self.source.file_paths()?;

        Ok(())
    }
}

fn default_chip() -> ChipModel {
    ChipModel::Esp32S3
}

fn default_firmware_version() -> String {
    String::from(env!("CARGO_PKG_VERSION"))
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_heartbeat_interval_secs() -> u64 {
    30
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_calibration_samples() -> usize {
    20
}

fn default_cooldown_ms() -> u64 {
    5000
}

fn default_threshold() -> f32 {
    150.0
}

fn default_failure_threshold() -> usize {
    3
}

fn default_channels() -> Vec<ChannelConfig> {
    [(1, "Vat Left"), (2, "Vat Right"), (3, "Base Tray")]
        .into_iter()
        .map(|(id, label)| ChannelConfig {
            id,
            label: label.to_string(),
            threshold: None,
        })
        .collect()
}

fn read_json<T: DeserializeOwned + std::fmt::Debug>(path: &str) -> anyhow::Result<T> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}

pub fn read_hub_config(path: &str) -> anyhow::Result<HubConfig> {
    read_json(path)
}

pub fn read_device_config(path: &str) -> anyhow::Result<DeviceConfig> {
    let config: DeviceConfig = read_json(path)?;
    config.validate()?;
    Ok(config)
}
