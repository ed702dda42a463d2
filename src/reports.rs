//! Wire types exchanged between devices and the hub
//!
//! Devices serialize [`StatusReport`] and [`LeakAlertReport`] and POST them to
//! `/api/sensor_status` and `/api/leak_alert`. The hub deserializes the same types and
//! runs `validate` on them before anything touches shared state, so a malformed report
//! can never reach the alert store.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::monitors::debounce::ChannelState;

/// Lifecycle state a device reports about itself
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    Online,
    Offline,
    Calibrating,
}

impl std::fmt::Display for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceState::Online => write!(f, "online"),
            DeviceState::Offline => write!(f, "offline"),
            DeviceState::Calibrating => write!(f, "calibrating"),
        }
    }
}

/// Hardware class of a sensor board
///
/// Only two boards are supported; anything else is kept as `Unknown` so that a
/// firmware reporting a new chip string is still accepted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ChipModel {
    #[serde(rename = "ESP32")]
    Esp32,
    #[serde(rename = "ESP32-S3")]
    Esp32S3,
    #[default]
    #[serde(rename = "unknown", other)]
    Unknown,
}

impl std::fmt::Display for ChipModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChipModel::Esp32 => write!(f, "ESP32"),
            ChipModel::Esp32S3 => write!(f, "ESP32-S3"),
            ChipModel::Unknown => write!(f, "unknown"),
        }
    }
}

/// Per-channel reading carried by status heartbeats
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensorSnapshot {
    pub sensor: u32,
    pub location: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline: Option<f64>,
    pub state: ChannelState,
}

/// Body of `POST /api/sensor_status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: DeviceState,
    pub ip: IpAddr,
    #[serde(default)]
    pub chip: ChipModel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sensors: Vec<SensorSnapshot>,
}

/// Body of `POST /api/leak_alert`
///
/// `alert: false` marks a channel returning to normal; only `alert: true` reports are
/// appended to the alert history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeakAlertReport {
    pub sensor: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub value: f64,
    pub threshold: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    pub device_ip: IpAddr,
    #[serde(default = "default_alert_flag")]
    pub alert: bool,
}

fn default_alert_flag() -> bool {
    true
}

/// Response body for both ingress endpoints
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportResponse {
    pub success: bool,
    pub message: String,
}

impl ReportResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Reasons a report is refused before it reaches the store
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("sensor {sensor} is outside the configured range 1..={max}")]
    SensorOutOfRange { sensor: u32, max: u8 },

    #[error("field `{0}` must be a finite number")]
    NotFinite(&'static str),

    #[error("threshold must not be negative (got {0})")]
    NegativeThreshold(f64),

    #[error("malformed report: {0}")]
    Malformed(String),
}

/// Alert report that passed validation, with every optional field resolved
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedAlert {
    pub sensor: u32,
    pub location: String,
    pub value: f64,
    pub threshold: f64,
    pub timestamp: String,
    pub device_ip: IpAddr,
    pub alert: bool,
}

/// Status report that passed validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedStatus {
    pub status: DeviceState,
    pub ip: IpAddr,
    pub chip: ChipModel,
    pub version: Option<String>,
    pub sensors: Vec<SensorSnapshot>,
}

fn check_sensor(sensor: u32, channels: u8) -> Result<(), ValidationError> {
    if sensor == 0 || sensor > u32::from(channels) {
        return Err(ValidationError::SensorOutOfRange {
            sensor,
            max: channels,
        });
    }
    Ok(())
}

fn check_finite(value: f64, field: &'static str) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NotFinite(field));
    }
    Ok(())
}

pub fn default_location(sensor: u32) -> String {
    format!("Sensor {sensor}")
}

impl LeakAlertReport {
    /// Check field constraints and fill in defaults
    pub fn validate(self, channels: u8) -> Result<ValidatedAlert, ValidationError> {
        check_sensor(self.sensor, channels)?;
        check_finite(self.value, "value")?;
        check_finite(self.threshold, "threshold")?;
        if self.threshold < 0.0 {
            return Err(ValidationError::NegativeThreshold(self.threshold));
        }

        let location = self
            .location
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| default_location(self.sensor));

        Ok(ValidatedAlert {
            sensor: self.sensor,
            location,
            value: self.value,
            threshold: self.threshold,
            timestamp: self.timestamp.unwrap_or_else(|| Utc::now().to_rfc3339()),
            device_ip: self.device_ip,
            alert: self.alert,
        })
    }
}

impl StatusReport {
    /// Check the optional sensor array; identity fields are already typed
    pub fn validate(self, channels: u8) -> Result<ValidatedStatus, ValidationError> {
        for snapshot in &self.sensors {
            check_sensor(snapshot.sensor, channels)?;
            check_finite(snapshot.value, "sensors.value")?;
            if let Some(baseline) = snapshot.baseline {
                check_finite(baseline, "sensors.baseline")?;
            }
        }

        Ok(ValidatedStatus {
            status: self.status,
            ip: self.ip,
            chip: self.chip,
            version: self.version.filter(|v| !v.is_empty()),
            sensors: self.sensors,
        })
    }
}

/// Immutable alert record kept in the hub's history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertEvent {
    /// Hub-assigned sequence number, strictly increasing per hub process
    pub id: u64,
    pub sensor: u32,
    pub location: String,
    pub value: f64,
    pub threshold: f64,
    /// Timestamp as reported by the device
    pub timestamp: String,
    pub device_ip: IpAddr,
    pub received_at: DateTime<Utc>,
    pub alert: bool,
}

impl AlertEvent {
    pub fn from_validated(id: u64, alert: ValidatedAlert, received_at: DateTime<Utc>) -> Self {
        Self {
            id,
            sensor: alert.sensor,
            location: alert.location,
            value: alert.value,
            threshold: alert.threshold,
            timestamp: alert.timestamp,
            device_ip: alert.device_ip,
            received_at,
            alert: true,
        }
    }
}
