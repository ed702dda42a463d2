//! Shared API request and response types
//!
//! The watch client deserializes the same types, so the wire format is defined once.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    AlertEvent,
    actors::messages::{DeviceRecord, SensorReading, StoreStats},
};

/// Number of alerts included in the status overview
pub const STATUS_RECENT_ALERTS: usize = 10;

/// Response for GET /api/v1/health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

/// Response for GET /api/v1/leak/status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeakStatusResponse {
    pub devices: Vec<DeviceRecord>,
    pub sensors: BTreeMap<String, SensorReading>,
    /// The most recent alerts, oldest first
    pub alerts: Vec<AlertEvent>,
}

/// Response for GET /api/v1/leak/alerts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsResponse {
    pub alerts: Vec<AlertEvent>,
    pub count: usize,
}

/// Query parameters for GET /api/v1/leak/alerts
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertsQuery {
    pub limit: Option<usize>,
}

/// Response for GET /api/v1/stats
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub timestamp: String,
    pub store: StoreStats,
}

/// Messages a stream client may send
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Subscribe,
    Unsubscribe,
}
