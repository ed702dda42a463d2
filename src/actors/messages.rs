//! Message types for actor communication
//!
//! ## Design Principles
//!
//! 1. **Commands**: Request/response messages sent to a specific actor via mpsc
//! 2. **Events**: Broadcast notifications published to every subscriber
//! 3. **Immutability**: Events are cloneable for multi-subscriber fanout

use std::collections::BTreeMap;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, oneshot};

use crate::{
    AlertEvent, ChipModel, DeviceState, LeakAlertReport, StatusReport,
    monitors::debounce::ChannelState,
    reports::{ValidatedAlert, ValidatedStatus},
};

/// Whether the hub has heard from a device within the heartbeat window
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    Online,
    Offline,
}

/// Hub-side record of one physical device, keyed by its address
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceRecord {
    pub ip: IpAddr,
    pub chip: ChipModel,
    pub version: Option<String>,
    /// State the device last reported about itself
    pub state: DeviceState,
    pub connectivity: Connectivity,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl DeviceRecord {
    pub fn is_online(&self) -> bool {
        self.connectivity == Connectivity::Online
    }
}

/// Last known reading of one sensor on one device
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensorReading {
    pub device_ip: IpAddr,
    pub sensor: u32,
    pub location: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline: Option<f64>,
    pub alert: bool,
    pub last_update: DateTime<Utc>,
}

impl SensorReading {
    pub fn key(device_ip: IpAddr, sensor: u32) -> String {
        format!("{device_ip}/sensor{sensor}")
    }
}

/// Full view of the hub state at one instant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HubSnapshot {
    pub devices: Vec<DeviceRecord>,
    pub sensors: BTreeMap<String, SensorReading>,
    /// Alert history, oldest first
    pub alerts: Vec<AlertEvent>,
    pub timestamp: DateTime<Utc>,
}

/// Events delivered to subscribers
///
/// `Update` and `Alert` travel over the broadcast channel in mutation order.
/// `Snapshot` is only ever sent once, directly to a new subscriber.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HubEvent {
    Snapshot(HubSnapshot),
    Update(HubSnapshot),
    Alert(AlertEvent),
}

/// A new subscription: the state at subscribe time plus every later event
pub struct Subscription {
    pub snapshot: HubSnapshot,
    pub events: broadcast::Receiver<HubEvent>,
}

/// Store statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub devices: usize,
    pub devices_online: usize,
    pub alerts: usize,
    pub alerts_received: u64,
    pub alerts_evicted: u64,
    pub subscribers: usize,
}

/// Commands that can be sent to the StoreActor
#[derive(Debug)]
pub enum StoreCommand {
    /// Create or update the device that sent a status report
    IngestStatus {
        status: ValidatedStatus,
        respond_to: oneshot::Sender<DeviceRecord>,
    },

    /// Record an alert (or a clear when `alert.alert` is false)
    ///
    /// Responds with the stored event, `None` for clears.
    IngestAlert {
        alert: ValidatedAlert,
        respond_to: oneshot::Sender<Option<AlertEvent>>,
    },

    /// Empty the alert history; responds with the number of removed alerts
    ClearAlerts { respond_to: oneshot::Sender<usize> },

    GetSnapshot {
        respond_to: oneshot::Sender<HubSnapshot>,
    },

    /// Alert history, or its last `limit` entries
    GetAlerts {
        limit: Option<usize>,
        respond_to: oneshot::Sender<Vec<AlertEvent>>,
    },

    GetSensors {
        respond_to: oneshot::Sender<BTreeMap<String, SensorReading>>,
    },

    GetStats {
        respond_to: oneshot::Sender<StoreStats>,
    },

    /// Register a subscriber; snapshot and receiver are taken in the same step
    Subscribe {
        respond_to: oneshot::Sender<Subscription>,
    },

    /// Gracefully shut down the store actor
    Shutdown,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("snapshot", &self.snapshot)
            .finish_non_exhaustive()
    }
}

/// Commands that can be sent to a DeviceActor
#[derive(Debug)]
pub enum DeviceCommand {
    /// Run one poll immediately (bypassing the interval timer)
    PollNow {
        respond_to: oneshot::Sender<()>,
    },

    /// Throw away the baselines and calibrate again
    Recalibrate,

    /// Current per-channel state
    GetChannels {
        respond_to: oneshot::Sender<Vec<ChannelStatus>>,
    },

    /// Which hub the device currently reports to
    GetHub {
        respond_to: oneshot::Sender<Option<String>>,
    },

    /// Send a final `offline` status and stop
    Shutdown,
}

/// Work queued for a device's ReporterActor, handled strictly in order
#[derive(Debug)]
pub enum ReportCommand {
    /// Latest device status; also remembered for the announcement after a reconnect
    Status(StatusReport),

    /// Alert or clear for one channel
    Alert(LeakAlertReport),

    /// Final status on shutdown; never triggers discovery
    Offline(StatusReport),

    /// Responds once everything queued before it has been handled
    Flush { respond_to: oneshot::Sender<()> },

    GetHub {
        respond_to: oneshot::Sender<Option<String>>,
    },
}

/// Device-side view of one channel
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelStatus {
    pub id: u32,
    pub label: String,
    pub baseline: Option<f32>,
    pub raw: Option<f32>,
    pub state: ChannelState,
    pub calibrating: bool,
}
