//! StoreActor - single owner of all hub state
//!
//! Device records, the latest sensor readings and the alert history live inside one
//! actor task. Every mutation arrives as a [`StoreCommand`] over one mpsc channel, so
//! appends from concurrently handled requests are applied one at a time and no reader
//! ever sees half of an append.
//!
//! ## Fanout
//!
//! The actor is the only sender on the event broadcast channel. It publishes right after
//! applying a mutation, so every subscriber sees mutations in the same order. Slow
//! subscribers lag behind and lose events; they never block the actor.
//!
//! Subscribing is itself a command: the snapshot is taken and the broadcast receiver is
//! created in the same step, so no event can fall between the two.
//!
//! ## Status coalescing
//!
//! A heartbeat that only moves `last_seen` is not broadcast more often than once per
//! coalesce window; the pending update is flushed by the sweep timer. Any other
//! observable change is broadcast immediately.

use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, trace, warn};

use crate::{
    AlertEvent, DeviceState,
    config::HubConfig,
    reports::{ValidatedAlert, ValidatedStatus},
    storage::{ALERT_CAPACITY, AlertStore},
};

use super::messages::{
    Connectivity, DeviceRecord, HubEvent, HubSnapshot, SensorReading, StoreCommand, StoreStats,
    Subscription,
};

/// Capacity of the event broadcast channel before subscribers start lagging
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Lower bound for the sweep timer
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub heartbeat_window: Duration,
    pub status_coalesce: Duration,
    pub capacity: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            heartbeat_window: Duration::from_secs(90),
            status_coalesce: Duration::from_secs(1),
            capacity: ALERT_CAPACITY,
        }
    }
}

impl From<&HubConfig> for StoreSettings {
    fn from(config: &HubConfig) -> Self {
        Self {
            heartbeat_window: config.heartbeat_window(),
            status_coalesce: config.status_coalesce(),
            capacity: ALERT_CAPACITY,
        }
    }
}

impl StoreSettings {
    fn sweep_interval(&self) -> Duration {
        (self.heartbeat_window / 4)
            .min(self.status_coalesce)
            .max(MIN_SWEEP_INTERVAL)
    }
}

pub struct StoreActor {
    settings: StoreSettings,

    alerts: AlertStore,

    devices: HashMap<IpAddr, DeviceRecord>,

    sensors: BTreeMap<String, SensorReading>,

    /// Next hub sequence number for alerts
    next_alert_id: u64,

    alerts_received: u64,

    /// A heartbeat-only change is waiting to be broadcast
    status_dirty: bool,

    last_status_broadcast: Option<Instant>,

    command_rx: mpsc::Receiver<StoreCommand>,

    event_tx: broadcast::Sender<HubEvent>,
}

impl StoreActor {
    pub fn new(settings: StoreSettings, command_rx: mpsc::Receiver<StoreCommand>) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            alerts: AlertStore::with_capacity(settings.capacity),
            settings,
            devices: HashMap::new(),
            sensors: BTreeMap::new(),
            next_alert_id: 1,
            alerts_received: 0,
            status_dirty: false,
            last_status_broadcast: None,
            command_rx,
            event_tx,
        }
    }

    /// Run the actor's main loop
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!(
            "starting store actor (capacity {}, heartbeat window {:?})",
            self.alerts.capacity(),
            self.settings.heartbeat_window
        );

        let mut sweep = time::interval(self.settings.sweep_interval());
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => {
                    let Some(cmd) = cmd else {
                        debug!("all store handles dropped, shutting down");
                        break;
                    };

                    if matches!(cmd, StoreCommand::Shutdown) {
                        debug!("received shutdown command");
                        break;
                    }

                    self.handle_command(cmd);
                }

                _ = sweep.tick() => {
                    self.sweep(Utc::now());
                }
            }
        }

        debug!("store actor stopped");
    }

    fn handle_command(&mut self, cmd: StoreCommand) {
        let now = Utc::now();
        self.refresh_connectivity(now);

        match cmd {
            StoreCommand::IngestStatus { status, respond_to } => {
                let record = self.ingest_status(status, now);
                let _ = respond_to.send(record);
            }

            StoreCommand::IngestAlert { alert, respond_to } => {
                let stored = self.ingest_alert(alert, now);
                let _ = respond_to.send(stored);
            }

            StoreCommand::ClearAlerts { respond_to } => {
                let removed = self.alerts.clear();
                info!("cleared {removed} alerts");
                self.publish_update(now);
                let _ = respond_to.send(removed);
            }

            StoreCommand::GetSnapshot { respond_to } => {
                let _ = respond_to.send(self.snapshot(now));
            }

            StoreCommand::GetAlerts { limit, respond_to } => {
                let alerts = match limit {
                    Some(limit) => self.alerts.latest(limit),
                    None => self.alerts.all(),
                };
                let _ = respond_to.send(alerts);
            }

            StoreCommand::GetSensors { respond_to } => {
                let _ = respond_to.send(self.sensors.clone());
            }

            StoreCommand::GetStats { respond_to } => {
                let _ = respond_to.send(self.stats());
            }

            StoreCommand::Subscribe { respond_to } => {
                let subscription = Subscription {
                    snapshot: self.snapshot(now),
                    events: self.event_tx.subscribe(),
                };
                debug!(
                    "new subscriber ({} total)",
                    self.event_tx.receiver_count()
                );
                let _ = respond_to.send(subscription);
            }

            StoreCommand::Shutdown => {}
        }
    }

    #[instrument(skip(self, status), fields(device = %status.ip))]
    fn ingest_status(&mut self, status: ValidatedStatus, now: DateTime<Utc>) -> DeviceRecord {
        let connectivity = if status.status == DeviceState::Offline {
            Connectivity::Offline
        } else {
            Connectivity::Online
        };

        let previous = self.devices.get(&status.ip).cloned();
        let record = DeviceRecord {
            ip: status.ip,
            chip: status.chip,
            version: status.version.clone(),
            state: status.status,
            connectivity,
            first_seen: previous.as_ref().map_or(now, |p| p.first_seen),
            last_seen: now,
        };

        let mut changed = match &previous {
            None => {
                info!("new device {} ({}) reported {}", record.ip, record.chip, record.state);
                true
            }
            Some(previous) => {
                previous.state != record.state
                    || previous.chip != record.chip
                    || previous.version != record.version
                    || previous.connectivity != record.connectivity
            }
        };

        for snapshot in &status.sensors {
            let key = SensorReading::key(status.ip, snapshot.sensor);
            let reading = SensorReading {
                device_ip: status.ip,
                sensor: snapshot.sensor,
                location: snapshot.location.clone(),
                value: snapshot.value,
                baseline: snapshot.baseline,
                alert: snapshot.state.is_alerting(),
                last_update: now,
            };

            // value noise alone rides the coalesced heartbeat
            let differs = self.sensors.get(&key).is_none_or(|existing| {
                existing.alert != reading.alert || existing.baseline != reading.baseline
            });
            changed |= differs;
            self.sensors.insert(key, reading);
        }

        trace!("status {} from {} (changed: {changed})", record.state, record.ip);
        self.devices.insert(record.ip, record.clone());

        if changed {
            self.publish_update(now);
        } else {
            self.publish_status_coalesced(now);
        }

        record
    }

    #[instrument(skip(self, alert), fields(device = %alert.device_ip, sensor = alert.sensor))]
    fn ingest_alert(&mut self, alert: ValidatedAlert, now: DateTime<Utc>) -> Option<AlertEvent> {
        let key = SensorReading::key(alert.device_ip, alert.sensor);
        let baseline = self.sensors.get(&key).and_then(|r| r.baseline);
        self.sensors.insert(
            key,
            SensorReading {
                device_ip: alert.device_ip,
                sensor: alert.sensor,
                location: alert.location.clone(),
                value: alert.value,
                baseline,
                alert: alert.alert,
                last_update: now,
            },
        );

        if !alert.alert {
            debug!("sensor {} ({}) cleared", alert.sensor, alert.location);
            self.publish_update(now);
            return None;
        }

        let event = AlertEvent::from_validated(self.next_alert_id, alert, now);
        self.next_alert_id += 1;
        self.alerts_received += 1;

        warn!(
            "LEAK ALERT: sensor {} ({}) on {} - value {} (threshold {})",
            event.sensor, event.location, event.device_ip, event.value, event.threshold
        );

        self.alerts.append(event.clone());

        self.publish(HubEvent::Alert(event.clone()));
        self.publish_update(now);

        Some(event)
    }

    /// Mark devices offline whose last report is older than the heartbeat window
    ///
    /// Returns true if any device changed connectivity.
    fn refresh_connectivity(&mut self, now: DateTime<Utc>) -> bool {
        let Ok(window) = chrono::Duration::from_std(self.settings.heartbeat_window) else {
            return false;
        };

        let mut changed = false;
        for device in self.devices.values_mut() {
            if device.is_online() && now - device.last_seen > window {
                info!("device {} missed its heartbeat window, now offline", device.ip);
                device.connectivity = Connectivity::Offline;
                changed = true;
            }
        }

        if changed {
            self.publish_update(now);
        }

        changed
    }

    fn sweep(&mut self, now: DateTime<Utc>) {
        let changed = self.refresh_connectivity(now);

        if !changed && self.status_dirty {
            let due = self
                .last_status_broadcast
                .is_none_or(|at| at.elapsed() >= self.settings.status_coalesce);
            if due {
                trace!("flushing coalesced status update");
                self.publish_update(now);
            }
        }
    }

    fn publish_status_coalesced(&mut self, now: DateTime<Utc>) {
        let due = self
            .last_status_broadcast
            .is_none_or(|at| at.elapsed() >= self.settings.status_coalesce);

        if due {
            self.publish_update(now);
        } else {
            self.status_dirty = true;
        }
    }

    fn publish_update(&mut self, now: DateTime<Utc>) {
        self.status_dirty = false;
        self.last_status_broadcast = Some(Instant::now());
        let snapshot = self.snapshot(now);
        self.publish(HubEvent::Update(snapshot));
    }

    fn publish(&self, event: HubEvent) {
        // no subscribers is fine, the event is simply not delivered
        match self.event_tx.send(event) {
            Ok(receivers) => trace!("published event to {receivers} subscribers"),
            Err(_) => trace!("no subscribers for event"),
        }
    }

    fn snapshot(&self, now: DateTime<Utc>) -> HubSnapshot {
        let mut devices: Vec<DeviceRecord> = self.devices.values().cloned().collect();
        devices.sort_by(|a, b| a.first_seen.cmp(&b.first_seen).then(a.ip.cmp(&b.ip)));

        HubSnapshot {
            devices,
            sensors: self.sensors.clone(),
            alerts: self.alerts.all(),
            timestamp: now,
        }
    }

    fn stats(&self) -> StoreStats {
        StoreStats {
            devices: self.devices.len(),
            devices_online: self.devices.values().filter(|d| d.is_online()).count(),
            alerts: self.alerts.len(),
            alerts_received: self.alerts_received,
            alerts_evicted: self.alerts.evicted(),
            subscribers: self.event_tx.receiver_count(),
        }
    }
}

/// Handle for talking to the StoreActor
///
/// Cheap to clone; every API handler holds one.
#[derive(Clone)]
pub struct StoreHandle {
    sender: mpsc::Sender<StoreCommand>,
}

impl StoreHandle {
    /// Spawn a new store actor
    pub fn spawn(settings: StoreSettings) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(256);

        let actor = StoreActor::new(settings, cmd_rx);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> StoreCommand) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .context("store actor is not running")?;

        rx.await.context("store actor dropped the request")
    }

    pub async fn ingest_status(&self, status: ValidatedStatus) -> Result<DeviceRecord> {
        self.request(|respond_to| StoreCommand::IngestStatus { status, respond_to })
            .await
    }

    pub async fn ingest_alert(&self, alert: ValidatedAlert) -> Result<Option<AlertEvent>> {
        self.request(|respond_to| StoreCommand::IngestAlert { alert, respond_to })
            .await
    }

    pub async fn clear_alerts(&self) -> Result<usize> {
        self.request(|respond_to| StoreCommand::ClearAlerts { respond_to })
            .await
    }

    pub async fn snapshot(&self) -> Result<HubSnapshot> {
        self.request(|respond_to| StoreCommand::GetSnapshot { respond_to })
            .await
    }

    pub async fn alerts(&self, limit: Option<usize>) -> Result<Vec<AlertEvent>> {
        self.request(|respond_to| StoreCommand::GetAlerts { limit, respond_to })
            .await
    }

    pub async fn sensors(&self) -> Result<BTreeMap<String, SensorReading>> {
        self.request(|respond_to| StoreCommand::GetSensors { respond_to })
            .await
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        self.request(|respond_to| StoreCommand::GetStats { respond_to })
            .await
    }

    pub async fn subscribe(&self) -> Result<Subscription> {
        self.request(|respond_to| StoreCommand::Subscribe { respond_to })
            .await
    }

    /// Shutdown the store actor
    pub async fn shutdown(&self) {
        let _ = self.sender.send(StoreCommand::Shutdown).await;
    }
}
