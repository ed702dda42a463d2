//! DeviceActor - the sensor polling loop of one device
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → read channels → calibrate | debounce → alert reports ─┐
//!     ↑                                                  status due? ─┴→ ReporterActor → hub
//!     └─── Commands (PollNow, Recalibrate, GetChannels, GetHub, Shutdown)
//! ```
//!
//! Polling never waits on the network. Reports are handed to the device's
//! [`ReporterActor`](super::reporter::ReporterActor), which owns hub resolution and sends
//! one report at a time; ticks missed while a read is slow are skipped, not replayed.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::{
    DeviceState, LeakAlertReport, StatusReport,
    config::DeviceConfig,
    monitors::{
        debounce::LeakEvaluation,
        sensors::{Calibration, SensorChannel, SensorSource},
    },
};

use super::messages::{ChannelStatus, DeviceCommand, ReportCommand};
use super::reporter::ReporterHandle;

pub struct DeviceActor {
    config: DeviceConfig,

    source: Box<dyn SensorSource>,

    channels: Vec<SensorChannel>,

    /// Present while (re)calibrating
    calibration: Option<Calibration>,

    /// Configured address; the reporter replaces it when it detects its own
    device_ip: IpAddr,

    /// When the last status report was queued
    last_status: Option<Instant>,

    reporter: ReporterHandle,

    reporter_task: JoinHandle<()>,

    command_rx: mpsc::Receiver<DeviceCommand>,
}

impl DeviceActor {
    pub fn new(
        config: DeviceConfig,
        source: Box<dyn SensorSource>,
        command_rx: mpsc::Receiver<DeviceCommand>,
    ) -> Self {
        let channels = config
            .channels
            .iter()
            .map(|channel| {
                SensorChannel::new(
                    channel.id,
                    channel.label.clone(),
                    config.threshold_for(channel),
                    config.cooldown(),
                )
            })
            .collect::<Vec<_>>();

        let calibration = Calibration::new(
            channels.iter().map(|channel| channel.id),
            config.calibration_samples,
        );

        let (reporter, reporter_task) = ReporterHandle::spawn(config.clone());

        Self {
            device_ip: config
                .device_ip
                .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            config,
            source,
            channels,
            calibration: Some(calibration),
            last_status: None,
            reporter,
            reporter_task,
            command_rx,
        }
    }

    /// Run the actor's main loop
    #[instrument(skip(self), fields(chip = %self.config.chip))]
    pub async fn run(mut self) {
        debug!(
            "starting device actor ({} channels, polling every {:?})",
            self.channels.len(),
            self.config.poll_interval()
        );

        let mut ticker = time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // the first tick completes immediately; poll once before taking commands
        ticker.tick().await;
        self.poll().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll().await;
                }

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(DeviceCommand::PollNow { respond_to }) => {
                            debug!("received PollNow command");
                            self.poll().await;

                            // answer once the reports are out without holding up the loop
                            let reporter = self.reporter.clone();
                            tokio::spawn(async move {
                                if let Err(e) = reporter.flush().await {
                                    warn!("flush failed: {e:#}");
                                }
                                let _ = respond_to.send(());
                            });
                        }

                        Some(DeviceCommand::Recalibrate) => {
                            self.start_calibration();
                        }

                        Some(DeviceCommand::GetChannels { respond_to }) => {
                            let _ = respond_to.send(self.channel_status());
                        }

                        Some(DeviceCommand::GetHub { respond_to }) => {
                            let reporter = self.reporter.clone();
                            tokio::spawn(async move {
                                let hub = reporter.hub().await.unwrap_or_else(|e| {
                                    warn!("hub query failed: {e:#}");
                                    None
                                });
                                let _ = respond_to.send(hub);
                            });
                        }

                        Some(DeviceCommand::Shutdown) | None => {
                            debug!("shutting down");
                            break;
                        }
                    }
                }
            }
        }

        // best effort goodbye so the hub does not wait out the heartbeat window
        let offline = self.status_report(DeviceState::Offline);
        self.reporter.submit(ReportCommand::Offline(offline));

        let DeviceActor {
            reporter,
            reporter_task,
            command_rx,
            ..
        } = self;
        drop(reporter);
        if let Err(e) = reporter_task.await {
            error!("reporter task failed: {e}");
        }
        drop(command_rx);
        debug!("device actor stopped");
    }

    /// One tick: read every channel and queue what is due
    async fn poll(&mut self) {
        for alert in self.read_channels().await {
            self.reporter.submit(ReportCommand::Alert(alert));
        }

        let status_due = self
            .last_status
            .is_none_or(|at| at.elapsed() >= self.config.heartbeat_interval());
        if status_due {
            self.last_status = Some(Instant::now());
            let report = self.status_report(self.state());
            self.reporter.submit(ReportCommand::Status(report));
        }
    }

    /// Read each channel once and run calibration or alert evaluation on the values
    ///
    /// Returns the alert and clear reports produced by this tick.
    async fn read_channels(&mut self) -> Vec<LeakAlertReport> {
        let now = Instant::now();
        let device_ip = self.device_ip;
        let mut reports = Vec::new();

        for channel in &mut self.channels {
            let raw = match self.source.read(channel.id).await {
                Ok(raw) if raw.is_finite() => raw,
                Ok(raw) => {
                    warn!("sensor {} produced {raw}, ignoring", channel.id);
                    continue;
                }
                Err(e) => {
                    // the channel keeps its last state
                    warn!("{e}");
                    continue;
                }
            };
            channel.raw = Some(raw);

            if let Some(calibration) = &mut self.calibration {
                calibration.record(channel.id, raw);
                continue;
            }

            let Some(deviation) = channel.deviation(raw) else {
                continue;
            };

            match channel.debouncer.update(deviation, now) {
                LeakEvaluation::StartsToLeak => {
                    warn!(
                        "leak on sensor {} ({}): raw {raw:.1}, deviation {deviation:.1}",
                        channel.id, channel.label
                    );
                    reports.push(alert_report(channel, raw, true, device_ip));
                }
                LeakEvaluation::BackToNormal => {
                    info!("sensor {} ({}) cleared", channel.id, channel.label);
                    reports.push(alert_report(channel, raw, false, device_ip));
                }
                LeakEvaluation::Suppressed => {
                    trace!("sensor {} in cooldown", channel.id);
                }
                LeakEvaluation::Ok => {}
            }
        }

        self.finish_calibration();

        reports
    }

    fn start_calibration(&mut self) {
        info!(
            "recalibrating ({} samples per channel)",
            self.config.calibration_samples
        );
        self.calibration = Some(Calibration::new(
            self.channels.iter().map(|channel| channel.id),
            self.config.calibration_samples,
        ));
        // state changed to calibrating, tell the hub on the next tick
        self.last_status = None;
    }

    fn finish_calibration(&mut self) {
        let Some(baselines) = self.calibration.as_ref().and_then(Calibration::baselines) else {
            if let Some(calibration) = &self.calibration {
                trace!("calibrating, {} samples to go", calibration.remaining());
            }
            return;
        };

        for channel in &mut self.channels {
            if let Some(baseline) = baselines.get(&channel.id) {
                channel.calibrate(*baseline);
            }
        }

        self.calibration = None;
        self.last_status = None;
        info!("calibration complete");
    }

    fn state(&self) -> DeviceState {
        if self.calibration.is_some() {
            DeviceState::Calibrating
        } else {
            DeviceState::Online
        }
    }

    fn status_report(&self, status: DeviceState) -> StatusReport {
        StatusReport {
            status,
            ip: self.device_ip,
            chip: self.config.chip,
            version: Some(self.config.firmware_version.clone()),
            sensors: self
                .channels
                .iter()
                .filter_map(SensorChannel::snapshot)
                .collect(),
        }
    }

    fn channel_status(&self) -> Vec<ChannelStatus> {
        self.channels
            .iter()
            .map(|channel| ChannelStatus {
                id: channel.id,
                label: channel.label.clone(),
                baseline: channel.baseline,
                raw: channel.raw,
                state: channel.debouncer.state(),
                calibrating: self.calibration.is_some(),
            })
            .collect()
    }
}

fn alert_report(channel: &SensorChannel, raw: f32, alert: bool, device_ip: IpAddr) -> LeakAlertReport {
    LeakAlertReport {
        sensor: channel.id,
        location: Some(channel.label.clone()),
        value: f64::from(raw),
        threshold: f64::from(channel.debouncer.threshold()),
        timestamp: Some(chrono::Utc::now().to_rfc3339()),
        device_ip,
        alert,
    }
}

/// Handle for controlling a DeviceActor
#[derive(Clone)]
pub struct DeviceHandle {
    sender: mpsc::Sender<DeviceCommand>,
}

impl DeviceHandle {
    /// Spawn a new device actor
    pub fn spawn(config: DeviceConfig, source: Box<dyn SensorSource>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = DeviceActor::new(config, source, cmd_rx);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Run one poll immediately and wait until its reports have been handled
    pub async fn poll_now(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(DeviceCommand::PollNow { respond_to: tx })
            .await
            .context("failed to send PollNow command")?;

        rx.await.context("failed to receive response")
    }

    pub async fn recalibrate(&self) -> Result<()> {
        self.sender
            .send(DeviceCommand::Recalibrate)
            .await
            .context("failed to send Recalibrate command")
    }

    pub async fn channels(&self) -> Result<Vec<ChannelStatus>> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(DeviceCommand::GetChannels { respond_to: tx })
            .await
            .context("failed to send GetChannels command")?;

        rx.await.context("failed to receive response")
    }

    /// Base URL of the hub currently reported to
    pub async fn hub(&self) -> Result<Option<String>> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(DeviceCommand::GetHub { respond_to: tx })
            .await
            .context("failed to send GetHub command")?;

        rx.await.context("failed to receive response")
    }

    /// Send the final `offline` status and stop the actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(DeviceCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")
    }

    /// Wait until the actor has stopped
    pub async fn closed(&self) {
        self.sender.closed().await;
    }
}
