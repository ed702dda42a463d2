//! ReporterActor - delivers a device's reports to its hub
//!
//! ## Message Flow
//!
//! ```text
//! DeviceActor ──try_send──► queue (bounded) ──► ReporterActor ──► ReportClient → hub
//!                                                   │
//!                                     no hub? discovery, then static address
//! ```
//!
//! The queue is drained one command at a time, so at most one report is in flight while
//! the device keeps polling. When the queue is full new reports are dropped.
//!
//! ## Hub resolution
//!
//! Before the first report, and again after `failure_threshold` consecutive failed
//! status reports, the actor runs discovery. If nobody answers it falls back to the
//! static hub address from the config. Every successful resolution is followed by an
//! immediate status report. The reporter stamps its detected address into every report.

use std::net::{IpAddr, Ipv4Addr};

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::{
    LeakAlertReport, StatusReport, config::DeviceConfig, discovery, transport::ReportClient,
    util,
};

use super::messages::ReportCommand;

/// Reports waiting for delivery before new ones are dropped
pub const REPORT_QUEUE_CAPACITY: usize = 32;

pub struct ReporterActor {
    config: DeviceConfig,

    /// Client for the currently resolved hub
    hub: Option<ReportClient>,

    device_ip: IpAddr,

    /// Replayed after every (re)connection
    latest_status: Option<StatusReport>,

    status_failures: usize,

    receiver: mpsc::Receiver<ReportCommand>,
}

impl ReporterActor {
    pub fn new(config: DeviceConfig, receiver: mpsc::Receiver<ReportCommand>) -> Self {
        Self {
            device_ip: config
                .device_ip
                .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            config,
            hub: None,
            latest_status: None,
            status_failures: 0,
            receiver,
        }
    }

    /// Run until every sender is gone and the queue is drained
    #[instrument(skip(self), name = "reporter")]
    pub async fn run(mut self) {
        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                ReportCommand::Status(report) => {
                    self.latest_status = Some(report);
                    if self.hub.is_none() {
                        self.resolve_hub().await;
                    }
                    self.send_status().await;
                }

                ReportCommand::Alert(report) => {
                    if self.hub.is_none() && self.resolve_hub().await {
                        // every (re)connection announces itself first
                        self.send_status().await;
                    }
                    self.send_alert(report).await;
                }

                ReportCommand::Offline(report) => {
                    self.send_offline(report).await;
                }

                ReportCommand::Flush { respond_to } => {
                    let _ = respond_to.send(());
                }

                ReportCommand::GetHub { respond_to } => {
                    let _ = respond_to.send(self.hub.as_ref().map(|hub| hub.base_url().to_string()));
                }
            }
        }

        debug!("reporter stopped");
    }

    /// Find a hub: discovery first, static address second
    ///
    /// Returns true once a hub client is in place.
    async fn resolve_hub(&mut self) -> bool {
        let mut base_url = None;
        let mut detected_ip = None;

        if self.config.discovery.enabled {
            match discovery::discover(&self.config.discovery).await {
                Ok(record) => {
                    info!("discovered hub {} at {}", record.instance, record.base_url());
                    detected_ip = util::local_ip_for(record.socket_addr());
                    base_url = Some(record.base_url());
                }
                Err(e) => warn!("discovery failed: {e}"),
            }
        }

        if base_url.is_none()
            && let Some(hub) = &self.config.hub
        {
            info!("falling back to static hub address {hub}");
            detected_ip = util::local_ip_for_url(hub).await;
            base_url = Some(hub.clone());
        }

        let Some(base_url) = base_url else {
            warn!("no hub address available, reports are dropped until one is found");
            return false;
        };

        let client = match ReportClient::new(
            &base_url,
            self.config.token.clone(),
            self.config.request_timeout(),
        ) {
            Ok(client) => client,
            Err(e) => {
                error!("failed to build HTTP client for {base_url}: {e}");
                return false;
            }
        };

        if self.config.device_ip.is_none()
            && let Some(ip) = detected_ip
        {
            self.device_ip = ip;
        }

        debug!("reporting to {} as {}", client.base_url(), self.device_ip);
        self.hub = Some(client);
        self.status_failures = 0;
        true
    }

    async fn send_alert(&self, mut report: LeakAlertReport) {
        let Some(hub) = &self.hub else {
            warn!("dropping report for sensor {}: no hub", report.sensor);
            return;
        };

        report.device_ip = self.device_ip;
        match hub.send_alert(&report).await {
            Ok(response) => trace!("hub answered: {}", response.message),
            Err(e) => warn!("dropping report for sensor {}: {e}", report.sensor),
        }
    }

    async fn send_status(&mut self) {
        let (Some(hub), Some(report)) = (&self.hub, &self.latest_status) else {
            return;
        };

        let mut report = report.clone();
        report.ip = self.device_ip;
        match hub.send_status(&report).await {
            Ok(_) => {
                trace!("status {} delivered", report.status);
                self.status_failures = 0;
            }
            Err(e) => {
                self.status_failures += 1;
                let reason = if e.is_unreachable() { "unreachable" } else { "rejected" };
                warn!(
                    "status report {reason} ({}/{}): {e}",
                    self.status_failures, self.config.failure_threshold
                );

                if self.status_failures >= self.config.failure_threshold {
                    info!("giving up on {}, rediscovering on next report", hub.base_url());
                    self.hub = None;
                    self.status_failures = 0;
                }
            }
        }
    }

    /// Best effort goodbye so the hub does not wait out the heartbeat window
    async fn send_offline(&self, mut report: StatusReport) {
        let Some(hub) = &self.hub else {
            return;
        };

        report.ip = self.device_ip;
        if let Err(e) = hub.send_status(&report).await {
            debug!("offline report not delivered: {e}");
        }
    }
}

/// Handle for queueing reports on a ReporterActor
#[derive(Clone)]
pub struct ReporterHandle {
    sender: mpsc::Sender<ReportCommand>,
}

impl ReporterHandle {
    /// Spawn a new reporter actor
    pub fn spawn(config: DeviceConfig) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(REPORT_QUEUE_CAPACITY);

        let actor = ReporterActor::new(config, rx);
        let task = tokio::spawn(actor.run());

        (Self { sender: tx }, task)
    }

    /// Queue a report without waiting; a full queue drops it
    pub fn submit(&self, cmd: ReportCommand) {
        if let Err(e) = self.sender.try_send(cmd) {
            match e {
                mpsc::error::TrySendError::Full(cmd) => {
                    warn!("report queue full, dropping {}", describe(&cmd));
                }
                mpsc::error::TrySendError::Closed(cmd) => {
                    debug!("reporter gone, dropping {}", describe(&cmd));
                }
            }
        }
    }

    /// Wait until everything queued so far has been handled
    pub async fn flush(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ReportCommand::Flush { respond_to: tx })
            .await
            .context("failed to send Flush command")?;

        rx.await.context("failed to receive response")
    }

    /// Base URL of the hub currently reported to
    pub async fn hub(&self) -> Result<Option<String>> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ReportCommand::GetHub { respond_to: tx })
            .await
            .context("failed to send GetHub command")?;

        rx.await.context("failed to receive response")
    }
}

fn describe(cmd: &ReportCommand) -> String {
    match cmd {
        ReportCommand::Status(report) | ReportCommand::Offline(report) => {
            format!("status {}", report.status)
        }
        ReportCommand::Alert(report) => format!("report for sensor {}", report.sensor),
        ReportCommand::Flush { .. } => "flush".to_string(),
        ReportCommand::GetHub { .. } => "hub query".to_string(),
    }
}
