//! Hub-side discovery responder
//!
//! Answers queries for our service type with a unicast `response` and, when bound to a
//! multicast group, multicasts an `announce` every announce interval.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, instrument, trace, warn};

use crate::config::DiscoveryConfig;

use super::{DiscoveryMessage, DiscoveryRecord, MAX_DATAGRAM_SIZE};

#[derive(Debug)]
enum ResponderCommand {
    Shutdown,
}

struct ResponderActor {
    socket: UdpSocket,
    record: DiscoveryRecord,
    /// Where announcements go; `None` when not bound to a multicast group
    announce_to: Option<SocketAddr>,
    announce_interval: Duration,
    command_rx: mpsc::Receiver<ResponderCommand>,
}

impl ResponderActor {
    #[instrument(skip(self), fields(instance = %self.record.instance))]
    async fn run(mut self) {
        debug!("starting discovery responder");

        let mut announce = time::interval(self.announce_interval);
        announce.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut buffer = [0u8; MAX_DATAGRAM_SIZE];

        loop {
            tokio::select! {
                received = self.socket.recv_from(&mut buffer) => {
                    match received {
                        Ok((len, source)) => self.handle_datagram(&buffer[..len], source).await,
                        Err(e) => warn!("discovery socket error: {e}"),
                    }
                }

                _ = announce.tick(), if self.announce_to.is_some() => {
                    self.announce().await;
                }

                cmd = self.command_rx.recv() => match cmd {
                    Some(ResponderCommand::Shutdown) | None => {
                        debug!("received shutdown command");
                        break;
                    }
                }
            }
        }

        debug!("discovery responder stopped");
    }

    async fn handle_datagram(&self, datagram: &[u8], source: SocketAddr) {
        let Ok(DiscoveryMessage::Query {
            service_type,
            protocol_version,
        }) = serde_json::from_slice::<DiscoveryMessage>(datagram)
        else {
            // our own announcements loop back on multicast, among other things
            return;
        };

        if !self.record.matches(&service_type, protocol_version) {
            trace!("ignoring query for {service_type} v{protocol_version} from {source}");
            return;
        }

        debug!("answering discovery query from {source}");
        self.send(&DiscoveryMessage::Response(self.record.clone()), source)
            .await;
    }

    async fn announce(&self) {
        if let Some(target) = self.announce_to {
            trace!("announcing to {target}");
            self.send(&DiscoveryMessage::Announce(self.record.clone()), target)
                .await;
        }
    }

    async fn send(&self, message: &DiscoveryMessage, target: SocketAddr) {
        let payload = match serde_json::to_vec(message) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("failed to encode discovery message: {e}");
                return;
            }
        };

        if let Err(e) = self.socket.send_to(&payload, target).await {
            warn!("failed to send discovery datagram to {target}: {e}");
        }
    }
}

/// Handle to a running responder
#[derive(Clone)]
pub struct ResponderHandle {
    sender: mpsc::Sender<ResponderCommand>,
    local_addr: SocketAddr,
}

impl ResponderHandle {
    /// Bind the discovery socket and spawn the responder
    ///
    /// With a multicast `group` the socket binds the wildcard address on `port` and
    /// joins the group. Any other address is bound directly.
    pub async fn spawn(config: &DiscoveryConfig, record: DiscoveryRecord) -> Result<Self> {
        let group = config.group;

        let (socket, announce_to) = if group.is_multicast() {
            let socket = match group {
                IpAddr::V4(v4) => {
                    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, config.port)).await?;
                    socket
                        .join_multicast_v4(v4, Ipv4Addr::UNSPECIFIED)
                        .context("failed to join discovery multicast group")?;
                    socket.set_multicast_ttl_v4(1)?;
                    socket
                }
                IpAddr::V6(v6) => {
                    let socket = UdpSocket::bind((Ipv6Addr::UNSPECIFIED, config.port)).await?;
                    socket
                        .join_multicast_v6(&v6, 0)
                        .context("failed to join discovery multicast group")?;
                    socket
                }
            };
            (socket, Some(config.target()))
        } else {
            let socket = UdpSocket::bind(config.target()).await?;
            (socket, None)
        };

        let local_addr = socket
            .local_addr()
            .context("discovery socket has no local address")?;
        info!(
            "discovery responder on {local_addr} advertising {}",
            record.socket_addr()
        );

        let (cmd_tx, cmd_rx) = mpsc::channel(4);
        let actor = ResponderActor {
            socket,
            record,
            announce_to,
            announce_interval: config.announce_interval(),
            command_rx: cmd_rx,
        };
        tokio::spawn(actor.run());

        Ok(Self {
            sender: cmd_tx,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn shutdown(&self) {
        let _ = self.sender.send(ResponderCommand::Shutdown).await;
    }
}
