//! Hub discovery over UDP
//!
//! Devices find the hub without manual configuration by sending a JSON `query`
//! datagram to a multicast group. The hub's responder answers with a unicast
//! `response` carrying its [`DiscoveryRecord`] and also multicasts periodic
//! `announce` datagrams with the same record.
//!
//! ```text
//! device                         group:5354                      hub
//!   │── {"kind":"query"} ──────────►│──────────────────────────────►│
//!   │◄──────────────────────────── {"kind":"response", ...} ───────│ (unicast)
//! ```
//!
//! A record whose `address` is unspecified (`0.0.0.0`, the usual hub bind address)
//! is resolved against the source address of the datagram that carried it.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub mod client;
pub mod responder;

pub use client::discover;
pub use responder::ResponderHandle;

pub const SERVICE_TYPE: &str = "_leakwatch._tcp";

pub const PROTOCOL_VERSION: u32 = 1;

/// Largest datagram either side will read
pub(crate) const MAX_DATAGRAM_SIZE: usize = 2048;

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("no hub answered within {0:?}")]
    Timeout(Duration),

    #[error("discovery socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode discovery message: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiscoveryProperties {
    pub version: String,
    pub name: String,
}

/// What a hub advertises about itself
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiscoveryRecord {
    pub service_type: String,
    pub instance: String,
    pub address: IpAddr,
    pub port: u16,
    pub protocol_version: u32,
    pub properties: DiscoveryProperties,
}

impl DiscoveryRecord {
    pub fn for_hub(name: &str, addr: SocketAddr) -> Self {
        Self {
            service_type: SERVICE_TYPE.to_string(),
            instance: name.to_string(),
            address: addr.ip(),
            port: addr.port(),
            protocol_version: PROTOCOL_VERSION,
            properties: DiscoveryProperties {
                version: env!("CARGO_PKG_VERSION").to_string(),
                name: name.to_string(),
            },
        }
    }

    pub fn matches(&self, service_type: &str, protocol_version: u32) -> bool {
        self.service_type == service_type && self.protocol_version == protocol_version
    }

    /// Replace an unspecified address with the address the record arrived from
    pub fn resolved(mut self, source: IpAddr) -> Self {
        if self.address.is_unspecified() {
            self.address = source;
        }
        self
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    /// Base URL of the hub's HTTP API
    pub fn base_url(&self) -> String {
        format!("http://{}", self.socket_addr())
    }
}

/// One discovery datagram
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DiscoveryMessage {
    Announce(DiscoveryRecord),
    Response(DiscoveryRecord),
    Query {
        service_type: String,
        protocol_version: u32,
    },
}

impl DiscoveryMessage {
    pub fn query() -> Self {
        DiscoveryMessage::Query {
            service_type: SERVICE_TYPE.to_string(),
            protocol_version: PROTOCOL_VERSION,
        }
    }
}
