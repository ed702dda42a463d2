//! Device-side discovery: ask the group, take the first matching answer

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use tokio::net::UdpSocket;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, instrument, trace};

use crate::config::DiscoveryConfig;

use super::{
    DiscoveryError, DiscoveryMessage, DiscoveryRecord, MAX_DATAGRAM_SIZE, PROTOCOL_VERSION,
    SERVICE_TYPE,
};

/// Query for a hub and wait for the first matching record
///
/// Both `response` and `announce` datagrams are accepted; anything with a different
/// service type or protocol version is skipped. Gives up with
/// [`DiscoveryError::Timeout`] once `config.timeout()` has passed.
#[instrument(skip(config), fields(target = %config.target()))]
pub async fn discover(config: &DiscoveryConfig) -> Result<DiscoveryRecord, DiscoveryError> {
    let target = config.target();
    let bind: SocketAddr = match target.ip() {
        IpAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        IpAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };

    let socket = UdpSocket::bind(bind).await?;
    if let IpAddr::V4(group) = target.ip()
        && group.is_multicast()
    {
        socket.set_multicast_ttl_v4(1)?;
    }

    let query = serde_json::to_vec(&DiscoveryMessage::query())?;
    socket.send_to(&query, target).await?;
    trace!("sent discovery query");

    let deadline = Instant::now() + config.timeout();
    let mut buffer = [0u8; MAX_DATAGRAM_SIZE];

    loop {
        let Ok(received) = timeout_at(deadline, socket.recv_from(&mut buffer)).await else {
            debug!("no hub answered within {:?}", config.timeout());
            return Err(DiscoveryError::Timeout(config.timeout()));
        };
        let (len, source) = received?;

        let record = match serde_json::from_slice::<DiscoveryMessage>(&buffer[..len]) {
            Ok(DiscoveryMessage::Response(record) | DiscoveryMessage::Announce(record)) => record,
            Ok(DiscoveryMessage::Query { .. }) => continue,
            Err(e) => {
                trace!("ignoring unreadable datagram from {source}: {e}");
                continue;
            }
        };

        if !record.matches(SERVICE_TYPE, PROTOCOL_VERSION) {
            trace!(
                "ignoring {} v{} from {source}",
                record.service_type, record.protocol_version
            );
            continue;
        }

        let record = record.resolved(source.ip());
        debug!("discovered hub {} at {}", record.instance, record.socket_addr());
        return Ok(record);
    }
}
