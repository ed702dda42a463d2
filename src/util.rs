use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};

const HUB_PORT: &str = "HUB_PORT";

const DEFAULT_PORT: u16 = 8080;

pub fn get_port() -> Option<u16> {
    std::env::var(HUB_PORT).ok().and_then(|res| res.parse().ok())
}

const HUB_ADDR: &str = "HUB_ADDR";

const DEFAULT_ADDR: Ipv4Addr = Ipv4Addr::new(0, 0, 0, 0);

pub fn get_addr() -> Option<IpAddr> {
    std::env::var(HUB_ADDR).ok().and_then(|res| res.parse().ok())
}

const HUB_SECRET: &str = "HUB_SECRET";

pub fn get_secret() -> Option<String> {
    std::env::var(HUB_SECRET).ok().filter(|secret| !secret.is_empty())
}

/// Bind address: environment first, then the configured address, then 0.0.0.0:8080
pub fn resolve_bind_addr(configured: Option<SocketAddr>) -> SocketAddr {
    let base = configured.unwrap_or(SocketAddr::new(IpAddr::V4(DEFAULT_ADDR), DEFAULT_PORT));
    SocketAddr::new(
        get_addr().unwrap_or(base.ip()),
        get_port().unwrap_or(base.port()),
    )
}

/// Local address the OS would use to reach `target`
///
/// Connecting a UDP socket sends nothing; it only selects a route.
pub fn local_ip_for(target: SocketAddr) -> Option<IpAddr> {
    let unspecified = match target {
        SocketAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        SocketAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    };
    let socket = UdpSocket::bind((unspecified, 0)).ok()?;
    socket.connect(target).ok()?;
    socket.local_addr().ok().map(|addr| addr.ip())
}

/// Resolve the host of a hub base URL to a socket address
///
/// Hostnames go through the system resolver and IPv4 results win. A URL without a port
/// gets the scheme's default port.
pub async fn resolve_socket_addr(base_url: &str) -> Option<SocketAddr> {
    let url = normalize_base_url(base_url);
    let (scheme, rest) = url.split_once("://")?;
    let authority = rest.split('/').next()?;

    let has_port = authority
        .rsplit_once(':')
        .is_some_and(|(_, port)| !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()));
    let target = if has_port {
        authority.to_string()
    } else {
        let port = if scheme == "https" { 443 } else { 80 };
        format!("{authority}:{port}")
    };

    let addrs: Vec<SocketAddr> = tokio::net::lookup_host(target).await.ok()?.collect();
    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or(addrs.first())
        .copied()
}

/// Local address used to reach the hub behind `base_url`
pub async fn local_ip_for_url(base_url: &str) -> Option<IpAddr> {
    local_ip_for(resolve_socket_addr(base_url).await?)
}

/// Normalise an operator-supplied hub address into a base URL
///
/// Accepts `host:port`, `http://host:port` and trailing slashes.
pub fn normalize_base_url(address: &str) -> String {
    let trimmed = address.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}
