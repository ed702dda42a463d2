//! Integration tests for hub discovery
//!
//! These tests verify:
//! - A device with no configured hub finds one through the responder
//! - Discovery that times out falls back to the static hub address
//! - Records for other services are ignored

use std::net::{IpAddr, Ipv4Addr};

use leak_monitoring::{
    actors::device::DeviceHandle,
    config::DiscoveryConfig,
    discovery::{self, DiscoveryError, DiscoveryRecord, ResponderHandle},
};
use pretty_assertions::assert_eq;
use tokio::net::UdpSocket;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

fn loopback_discovery(port: u16) -> DiscoveryConfig {
    DiscoveryConfig {
        enabled: true,
        group: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port,
        timeout_ms: 500,
        ..DiscoveryConfig::default()
    }
}

#[tokio::test]
async fn test_device_discovers_hub_and_reports() {
    let hub = spawn_test_hub().await;

    let record = DiscoveryRecord::for_hub("cellar hub", hub.addr);
    let responder = ResponderHandle::spawn(&loopback_discovery(0), record)
        .await
        .unwrap();

    let mut config = test_device_config(None);
    config.discovery = loopback_discovery(responder.local_addr().port());
    let device = DeviceHandle::spawn(config, leaking_source(u64::MAX));

    device.poll_now().await.unwrap();
    assert_eq!(device.hub().await.unwrap(), Some(hub.base_url()));

    let snapshot = hub.store.snapshot().await.unwrap();
    assert_eq!(snapshot.devices.len(), 1);
    assert_eq!(snapshot.devices[0].ip.to_string(), "192.168.1.50");

    device.shutdown().await.unwrap();
    responder.shutdown().await;
}

#[tokio::test]
async fn test_silent_discovery_falls_back_to_static_hub() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/sensor_status"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"success": true, "message": "Status received"})),
        )
        .expect(1..)
        .mount(&server)
        .await;

    // bound but never answers
    let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let mut config = test_device_config(Some(&server.uri()));
    config.discovery = loopback_discovery(silent.local_addr().unwrap().port());
    config.discovery.timeout_ms = 200;
    let device = DeviceHandle::spawn(config, leaking_source(u64::MAX));

    device.poll_now().await.unwrap();
    assert_eq!(device.hub().await.unwrap(), Some(server.uri()));

    device.shutdown().await.unwrap();
    device.closed().await;
    server.verify().await;
}

#[tokio::test]
async fn test_client_times_out_without_responder() {
    let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let mut config = loopback_discovery(silent.local_addr().unwrap().port());
    config.timeout_ms = 100;

    let result = discovery::discover(&config).await;
    assert!(matches!(result, Err(DiscoveryError::Timeout(_))));
}

#[tokio::test]
async fn test_discovered_record_resolves_unspecified_address() {
    let hub = spawn_test_hub().await;

    // a hub bound to every interface advertises 0.0.0.0
    let advertised = format!("0.0.0.0:{}", hub.addr.port()).parse().unwrap();
    let responder = ResponderHandle::spawn(
        &loopback_discovery(0),
        DiscoveryRecord::for_hub("cellar hub", advertised),
    )
    .await
    .unwrap();

    let record = discovery::discover(&loopback_discovery(responder.local_addr().port()))
        .await
        .unwrap();

    assert_eq!(record.instance, "cellar hub");
    assert_eq!(record.socket_addr(), hub.addr);
    assert_eq!(record.base_url(), hub.base_url());

    responder.shutdown().await;
}
