//! Helper functions for integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use leak_monitoring::{
    actors::store::{StoreHandle, StoreSettings},
    config::{ChannelConfig, DeviceConfig, DiscoveryConfig},
    monitors::sensors::{SensorSource, SimulatedLeak, SimulatedSource},
};

#[cfg(feature = "api")]
use leak_monitoring::api::{ApiConfig, ApiState, spawn_api_server};

/// A running hub on a random loopback port
#[cfg(feature = "api")]
pub struct TestHub {
    pub addr: SocketAddr,
    pub store: StoreHandle,
}

#[cfg(feature = "api")]
impl TestHub {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/api/v1/leak/stream", self.addr)
    }
}

#[cfg(feature = "api")]
pub async fn spawn_test_hub() -> TestHub {
    spawn_test_hub_with(StoreSettings::default(), None).await
}

#[cfg(feature = "api")]
pub async fn spawn_test_hub_with(settings: StoreSettings, auth_token: Option<&str>) -> TestHub {
    let store = StoreHandle::spawn(settings);

    let config = ApiConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(), // Random port
        auth_token: auth_token.map(str::to_string),
        enable_cors: true,
    };

    let addr = spawn_api_server(config, ApiState::new(store.clone(), 3))
        .await
        .unwrap();

    TestHub { addr, store }
}

pub fn alert_json(device_ip: &str, sensor: u32, value: f64) -> serde_json::Value {
    serde_json::json!({
        "sensor": sensor,
        "location": format!("Sensor {sensor}"),
        "value": value,
        "threshold": 150.0,
        "timestamp": "2024-06-01T12:00:00Z",
        "device_ip": device_ip,
        "alert": true
    })
}

pub fn status_json(ip: &str, status: &str) -> serde_json::Value {
    serde_json::json!({
        "status": status,
        "ip": ip,
        "chip": "ESP32-S3",
        "version": "1.0.0"
    })
}

/// Device config that only talks to `hub`, polls on command and calibrates quickly
pub fn test_device_config(hub: Option<&str>) -> DeviceConfig {
    DeviceConfig {
        hub: hub.map(str::to_string),
        device_ip: Some("192.168.1.50".parse().unwrap()),
        poll_interval_ms: 3_600_000,
        heartbeat_interval_secs: 3600,
        request_timeout_ms: 1000,
        calibration_samples: 2,
        channels: vec![ChannelConfig {
            id: 1,
            label: "Vat Left".to_string(),
            threshold: None,
        }],
        discovery: DiscoveryConfig {
            enabled: false,
            ..DiscoveryConfig::default()
        },
        ..DeviceConfig::default()
    }
}

/// Flat zero readings on every channel, plus 450 on channel 1 after `after_reads` reads
pub fn leaking_source(after_reads: u64) -> Box<dyn SensorSource> {
    Box::new(SimulatedSource::new(
        1,
        0.0,
        0.0,
        Some(SimulatedLeak {
            channel: 1,
            after_reads,
            offset: 450.0,
        }),
    ))
}

/// Poll `check` until it returns true or `timeout` passes
pub async fn wait_for<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
