//! End-to-end tests: a device runtime reporting into a real hub
//!
//! These tests verify:
//! - Calibration is visible on the hub before the device goes online
//! - A leak produces exactly one stored alert per cooldown window
//! - A device that returns to normal clears its sensor on the hub
//! - Shutdown marks the device offline

use std::time::Duration;

use leak_monitoring::{
    DeviceState,
    actors::{device::DeviceHandle, messages::Connectivity},
    monitors::sensors::{SensorError, SensorSource},
};
use pretty_assertions::assert_eq;

use crate::helpers::*;

#[tokio::test]
async fn test_device_goes_from_calibrating_to_online() {
    let hub = spawn_test_hub().await;
    let device = DeviceHandle::spawn(test_device_config(Some(&hub.base_url())), leaking_source(u64::MAX));

    let store = hub.store.clone();
    assert!(
        wait_for(Duration::from_secs(2), || {
            let store = store.clone();
            async move {
                let snapshot = store.snapshot().await.unwrap();
                snapshot.devices.first().map(|d| d.state) == Some(DeviceState::Calibrating)
            }
        })
        .await
    );

    device.poll_now().await.unwrap();

    let snapshot = hub.store.snapshot().await.unwrap();
    let record = &snapshot.devices[0];
    assert_eq!(record.ip.to_string(), "192.168.1.50");
    assert_eq!(record.state, DeviceState::Online);
    assert_eq!(record.connectivity, Connectivity::Online);

    device.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_leak_is_stored_once_per_cooldown_window() {
    let hub = spawn_test_hub().await;
    let device = DeviceHandle::spawn(test_device_config(Some(&hub.base_url())), leaking_source(2));

    // startup poll and one PollNow calibrate, the next two see the leak
    device.poll_now().await.unwrap();
    device.poll_now().await.unwrap();
    device.poll_now().await.unwrap();

    let alerts = hub.store.alerts(None).await.unwrap();
    assert_eq!(alerts.len(), 1);

    let alert = &alerts[0];
    assert_eq!(alert.sensor, 1);
    assert_eq!(alert.location, "Vat Left");
    assert_eq!(alert.value, 450.0);
    assert_eq!(alert.threshold, 150.0);
    assert_eq!(alert.device_ip.to_string(), "192.168.1.50");
    assert!(alert.alert);

    let sensors = hub.store.sensors().await.unwrap();
    assert!(sensors["192.168.1.50/sensor1"].alert);

    device.shutdown().await.unwrap();
}

/// Reads a scripted sequence per call, repeating the last value once exhausted
struct ScriptedSource {
    values: Vec<f32>,
    next: usize,
}

#[async_trait::async_trait]
impl SensorSource for ScriptedSource {
    async fn read(&mut self, _channel: u32) -> Result<f32, SensorError> {
        let value = self.values[self.next.min(self.values.len() - 1)];
        self.next += 1;
        Ok(value)
    }
}

#[tokio::test]
async fn test_recovery_clears_sensor_on_hub() {
    let hub = spawn_test_hub().await;

    let mut config = test_device_config(Some(&hub.base_url()));
    config.cooldown_ms = 50;
    let source = ScriptedSource {
        values: vec![0.0, 0.0, 450.0, 0.0],
        next: 0,
    };
    let device = DeviceHandle::spawn(config, Box::new(source));

    device.poll_now().await.unwrap();
    device.poll_now().await.unwrap();
    assert!(hub.store.sensors().await.unwrap()["192.168.1.50/sensor1"].alert);

    tokio::time::sleep(Duration::from_millis(100)).await;
    device.poll_now().await.unwrap();

    let sensors = hub.store.sensors().await.unwrap();
    assert!(!sensors["192.168.1.50/sensor1"].alert);
    // the clear does not add to the history
    assert_eq!(hub.store.alerts(None).await.unwrap().len(), 1);

    device.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_marks_device_offline_on_hub() {
    let hub = spawn_test_hub().await;
    let device = DeviceHandle::spawn(test_device_config(Some(&hub.base_url())), leaking_source(u64::MAX));
    device.poll_now().await.unwrap();

    device.shutdown().await.unwrap();
    device.closed().await;

    let snapshot = hub.store.snapshot().await.unwrap();
    assert_eq!(snapshot.devices[0].state, DeviceState::Offline);
    assert_eq!(snapshot.devices[0].connectivity, Connectivity::Offline);
}
