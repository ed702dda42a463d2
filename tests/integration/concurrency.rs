//! Concurrency tests for the hub
//!
//! These tests verify:
//! - Concurrent reports from several devices are all processed
//! - The alert history stays bounded with each device's alerts in send order
//! - Queries and subscriptions interleave safely with ingest

use std::collections::HashSet;
use std::time::Duration;

use leak_monitoring::{
    actors::{messages::HubEvent, store::StoreSettings},
    storage::ALERT_CAPACITY,
};
use pretty_assertions::assert_eq;

use crate::helpers::*;

async fn post_alerts(base: String, device_ip: &'static str, count: usize) {
    let client = reqwest::Client::new();
    for i in 0..count {
        let response = client
            .post(format!("{base}/api/leak_alert"))
            .json(&alert_json(device_ip, 1, i as f64))
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());
    }
}

#[tokio::test]
async fn test_concurrent_devices_keep_bounded_ordered_history() {
    let hub = spawn_test_hub().await;

    let first = tokio::spawn(post_alerts(hub.base_url(), "10.0.0.2", 40));
    let second = tokio::spawn(post_alerts(hub.base_url(), "10.0.0.3", 40));
    first.await.unwrap();
    second.await.unwrap();

    let alerts = hub.store.alerts(None).await.unwrap();
    assert_eq!(alerts.len(), ALERT_CAPACITY.min(80));

    let stats = hub.store.stats().await.unwrap();
    assert_eq!(stats.alerts_received, 80);
    assert_eq!(stats.alerts_evicted, 30);

    // ids are assigned in arrival order
    assert!(alerts.windows(2).all(|w| w[0].id < w[1].id));

    // each device's surviving alerts appear in the order it sent them
    for device in ["10.0.0.2", "10.0.0.3"] {
        let values: Vec<f64> = alerts
            .iter()
            .filter(|a| a.device_ip.to_string() == device)
            .map(|a| a.value)
            .collect();
        assert!(values.windows(2).all(|w| w[0] < w[1]), "{device}: {values:?}");
    }
}

#[tokio::test]
async fn test_concurrent_status_reports_register_every_device() {
    let hub = spawn_test_hub().await;

    let mut tasks = Vec::new();
    for i in 0..10 {
        let url = hub.url("/api/sensor_status");
        tasks.push(tokio::spawn(async move {
            let client = reqwest::Client::new();
            for _ in 0..5 {
                client
                    .post(&url)
                    .json(&status_json(&format!("10.0.1.{i}"), "online"))
                    .send()
                    .await
                    .unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let snapshot = hub.store.snapshot().await.unwrap();
    assert_eq!(snapshot.devices.len(), 10);
    assert!(snapshot.devices.iter().all(|d| d.is_online()));

    let ips: HashSet<_> = snapshot.devices.iter().map(|d| d.ip).collect();
    assert_eq!(ips.len(), 10);
}

#[tokio::test]
async fn test_queries_interleave_with_ingest() {
    let hub = spawn_test_hub().await;

    let writer = tokio::spawn(post_alerts(hub.base_url(), "10.0.0.2", 60));

    let store = hub.store.clone();
    let reader = tokio::spawn(async move {
        for _ in 0..50 {
            let alerts = store.alerts(None).await.unwrap();
            assert!(alerts.len() <= ALERT_CAPACITY);
            assert!(alerts.windows(2).all(|w| w[0].id < w[1].id));
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    });

    writer.await.unwrap();
    reader.await.unwrap();

    assert_eq!(hub.store.alerts(None).await.unwrap().len(), ALERT_CAPACITY);
}

#[tokio::test]
async fn test_subscription_sees_every_alert_after_its_snapshot() {
    let settings = StoreSettings {
        status_coalesce: Duration::from_millis(10),
        ..StoreSettings::default()
    };
    let hub = spawn_test_hub_with(settings, None).await;

    let writer = tokio::spawn(post_alerts(hub.base_url(), "10.0.0.2", 30));
    tokio::time::sleep(Duration::from_millis(5)).await;

    let mut subscription = hub.store.subscribe().await.unwrap();
    writer.await.unwrap();

    let mut ids: Vec<u64> = subscription.snapshot.alerts.iter().map(|a| a.id).collect();
    while let Ok(event) = subscription.events.try_recv() {
        if let HubEvent::Alert(alert) = event {
            ids.push(alert.id);
        }
    }

    // snapshot plus live events cover every alert exactly once
    assert_eq!(ids, (1..=30).collect::<Vec<u64>>());
}
