//! Integration tests for WebSocket fanout
//!
//! Subscribers get a snapshot first, then every alert and update in mutation order.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use leak_monitoring::actors::messages::HubEvent;
use pretty_assertions::assert_eq;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

use crate::helpers::*;

type Stream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn connect(hub: &TestHub) -> Stream {
    let (stream, _) = connect_async(hub.ws_url()).await.unwrap();
    stream
}

async fn send(stream: &mut Stream, text: &str) {
    stream.send(Message::Text(text.to_string())).await.unwrap();
}

/// Next hub event, or `None` if nothing arrives within `wait`
async fn next_event(stream: &mut Stream, wait: Duration) -> Option<HubEvent> {
    loop {
        let msg = tokio::time::timeout(wait, stream.next()).await.ok()??.ok()?;
        if let Message::Text(text) = msg {
            return Some(serde_json::from_str(&text).unwrap());
        }
    }
}

#[tokio::test]
async fn test_subscribe_receives_current_snapshot() {
    let hub = spawn_test_hub().await;
    let client = reqwest::Client::new();

    client
        .post(hub.url("/api/sensor_status"))
        .json(&status_json("10.0.0.2", "online"))
        .send()
        .await
        .unwrap();
    client
        .post(hub.url("/api/leak_alert"))
        .json(&alert_json("10.0.0.2", 1, 450.0))
        .send()
        .await
        .unwrap();

    let mut stream = connect(&hub).await;
    send(&mut stream, r#"{"type":"subscribe"}"#).await;

    let Some(HubEvent::Snapshot(snapshot)) = next_event(&mut stream, Duration::from_secs(2)).await
    else {
        panic!("expected a snapshot first");
    };

    let expected = hub.store.snapshot().await.unwrap();
    assert_eq!(snapshot.devices, expected.devices);
    assert_eq!(snapshot.sensors, expected.sensors);
    assert_eq!(snapshot.alerts, expected.alerts);
}

#[tokio::test]
async fn test_nothing_is_sent_before_subscribe() {
    let hub = spawn_test_hub().await;
    let mut stream = connect(&hub).await;

    reqwest::Client::new()
        .post(hub.url("/api/leak_alert"))
        .json(&alert_json("10.0.0.2", 1, 450.0))
        .send()
        .await
        .unwrap();

    assert!(next_event(&mut stream, Duration::from_millis(300)).await.is_none());
}

#[tokio::test]
async fn test_alert_is_followed_by_update() {
    let hub = spawn_test_hub().await;
    let mut stream = connect(&hub).await;
    send(&mut stream, r#"{"type":"subscribe"}"#).await;
    assert!(matches!(
        next_event(&mut stream, Duration::from_secs(2)).await,
        Some(HubEvent::Snapshot(_))
    ));

    reqwest::Client::new()
        .post(hub.url("/api/leak_alert"))
        .json(&alert_json("10.0.0.2", 2, 450.0))
        .send()
        .await
        .unwrap();

    let Some(HubEvent::Alert(alert)) = next_event(&mut stream, Duration::from_secs(2)).await else {
        panic!("expected the alert event");
    };
    assert_eq!(alert.sensor, 2);
    assert_eq!(alert.value, 450.0);

    let Some(HubEvent::Update(update)) = next_event(&mut stream, Duration::from_secs(2)).await
    else {
        panic!("expected an update after the alert");
    };
    assert_eq!(update.alerts.last(), Some(&alert));
    assert!(update.sensors["10.0.0.2/sensor2"].alert);
}

#[tokio::test]
async fn test_every_subscriber_sees_the_same_events() {
    let hub = spawn_test_hub().await;
    let mut streams = vec![connect(&hub).await, connect(&hub).await, connect(&hub).await];

    for stream in &mut streams {
        send(stream, r#"{"type":"subscribe"}"#).await;
        assert!(matches!(
            next_event(stream, Duration::from_secs(2)).await,
            Some(HubEvent::Snapshot(_))
        ));
    }

    let client = reqwest::Client::new();
    for sensor in 1..=3 {
        client
            .post(hub.url("/api/leak_alert"))
            .json(&alert_json("10.0.0.2", sensor, 450.0))
            .send()
            .await
            .unwrap();
    }

    for stream in &mut streams {
        let mut sensors = Vec::new();
        while sensors.len() < 3 {
            match next_event(stream, Duration::from_secs(2)).await {
                Some(HubEvent::Alert(alert)) => sensors.push(alert.sensor),
                Some(_) => {}
                None => panic!("missing alert events"),
            }
        }
        assert_eq!(sensors, vec![1, 2, 3]);
    }
}

#[tokio::test]
async fn test_unsubscribe_stops_delivery() {
    let hub = spawn_test_hub().await;
    let mut stream = connect(&hub).await;
    send(&mut stream, r#"{"type":"subscribe"}"#).await;
    assert!(matches!(
        next_event(&mut stream, Duration::from_secs(2)).await,
        Some(HubEvent::Snapshot(_))
    ));

    send(&mut stream, r#"{"type":"unsubscribe"}"#).await;
    // let the handler process the unsubscribe before the next mutation
    tokio::time::sleep(Duration::from_millis(100)).await;

    reqwest::Client::new()
        .post(hub.url("/api/leak_alert"))
        .json(&alert_json("10.0.0.2", 1, 450.0))
        .send()
        .await
        .unwrap();

    assert!(next_event(&mut stream, Duration::from_millis(300)).await.is_none());

    // resubscribing starts over with a snapshot that already holds the alert
    send(&mut stream, r#"{"type":"subscribe"}"#).await;
    let Some(HubEvent::Snapshot(snapshot)) = next_event(&mut stream, Duration::from_secs(2)).await
    else {
        panic!("expected a fresh snapshot");
    };
    assert_eq!(snapshot.alerts.len(), 1);
}

#[tokio::test]
async fn test_disconnected_subscriber_does_not_block_ingest() {
    let hub = spawn_test_hub().await;
    let mut stream = connect(&hub).await;
    send(&mut stream, r#"{"type":"subscribe"}"#).await;
    next_event(&mut stream, Duration::from_secs(2)).await;
    drop(stream);

    let client = reqwest::Client::new();
    for i in 0..20 {
        let response = client
            .post(hub.url("/api/leak_alert"))
            .json(&alert_json("10.0.0.2", 1, 200.0 + f64::from(i)))
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());
    }

    assert_eq!(hub.store.alerts(None).await.unwrap().len(), 20);
}
