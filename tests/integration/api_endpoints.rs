//! Integration tests for API endpoints
//!
//! These tests verify that:
//! - Report endpoints accept valid reports and reject invalid ones with 400
//! - Query endpoints return the store contents in insertion order
//! - Clearing is idempotent
//! - Authentication guards the report and control routes

use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use serde_json::{Value, json};

use crate::helpers::*;

#[tokio::test]
async fn test_status_example_marks_device_online() {
    let hub = spawn_test_hub().await;
    let client = reqwest::Client::new();

    let response = client
        .post(hub.url("/api/sensor_status"))
        .json(&status_json("192.168.1.50", "online"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"success": true, "message": "Status received"}));

    let status: Value = client
        .get(hub.url("/api/v1/leak/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let device = &status["devices"][0];
    assert_eq!(device["ip"], "192.168.1.50");
    assert_eq!(device["chip"], "ESP32-S3");
    assert_eq!(device["version"], "1.0.0");
    assert_eq!(device["connectivity"], "online");
}

#[tokio::test]
async fn test_alert_example_is_stored_with_exact_fields() {
    let hub = spawn_test_hub().await;
    let client = reqwest::Client::new();

    let response = client
        .post(hub.url("/api/leak_alert"))
        .json(&json!({
            "sensor": 1,
            "location": "Vat Left",
            "value": 450,
            "threshold": 150,
            "timestamp": "2024-06-01T12:00:00Z",
            "device_ip": "192.168.1.50",
            "alert": true
        }))
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"success": true, "message": "Alert received"}));

    let alerts: Value = client
        .get(hub.url("/api/v1/leak/alerts"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(alerts["count"], 1);
    let alert = &alerts["alerts"][0];
    assert_eq!(alert["sensor"], 1);
    assert_eq!(alert["location"], "Vat Left");
    assert_eq!(alert["value"], 450.0);
    assert_eq!(alert["threshold"], 150.0);
    assert_eq!(alert["timestamp"], "2024-06-01T12:00:00Z");
    assert_eq!(alert["device_ip"], "192.168.1.50");
    assert_eq!(alert["alert"], true);
    assert!(alert["received_at"].is_string());

    let sensors: Value = client
        .get(hub.url("/api/v1/leak/sensors"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(sensors["192.168.1.50/sensor1"]["alert"], true);
    assert_eq!(sensors["192.168.1.50/sensor1"]["value"], 450.0);
}

#[tokio::test]
async fn test_validation_errors_return_400_and_leave_store_untouched() {
    let hub = spawn_test_hub().await;
    let client = reqwest::Client::new();

    let invalid_alerts = [
        json!({"sensor": 0, "value": 450.0, "threshold": 150.0, "device_ip": "10.0.0.2"}),
        json!({"sensor": 7, "value": 450.0, "threshold": 150.0, "device_ip": "10.0.0.2"}),
        json!({"sensor": 1, "value": 450.0, "threshold": -1.0, "device_ip": "10.0.0.2"}),
        json!({"sensor": 1, "value": 450.0, "threshold": 150.0, "device_ip": "vat-left"}),
        json!({"sensor": 1, "threshold": 150.0, "device_ip": "10.0.0.2"}),
    ];

    for body in invalid_alerts {
        let response = client
            .post(hub.url("/api/leak_alert"))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "accepted {body}");
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["success"], false);
        assert!(body["message"].is_string());
    }

    let invalid_statuses = [
        json!({"status": "", "ip": "10.0.0.2"}),
        json!({"status": "sleeping", "ip": "10.0.0.2"}),
        json!({"status": "online", "ip": "not-an-address"}),
        json!({"ip": "10.0.0.2"}),
    ];

    for body in invalid_statuses {
        let response = client
            .post(hub.url("/api/sensor_status"))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "accepted {body}");
    }

    let response = client
        .post(hub.url("/api/leak_alert"))
        .header("Content-Type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let snapshot = hub.store.snapshot().await.unwrap();
    assert!(snapshot.alerts.is_empty());
    assert!(snapshot.devices.is_empty());
    assert!(snapshot.sensors.is_empty());
}

#[tokio::test]
async fn test_clear_alerts_is_idempotent() {
    let hub = spawn_test_hub().await;
    let client = reqwest::Client::new();

    client
        .post(hub.url("/api/leak_alert"))
        .json(&alert_json("10.0.0.2", 1, 450.0))
        .send()
        .await
        .unwrap();

    for _ in 0..2 {
        let body: Value = client
            .post(hub.url("/api/v1/leak/clear_alerts"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body, json!({"success": true, "message": "Alerts cleared"}));

        let alerts: Value = client
            .get(hub.url("/api/v1/leak/alerts"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(alerts, json!({"alerts": [], "count": 0}));
    }
}

#[tokio::test]
async fn test_status_overview_has_last_ten_alerts() {
    let hub = spawn_test_hub().await;
    let client = reqwest::Client::new();

    for i in 0..15 {
        client
            .post(hub.url("/api/leak_alert"))
            .json(&alert_json("10.0.0.2", 1, 200.0 + f64::from(i)))
            .send()
            .await
            .unwrap();
    }

    let status: Value = client
        .get(hub.url("/api/v1/leak/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let alerts = status["alerts"].as_array().unwrap();
    assert_eq!(alerts.len(), 10);
    assert_eq!(alerts[0]["value"], 205.0);
    assert_eq!(alerts[9]["value"], 214.0);
}

#[tokio::test]
async fn test_clear_report_updates_sensor_without_history() {
    let hub = spawn_test_hub().await;
    let client = reqwest::Client::new();

    client
        .post(hub.url("/api/leak_alert"))
        .json(&alert_json("10.0.0.2", 2, 450.0))
        .send()
        .await
        .unwrap();

    let mut clear = alert_json("10.0.0.2", 2, 3.0);
    clear["alert"] = json!(false);
    let response = client
        .post(hub.url("/api/leak_alert"))
        .json(&clear)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let stats: Value = client
        .get(hub.url("/api/v1/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["store"]["alerts"], 1);

    let sensors = hub.store.sensors().await.unwrap();
    assert!(!sensors["10.0.0.2/sensor2"].alert);
}

#[tokio::test]
async fn test_auth_guards_reports_when_secret_is_set() {
    let hub = spawn_test_hub_with(Default::default(), Some("test-token")).await;
    let client = reqwest::Client::new();

    let response = client
        .post(hub.url("/api/leak_alert"))
        .json(&alert_json("10.0.0.2", 1, 450.0))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = client
        .post(hub.url("/api/leak_alert"))
        .bearer_auth("wrong")
        .json(&alert_json("10.0.0.2", 1, 450.0))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = client
        .post(hub.url("/api/leak_alert"))
        .bearer_auth("test-token")
        .json(&alert_json("10.0.0.2", 1, 450.0))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = client.get(hub.url("/api/v1/health")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
