//! Leak query and control endpoints

use std::collections::BTreeMap;

use axum::{
    Json,
    extract::{Query, State, rejection::QueryRejection},
};
use tracing::info;

use crate::{
    ReportResponse,
    actors::messages::SensorReading,
    api::{
        error::ApiResult,
        state::ApiState,
        types::{AlertsQuery, AlertsResponse, LeakStatusResponse, STATUS_RECENT_ALERTS},
    },
};

/// GET /api/v1/leak/status
///
/// Devices, sensor readings and the most recent alerts in one response.
pub async fn get_status(State(state): State<ApiState>) -> ApiResult<Json<LeakStatusResponse>> {
    let snapshot = state.store.snapshot().await?;

    let skip = snapshot.alerts.len().saturating_sub(STATUS_RECENT_ALERTS);
    let alerts = snapshot.alerts.into_iter().skip(skip).collect();

    Ok(Json(LeakStatusResponse {
        devices: snapshot.devices,
        sensors: snapshot.sensors,
        alerts,
    }))
}

/// GET /api/v1/leak/alerts
///
/// Query parameters:
/// - `limit`: only the last `limit` alerts (default: all)
pub async fn get_alerts(
    State(state): State<ApiState>,
    query: Result<Query<AlertsQuery>, QueryRejection>,
) -> ApiResult<Json<AlertsResponse>> {
    let Query(query) = query?;
    let alerts = state.store.alerts(query.limit).await?;

    Ok(Json(AlertsResponse {
        count: alerts.len(),
        alerts,
    }))
}

/// GET /api/v1/leak/sensors
pub async fn get_sensors(
    State(state): State<ApiState>,
) -> ApiResult<Json<BTreeMap<String, SensorReading>>> {
    Ok(Json(state.store.sensors().await?))
}

/// POST /api/v1/leak/clear_alerts
pub async fn clear_alerts(State(state): State<ApiState>) -> ApiResult<Json<ReportResponse>> {
    let removed = state.store.clear_alerts().await?;
    info!("alert history cleared ({removed} removed)");

    Ok(Json(ReportResponse::ok("Alerts cleared")))
}
