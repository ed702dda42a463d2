//! Report endpoints called by devices
//!
//! Bodies are deserialized into strict types and validated before anything reaches the
//! store, so a rejected report never mutates hub state.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use tracing::{debug, instrument};

use crate::{
    LeakAlertReport, ReportResponse, StatusReport,
    api::{error::ApiResult, state::ApiState},
};

/// POST /api/leak_alert
#[instrument(skip_all)]
pub async fn leak_alert(
    State(state): State<ApiState>,
    report: Result<Json<LeakAlertReport>, JsonRejection>,
) -> ApiResult<Json<ReportResponse>> {
    let Json(report) = report?;
    let alert = report.validate(state.channels)?;

    if state.store.ingest_alert(alert).await?.is_none() {
        return Ok(Json(ReportResponse::ok("Alert cleared")));
    }

    Ok(Json(ReportResponse::ok("Alert received")))
}

/// POST /api/sensor_status
#[instrument(skip_all)]
pub async fn sensor_status(
    State(state): State<ApiState>,
    report: Result<Json<StatusReport>, JsonRejection>,
) -> ApiResult<Json<ReportResponse>> {
    let Json(report) = report?;
    let status = report.validate(state.channels)?;

    let device = state.store.ingest_status(status).await?;
    debug!("status update from {}: {}", device.ip, device.state);

    Ok(Json(ReportResponse::ok("Status received")))
}
