//! HTTP transport from a device to its hub
//!
//! One [`ReportClient`] per resolved hub address. The underlying `reqwest::Client` is
//! reused across requests; every request carries the configured timeout.

use std::time::Duration;

use reqwest::StatusCode;
use tracing::{instrument, trace};

use crate::{LeakAlertReport, ReportResponse, StatusReport, util::normalize_base_url};

pub const ALERT_PATH: &str = "/api/leak_alert";
pub const STATUS_PATH: &str = "/api/sensor_status";

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("hub rejected report ({status}): {message}")]
    Rejected { status: StatusCode, message: String },
}

impl TransportError {
    /// Network-level failure (timeout, refused connection) as opposed to a hub answer
    pub fn is_unreachable(&self) -> bool {
        matches!(self, TransportError::Request { .. })
    }
}

#[derive(Debug, Clone)]
pub struct ReportClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl ReportClient {
    pub fn new(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url: normalize_base_url(base_url),
            token,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[instrument(skip(self, report), fields(hub = %self.base_url))]
    pub async fn send_status(&self, report: &StatusReport) -> Result<ReportResponse, TransportError> {
        self.post(STATUS_PATH, report).await
    }

    #[instrument(skip(self, report), fields(hub = %self.base_url, sensor = report.sensor))]
    pub async fn send_alert(
        &self,
        report: &LeakAlertReport,
    ) -> Result<ReportResponse, TransportError> {
        self.post(ALERT_PATH, report).await
    }

    async fn post<T: serde::Serialize>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<ReportResponse, TransportError> {
        let url = format!("{}{path}", self.base_url);
        trace!("posting report to {url}");

        let mut request = self.client.post(&url).json(body);
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }

        let response = request
            .send()
            .await
            .map_err(|source| TransportError::Request {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| TransportError::Request { url, source })?;

        let parsed = serde_json::from_str::<ReportResponse>(&body).ok();

        if !status.is_success() {
            let message = parsed.map(|r| r.message).unwrap_or(body);
            return Err(TransportError::Rejected { status, message });
        }

        match parsed {
            Some(response) if response.success => Ok(response),
            Some(response) => Err(TransportError::Rejected {
                status,
                message: response.message,
            }),
            // a 2xx without the usual body still counts as delivered
            None => Ok(ReportResponse::ok(body)),
        }
    }
}
