use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::auth::AccessToken;
use crate::error::ApiError;

pub const DEFAULT_ENDPOINT: &str = "https://monitoring.googleapis.com";

/// Namespace prefix for user-defined metric types.
pub const CUSTOM_METRIC_DOMAIN: &str = "custom.googleapis.com";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateTimeSeriesRequest {
    time_series: Vec<TimeSeries>,
}

/// One custom time series carrying a single data point.
#[derive(Debug, Serialize)]
pub struct TimeSeries {
    metric: Metric,
    resource: MonitoredResource,
    points: Vec<Point>,
}

#[derive(Debug, Serialize)]
struct Metric {
    #[serde(rename = "type")]
    metric_type: String,
}

#[derive(Debug, Serialize)]
struct MonitoredResource {
    #[serde(rename = "type")]
    resource_type: String,
    labels: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
struct Point {
    interval: TimeInterval,
    value: TypedValue,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TimeInterval {
    start_time: String,
    end_time: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TypedValue {
    double_value: f64,
}

impl TimeSeries {
    /// A gauge sample: one point with a zero-width interval at `at`, typed
    /// under the custom metric namespace and pinned to the global resource
    /// of the owning project.
    pub fn gauge(metric_name: &str, project_id: &str, value: f64, at: DateTime<Utc>) -> TimeSeries {
        let stamp = at.to_rfc3339_opts(SecondsFormat::Nanos, true);
        TimeSeries {
            metric: Metric {
                metric_type: format!("{}/{}", CUSTOM_METRIC_DOMAIN, metric_name),
            },
            resource: MonitoredResource {
                resource_type: "global".to_string(),
                labels: HashMap::from([("project_id".to_string(), project_id.to_string())]),
            },
            points: vec![Point {
                interval: TimeInterval {
                    start_time: stamp.clone(),
                    end_time: stamp,
                },
                value: TypedValue {
                    double_value: value,
                },
            }],
        }
    }
}

/// Thin wrapper around the `timeSeries.create` call of the Cloud Monitoring
/// v3 REST API.
#[derive(Clone)]
pub struct MonitoringClient {
    http: reqwest::Client,
    token: AccessToken,
    endpoint: String,
}

impl MonitoringClient {
    pub fn new(http: &reqwest::Client, token: &AccessToken, endpoint: impl Into<String>) -> Self {
        MonitoringClient {
            http: http.clone(),
            token: token.clone(),
            endpoint: endpoint.into(),
        }
    }

    pub async fn create_time_series(
        &self,
        project_id: &str,
        series: TimeSeries,
    ) -> Result<(), ApiError> {
        let url = format!("{}/v3/projects/{}/timeSeries", self.endpoint, project_id);
        let body = CreateTimeSeriesRequest {
            time_series: vec![series],
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(self.token.token())
            .json(&body)
            .send()
            .await
            .map_err(ApiError::from)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, body));
        }

        Ok(())
    }
}
