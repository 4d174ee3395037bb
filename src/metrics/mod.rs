//! Duration metrics for the pipeline steps.
//!
//! Reporting goes through the [`DurationRecorder`] port so the steps stay
//! testable without a monitoring backend. The production implementation
//! publishes each sample as a custom Cloud Monitoring time series; reporting
//! is best-effort and never fails its caller.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error};

use crate::monitoring::{MonitoringClient, TimeSeries};

/// Elapsed seconds of the project listing call.
pub const PROJECT_API_DURATION: &str = "dfc_prj_api_duration";
/// Elapsed seconds of one whole transform batch.
pub const PROCESSING_DURATION: &str = "dfc_prj_processing_duration";
/// Elapsed seconds of a fully successful insert.
pub const BIGQUERY_INSERT_DURATION: &str = "dfc_bigquery_insert_duration";
/// Wall-clock seconds of one whole invocation.
pub const TOTAL_DURATION: &str = "dfc_prj_total_duration";

#[async_trait]
pub trait DurationRecorder: Send + Sync {
    /// Records one scalar sample. Must not fail the caller.
    async fn record(&self, metric_name: &str, value: f64);
}

pub type DynDurationRecorder = Arc<dyn DurationRecorder>;

/// Reports samples to Cloud Monitoring, scoped to the owning project.
pub struct CloudMonitoringRecorder {
    client: MonitoringClient,
    project_id: String,
    service_name: String,
}

impl CloudMonitoringRecorder {
    pub fn new(
        client: MonitoringClient,
        project_id: impl Into<String>,
        service_name: impl Into<String>,
    ) -> Self {
        CloudMonitoringRecorder {
            client,
            project_id: project_id.into(),
            service_name: service_name.into(),
        }
    }
}

#[async_trait]
impl DurationRecorder for CloudMonitoringRecorder {
    async fn record(&self, metric_name: &str, value: f64) {
        let service_name = self.service_name.as_str();

        if metric_name.is_empty() {
            error!(service_name, event = "monitor", "Metric name is required");
            return;
        }
        if !value.is_finite() {
            error!(
                service_name,
                event = "monitor",
                metric_name,
                "Metric value must be a finite number"
            );
            return;
        }

        let series = TimeSeries::gauge(metric_name, &self.project_id, value, Utc::now());
        match self.client.create_time_series(&self.project_id, series).await {
            Ok(()) => {
                debug!(service_name, event = "monitor", metric_name, value, "metric reported");
            }
            Err(e) => {
                error!(
                    service_name,
                    event = "monitor",
                    metric_name,
                    category = e.category(),
                    error = %e,
                    "Failed to report metric"
                );
            }
        }
    }
}
