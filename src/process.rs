//! The fetch → transform → store pipeline.
//!
//! Each step guards its own failures: listing hands back a categorized
//! error, the transformer drops bad records one at a time, and the store
//! reduces every backend problem to a typed [`StoreError`]. Nothing here
//! panics on remote-service behavior.

use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::bigquery::{BigQueryClient, RowInsertErrors, TableReference};
use crate::error::ApiError;
use crate::metrics::{self, DynDurationRecorder};
use crate::resource_manager::{Project, ResourceManagerClient};

/// One flattened analytical-table record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub project_id: String,
    pub project_number: Option<String>,
    pub folder_id: Option<String>,
    pub project_name: Option<String>,
    pub state: Option<String>,
    pub create_time: Option<String>,
    pub update_time: Option<String>,
    /// Shared by every row of one batch; groups a run downstream.
    pub ingestion_time: String,
    pub etag: Option<String>,
    pub labels: Vec<Label>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Label {
    pub key: String,
    pub value: String,
}

#[derive(Error, Debug)]
enum RowError {
    #[error("record has no project_id")]
    MissingProjectId,
}

impl Row {
    /// Flattens one project record. `project_id` is the only required
    /// field; absent optional fields pass through as null, and the label
    /// map becomes a key/value sequence in map-iteration order.
    fn from_project(project: Project, ingestion_time: &str) -> Result<Row, RowError> {
        let project_id = project
            .project_id
            .filter(|id| !id.is_empty())
            .ok_or(RowError::MissingProjectId)?;

        let labels = project
            .labels
            .into_iter()
            .map(|(key, value)| Label { key, value })
            .collect();

        Ok(Row {
            project_id,
            project_number: project.name,
            folder_id: project.parent,
            project_name: project.display_name,
            state: project.state,
            create_time: project.create_time,
            update_time: project.update_time,
            ingestion_time: ingestion_time.to_string(),
            etag: project.etag,
            labels,
        })
    }
}

/// Rows produced by one batch plus the count of records dropped on the way.
#[derive(Debug, Default)]
pub struct TransformOutcome {
    pub rows: Vec<Row>,
    pub dropped: usize,
}

/// Fetches every project under the folder. The duration metric is reported
/// only when the listing succeeds. A failed call is logged with its category
/// and handed back as the typed error, so the caller can tell it apart from
/// an empty folder.
pub async fn list_projects(
    client: &ResourceManagerClient,
    recorder: &DynDurationRecorder,
    service_name: &str,
    folder_id: &str,
) -> Result<Vec<Project>, ApiError> {
    let started = Instant::now();
    match client.list_projects(folder_id).await {
        Ok(projects) => {
            recorder
                .record(metrics::PROJECT_API_DURATION, started.elapsed().as_secs_f64())
                .await;
            if projects.is_empty() {
                warn!(
                    service_name,
                    event = "load",
                    folder_id,
                    "No projects found under folder"
                );
            }
            Ok(projects)
        }
        Err(e) => {
            error!(
                service_name,
                event = "load",
                folder_id,
                category = e.category(),
                error = %e,
                "Failed to list projects"
            );
            Err(e)
        }
    }
}

/// Flattens the batch. One ingestion timestamp is captured up front and
/// shared by every row. A record that fails to flatten is logged and
/// dropped; the rest of the batch continues. The processing-duration metric
/// covers the whole batch regardless of drops.
pub async fn transform(
    recorder: &DynDurationRecorder,
    service_name: &str,
    projects: Vec<Project>,
) -> TransformOutcome {
    let started = Instant::now();
    let ingestion_time = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

    let outcome = projects
        .into_iter()
        .fold(TransformOutcome::default(), |mut acc, project| {
            match Row::from_project(project, &ingestion_time) {
                Ok(row) => acc.rows.push(row),
                Err(e) => {
                    acc.dropped += 1;
                    error!(
                        service_name,
                        event = "transform",
                        error = %e,
                        "Error transforming project data"
                    );
                }
            }
            acc
        });

    recorder
        .record(metrics::PROCESSING_DURATION, started.elapsed().as_secs_f64())
        .await;
    outcome
}

/// Why a store attempt produced no durable batch.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("no rows to insert")]
    NoRows,
    #[error(transparent)]
    InvalidTable(#[from] crate::bigquery::InvalidTableSpec),
    #[error("table rejected {} row(s)", .0.len())]
    RowErrors(Vec<RowInsertErrors>),
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Appends the batch in one insertAll call. Success means the table accepted
/// every row; the insert-duration metric is reported only then. An empty
/// batch is a no-op failure, reported without touching the backend.
pub async fn store(
    client: &BigQueryClient,
    recorder: &DynDurationRecorder,
    service_name: &str,
    table_spec: &str,
    default_project: &str,
    rows: &[Row],
) -> Result<(), StoreError> {
    if rows.is_empty() {
        warn!(service_name, event = "store", "No data to insert into BigQuery");
        return Err(StoreError::NoRows);
    }

    let table = TableReference::parse(table_spec, default_project).map_err(|e| {
        error!(service_name, event = "store", error = %e, "Invalid table spec");
        StoreError::from(e)
    })?;

    let started = Instant::now();
    match client.insert_all(&table, rows).await {
        Ok(errors) if errors.is_empty() => {
            recorder
                .record(metrics::BIGQUERY_INSERT_DURATION, started.elapsed().as_secs_f64())
                .await;
            info!(service_name, event = "store", rows = rows.len(), "Inserted project rows");
            Ok(())
        }
        Ok(errors) => {
            error!(
                service_name,
                event = "store",
                errors = ?errors,
                "Failed to insert data into project_info"
            );
            Err(StoreError::RowErrors(errors))
        }
        Err(e) => {
            error!(
                service_name,
                event = "store",
                category = e.category(),
                error = %e,
                "Unable to insert to project_info"
            );
            Err(StoreError::Api(e))
        }
    }
}
