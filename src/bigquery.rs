use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::AccessToken;
use crate::error::ApiError;
use crate::process::Row;

pub const DEFAULT_ENDPOINT: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// Fully qualified insert target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableReference {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

#[derive(Error, Debug)]
#[error("invalid table spec {spec:?}: expected dataset.table or project.dataset.table")]
pub struct InvalidTableSpec {
    spec: String,
}

impl TableReference {
    /// Resolves a `dataset.table` spec against the default project; a
    /// three-part spec carries its own project.
    pub fn parse(spec: &str, default_project: &str) -> Result<TableReference, InvalidTableSpec> {
        let invalid = || InvalidTableSpec {
            spec: spec.to_string(),
        };

        let parts: Vec<&str> = spec.split('.').collect();
        if parts.iter().any(|part| part.is_empty()) {
            return Err(invalid());
        }

        match parts.as_slice() {
            [dataset, table] => Ok(TableReference {
                project: default_project.to_string(),
                dataset: dataset.to_string(),
                table: table.to_string(),
            }),
            [project, dataset, table] => Ok(TableReference {
                project: project.to_string(),
                dataset: dataset.to_string(),
                table: table.to_string(),
            }),
            _ => Err(invalid()),
        }
    }
}

#[derive(Serialize)]
struct InsertAllRequest<'a> {
    rows: Vec<InsertRequestRow<'a>>,
}

#[derive(Serialize)]
struct InsertRequestRow<'a> {
    json: &'a Row,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct InsertAllResponse {
    insert_errors: Vec<RowInsertErrors>,
}

/// Per-row failure reported by the insertAll response. An empty list on the
/// response means the table accepted the whole batch.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RowInsertErrors {
    pub index: u32,
    pub errors: Vec<ErrorProto>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ErrorProto {
    pub reason: Option<String>,
    pub location: Option<String>,
    pub message: Option<String>,
}

/// Thin wrapper around the `tabledata.insertAll` call of the BigQuery v2
/// REST API.
#[derive(Clone)]
pub struct BigQueryClient {
    http: reqwest::Client,
    token: AccessToken,
    endpoint: String,
}

impl BigQueryClient {
    pub fn new(http: &reqwest::Client, token: &AccessToken, endpoint: impl Into<String>) -> Self {
        BigQueryClient {
            http: http.clone(),
            token: token.clone(),
            endpoint: endpoint.into(),
        }
    }

    /// Appends the rows in one batch call and returns the backend's per-row
    /// error list, empty on full success.
    pub async fn insert_all(
        &self,
        table: &TableReference,
        rows: &[Row],
    ) -> Result<Vec<RowInsertErrors>, ApiError> {
        let url = format!(
            "{}/projects/{}/datasets/{}/tables/{}/insertAll",
            self.endpoint, table.project, table.dataset, table.table
        );
        let body = InsertAllRequest {
            rows: rows.iter().map(|row| InsertRequestRow { json: row }).collect(),
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

        let parsed: InsertAllResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(parsed.insert_errors)
    }
}
