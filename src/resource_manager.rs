use std::collections::HashMap;

use serde::Deserialize;
use tracing::debug;

use crate::auth::AccessToken;
use crate::error::ApiError;

pub const DEFAULT_ENDPOINT: &str = "https://cloudresourcemanager.googleapis.com";

/// One project record as returned by the Resource Manager v3 REST API.
///
/// Every field is optional on the wire; which of them the pipeline actually
/// requires is the transformer's call, not the client's.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Project {
    pub project_id: Option<String>,
    /// `projects/{number}`, doubling as the project-number reference.
    pub name: Option<String>,
    /// `folders/{id}` of the containing folder.
    pub parent: Option<String>,
    pub display_name: Option<String>,
    pub state: Option<String>,
    pub create_time: Option<String>,
    pub update_time: Option<String>,
    pub etag: Option<String>,
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ListProjectsResponse {
    projects: Vec<Project>,
    next_page_token: Option<String>,
}

/// Thin wrapper around the `projects.list` call of the Resource Manager v3
/// REST API.
#[derive(Clone)]
pub struct ResourceManagerClient {
    http: reqwest::Client,
    token: AccessToken,
    endpoint: String,
}

impl ResourceManagerClient {
    pub fn new(http: &reqwest::Client, token: &AccessToken, endpoint: impl Into<String>) -> Self {
        ResourceManagerClient {
            http: http.clone(),
            token: token.clone(),
            endpoint: endpoint.into(),
        }
    }

    /// Lists every project under `folders/{folder_id}`, following
    /// `nextPageToken` until the listing is exhausted.
    pub async fn list_projects(&self, folder_id: &str) -> Result<Vec<Project>, ApiError> {
        let url = format!("{}/v3/projects", self.endpoint);
        let parent = format!("folders/{}", folder_id);

        let mut projects = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(&url)
                .bearer_auth(self.token.token())
                .query(&[("parent", parent.as_str())]);
            if let Some(ref token) = page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = request.send().await.map_err(ApiError::from)?;
            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(ApiError::from_status(status, body));
            }

            let page: ListProjectsResponse = response
                .json()
                .await
                .map_err(|e| ApiError::Decode(e.to_string()))?;
            debug!(page_size = page.projects.len(), "fetched project listing page");
            projects.extend(page.projects);

            match page.next_page_token.filter(|token| !token.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(projects)
    }
}
