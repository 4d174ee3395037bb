use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::Router;
use http::{Method, StatusCode, Uri};
use tracing::level_filters::LevelFilter;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::metrics::DynDurationRecorder;

pub mod auth;
pub mod bigquery;
pub mod clients;
pub mod config;
pub mod error;
pub mod metrics;
pub mod monitoring;
pub mod process;
pub mod resource_manager;

pub use clients::GcpClients;

/// Body returned to the scheduler on the normal path.
pub const SUCCESS_BODY: &str = "Project details loaded successfully";
/// Body returned with a 500 when the batch could not be stored.
pub const FAILURE_BODY: &str = "Error occurred while processing the request";

pub fn set_up_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();
}

/// Shared per-process state handed to the HTTP handler.
pub struct AppState {
    pub clients: GcpClients,
    pub recorder: DynDurationRecorder,
    pub config: Config,
}

/// One catch-all route: the scheduler trigger is method- and path-agnostic.
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new().fallback(trigger).with_state(state)
}

async fn trigger(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
) -> (StatusCode, &'static str) {
    handle_trigger(
        &state.clients,
        &state.recorder,
        &state.config,
        method.as_str(),
        uri.path(),
    )
    .await
}

/// One batch invocation: list the folder's projects, flatten them, append
/// them to the table, and report the total wall-clock duration whichever
/// branch ran.
pub async fn handle_trigger(
    clients: &GcpClients,
    recorder: &DynDurationRecorder,
    config: &Config,
    method: &str,
    path: &str,
) -> (StatusCode, &'static str) {
    let started = Instant::now();
    let service_name = config.service_name.as_str();
    info!(service_name, event = "trigger", method, path, "Batch triggered");

    let response = run_pipeline(clients, recorder, config).await;

    recorder
        .record(metrics::TOTAL_DURATION, started.elapsed().as_secs_f64())
        .await;
    response
}

async fn run_pipeline(
    clients: &GcpClients,
    recorder: &DynDurationRecorder,
    config: &Config,
) -> (StatusCode, &'static str) {
    let service_name = config.service_name.as_str();

    let projects = match process::list_projects(
        &clients.resource_manager,
        recorder,
        service_name,
        &config.folder_id,
    )
    .await
    {
        Ok(projects) => projects,
        Err(_) => {
            // Already logged with its category by the lister. The scheduler
            // still gets the success body: consumers of this endpoint treat
            // a degraded fetch like an empty folder.
            info!(service_name, event = "complete", "No projects to process");
            return (StatusCode::OK, SUCCESS_BODY);
        }
    };

    if projects.is_empty() {
        info!(service_name, event = "complete", "No projects to process");
        return (StatusCode::OK, SUCCESS_BODY);
    }

    let outcome = process::transform(recorder, service_name, projects).await;
    if outcome.dropped > 0 {
        warn!(
            service_name,
            event = "transform",
            dropped = outcome.dropped,
            "Dropped records that failed to transform"
        );
    }

    match process::store(
        &clients.bigquery,
        recorder,
        service_name,
        &config.bq_table,
        &config.project_id,
        &outcome.rows,
    )
    .await
    {
        Ok(()) => (StatusCode::OK, SUCCESS_BODY),
        Err(e) => {
            error!(service_name, event = "main", error = %e, "Storing the batch failed");
            (StatusCode::INTERNAL_SERVER_ERROR, FAILURE_BODY)
        }
    }
}
