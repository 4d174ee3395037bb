use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use http::StatusCode;
use pretty_assertions_sorted::assert_eq;
use project_info_collector::auth::{self, AccessToken};
use project_info_collector::bigquery::BigQueryClient;
use project_info_collector::config::Config;
use project_info_collector::metrics::{
    self, CloudMonitoringRecorder, DurationRecorder, DynDurationRecorder,
};
use project_info_collector::monitoring::MonitoringClient;
use project_info_collector::process;
use project_info_collector::resource_manager::ResourceManagerClient;
use project_info_collector::{handle_trigger, GcpClients, FAILURE_BODY, SUCCESS_BODY};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BQ_INSERT_PATH: &str = "/projects/dev2-ea8f/datasets/observability/tables/project_info/insertAll";

/// Observability-port fake: remembers every sample instead of publishing it.
#[derive(Default, Clone)]
struct RecordedMetrics {
    samples: Arc<Mutex<Vec<(String, f64)>>>,
}

impl RecordedMetrics {
    fn names(&self) -> Vec<String> {
        self.samples
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[async_trait]
impl DurationRecorder for RecordedMetrics {
    async fn record(&self, metric_name: &str, value: f64) {
        self.samples
            .lock()
            .unwrap()
            .push((metric_name.to_string(), value));
    }
}

fn recorder() -> (RecordedMetrics, DynDurationRecorder) {
    let recorded = RecordedMetrics::default();
    let dyn_recorder: DynDurationRecorder = Arc::new(recorded.clone());
    (recorded, dyn_recorder)
}

fn test_config() -> Config {
    Config {
        service_name: "project_info".to_string(),
        bq_table: "observability.project_info".to_string(),
        folder_id: "1062810406170".to_string(),
        project_id: "dev2-ea8f".to_string(),
        port: 0,
    }
}

/// All three service clients pointed at the same mock server; the REST
/// paths do not collide.
fn clients_for(server: &MockServer) -> GcpClients {
    let http = reqwest::Client::new();
    let token = AccessToken::from("test-token".to_string());
    GcpClients {
        resource_manager: ResourceManagerClient::new(&http, &token, server.uri()),
        bigquery: BigQueryClient::new(&http, &token, server.uri()),
        monitoring: MonitoringClient::new(&http, &token, server.uri()),
    }
}

fn project_json(id: &str) -> serde_json::Value {
    json!({
        "projectId": id,
        "name": format!("projects/{}", id),
        "parent": "folders/1062810406170",
        "displayName": id,
        "state": "ACTIVE",
        "createTime": "2025-03-18T12:00:00Z",
        "updateTime": "2025-03-18T12:05:00Z",
        "etag": "etag",
        "labels": {"env": "test"}
    })
}

async fn insert_all_body(server: &MockServer) -> serde_json::Value {
    let requests = server
        .received_requests()
        .await
        .expect("request recording is enabled");
    let insert = requests
        .iter()
        .find(|request| request.url.path().ends_with("/insertAll"))
        .expect("an insertAll request was made");
    serde_json::from_slice(&insert.body).expect("insertAll body is json")
}

#[tokio::test]
async fn test_two_projects_flow_through_to_bigquery() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v3/projects"))
        .and(query_param("parent", "folders/1062810406170"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "projects": [project_json("alpha"), project_json("beta")]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(BQ_INSERT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "kind": "bigquery#tableDataInsertAllResponse"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (recorded, recorder) = recorder();
    let clients = clients_for(&server);
    let (status, body) = handle_trigger(&clients, &recorder, &test_config(), "POST", "/").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, SUCCESS_BODY);
    assert_eq!(
        recorded.names(),
        vec![
            metrics::PROJECT_API_DURATION.to_string(),
            metrics::PROCESSING_DURATION.to_string(),
            metrics::BIGQUERY_INSERT_DURATION.to_string(),
            metrics::TOTAL_DURATION.to_string(),
        ]
    );

    let payload = insert_all_body(&server).await;
    let rows = payload["rows"].as_array().expect("rows array");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["json"]["project_id"], "alpha");
    assert_eq!(rows[1]["json"]["project_id"], "beta");
    assert_eq!(rows[0]["json"]["project_number"], "projects/alpha");
    assert_eq!(
        rows[0]["json"]["ingestion_time"],
        rows[1]["json"]["ingestion_time"]
    );
}

#[tokio::test]
async fn test_empty_folder_skips_transform_and_store() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v3/projects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "projects": [] })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(BQ_INSERT_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (recorded, recorder) = recorder();
    let clients = clients_for(&server);
    let (status, body) = handle_trigger(&clients, &recorder, &test_config(), "GET", "/run").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, SUCCESS_BODY);
    assert_eq!(
        recorded.names(),
        vec![
            metrics::PROJECT_API_DURATION.to_string(),
            metrics::TOTAL_DURATION.to_string(),
        ]
    );
}

#[tokio::test]
async fn test_record_without_project_id_is_dropped() {
    let server = MockServer::start().await;
    let mut nameless = project_json("ignored");
    let _ = nameless
        .as_object_mut()
        .expect("project object")
        .remove("projectId");

    Mock::given(method("GET"))
        .and(path("/v3/projects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "projects": [project_json("alpha"), nameless, project_json("gamma")]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(BQ_INSERT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let (_, recorder) = recorder();
    let clients = clients_for(&server);
    let (status, body) = handle_trigger(&clients, &recorder, &test_config(), "POST", "/").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, SUCCESS_BODY);

    let payload = insert_all_body(&server).await;
    let rows = payload["rows"].as_array().expect("rows array");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["json"]["project_id"], "alpha");
    assert_eq!(rows[1]["json"]["project_id"], "gamma");
}

#[tokio::test]
async fn test_per_row_insert_errors_fail_the_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v3/projects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "projects": [project_json("alpha")]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(BQ_INSERT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "insertErrors": [
                {"index": 0, "errors": [{"reason": "invalid", "message": "no such field"}]}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (recorded, recorder) = recorder();
    let clients = clients_for(&server);
    let (status, body) = handle_trigger(&clients, &recorder, &test_config(), "POST", "/").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, FAILURE_BODY);
    // No insert-duration sample on a rejected batch.
    assert_eq!(
        recorded.names(),
        vec![
            metrics::PROJECT_API_DURATION.to_string(),
            metrics::PROCESSING_DURATION.to_string(),
            metrics::TOTAL_DURATION.to_string(),
        ]
    );
}

#[tokio::test]
async fn test_listing_failure_degrades_to_success_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v3/projects"))
        .respond_with(ResponseTemplate::new(403).set_body_string("caller lacks permission"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(BQ_INSERT_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (recorded, recorder) = recorder();
    let clients = clients_for(&server);
    let (status, body) = handle_trigger(&clients, &recorder, &test_config(), "POST", "/").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, SUCCESS_BODY);
    // No listing-duration sample on a failed fetch, only the total.
    assert_eq!(recorded.names(), vec![metrics::TOTAL_DURATION.to_string()]);
}

#[tokio::test]
async fn test_listing_exhausts_pagination() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v3/projects"))
        .and(query_param_is_missing("pageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "projects": [project_json("alpha")],
            "nextPageToken": "page-2"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v3/projects"))
        .and(query_param("pageToken", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "projects": [project_json("beta")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (recorded, recorder) = recorder();
    let clients = clients_for(&server);
    let projects = process::list_projects(
        &clients.resource_manager,
        &recorder,
        "project_info",
        "1062810406170",
    )
    .await
    .expect("listing succeeds");

    assert_eq!(projects.len(), 2);
    assert_eq!(projects[0].project_id.as_deref(), Some("alpha"));
    assert_eq!(projects[1].project_id.as_deref(), Some("beta"));
    // One sample for the whole listing, not one per page.
    assert_eq!(recorded.names(), vec![metrics::PROJECT_API_DURATION.to_string()]);
}

#[tokio::test]
async fn test_monitor_publishes_gauge_sample() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v3/projects/dev2-ea8f/timeSeries"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let http = reqwest::Client::new();
    let token = AccessToken::from("test-token".to_string());
    let reporter = CloudMonitoringRecorder::new(
        MonitoringClient::new(&http, &token, server.uri()),
        "dev2-ea8f",
        "project_info",
    );

    reporter.record(metrics::TOTAL_DURATION, 1.25).await;

    let requests = server
        .received_requests()
        .await
        .expect("request recording is enabled");
    let payload: serde_json::Value =
        serde_json::from_slice(&requests[0].body).expect("timeSeries body is json");
    let series = &payload["timeSeries"][0];
    assert_eq!(
        series["metric"]["type"],
        "custom.googleapis.com/dfc_prj_total_duration"
    );
    let point = &series["points"][0];
    assert_eq!(point["interval"]["startTime"], point["interval"]["endTime"]);
    assert_eq!(point["value"]["doubleValue"], 1.25);
}

#[tokio::test]
async fn test_monitor_swallows_backend_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v3/projects/dev2-ea8f/timeSeries"))
        .respond_with(ResponseTemplate::new(503).set_body_string("try later"))
        .expect(1)
        .mount(&server)
        .await;

    let http = reqwest::Client::new();
    let token = AccessToken::from("test-token".to_string());
    let reporter = CloudMonitoringRecorder::new(
        MonitoringClient::new(&http, &token, server.uri()),
        "dev2-ea8f",
        "project_info",
    );

    // Must return normally; reporting is best-effort.
    reporter.record(metrics::TOTAL_DURATION, 0.5).await;
}

#[tokio::test]
async fn test_monitor_rejects_empty_metric_name_without_a_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v3/projects/dev2-ea8f/timeSeries"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let http = reqwest::Client::new();
    let token = AccessToken::from("test-token".to_string());
    let reporter = CloudMonitoringRecorder::new(
        MonitoringClient::new(&http, &token, server.uri()),
        "dev2-ea8f",
        "project_info",
    );

    reporter.record("", 0.5).await;
    reporter.record(metrics::TOTAL_DURATION, f64::NAN).await;
}

#[tokio::test]
async fn test_access_token_from_environment() {
    temp_env::async_with_vars([("GOOGLE_ACCESS_TOKEN", Some("env-token"))], async {
        let http = reqwest::Client::new();
        let token = auth::resolve_access_token(&http, "http://127.0.0.1:1/token")
            .await
            .expect("token resolves from env without a metadata call");
        assert_eq!(token.token(), "env-token");
    })
    .await;
}

#[tokio::test]
async fn test_access_token_from_metadata_server() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/computeMetadata/v1/instance/service-accounts/default/token"))
        .and(header("Metadata-Flavor", "Google"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "metadata-token",
            "expires_in": 3599,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let url = format!(
        "{}/computeMetadata/v1/instance/service-accounts/default/token",
        server.uri()
    );
    temp_env::async_with_vars([("GOOGLE_ACCESS_TOKEN", None::<&str>)], async move {
        let http = reqwest::Client::new();
        let token = auth::resolve_access_token(&http, &url)
            .await
            .expect("token resolves from the metadata server");
        assert_eq!(token.token(), "metadata-token");
    })
    .await;
}
