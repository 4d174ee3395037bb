use crate::auth::AccessToken;
use crate::bigquery::BigQueryClient;
use crate::monitoring::MonitoringClient;
use crate::resource_manager::ResourceManagerClient;
use crate::{bigquery, monitoring, resource_manager};

/// A type used to hold the Google service clients required by one
/// invocation, constructed once at startup and handed into the handler.
#[derive(Clone)]
pub struct GcpClients {
    pub resource_manager: ResourceManagerClient,
    pub bigquery: BigQueryClient,
    pub monitoring: MonitoringClient,
}

impl GcpClients {
    pub fn new(http: &reqwest::Client, token: &AccessToken) -> Self {
        GcpClients {
            resource_manager: ResourceManagerClient::new(
                http,
                token,
                resource_manager::DEFAULT_ENDPOINT,
            ),
            bigquery: BigQueryClient::new(http, token, bigquery::DEFAULT_ENDPOINT),
            monitoring: MonitoringClient::new(http, token, monitoring::DEFAULT_ENDPOINT),
        }
    }
}
