use std::env;
use std::string::String;

use tracing::error;

pub const DEFAULT_SERVICE_NAME: &str = "project_info";
pub const DEFAULT_BQ_TABLE: &str = "observability.project_info";
pub const DEFAULT_FOLDER_ID: &str = "1062810406170";
pub const DEFAULT_PROJECT_ID: &str = "dev2-ea8f";
const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Clone)]
pub struct Config {
    pub service_name: String,
    /// Target table, `dataset.table` or `project.dataset.table`.
    pub bq_table: String,
    /// Folder whose projects get enumerated.
    pub folder_id: String,
    /// Owning project for metrics and the default BigQuery project.
    pub project_id: String,
    pub port: u16,
}

impl Config {
    /// Loads the service configuration from the environment. A variable that
    /// is set but empty is a configuration error worth logging, not a fatal
    /// one: the default takes its place and startup proceeds.
    pub fn load_from_env() -> Config {
        let service_name = env_or("SERVICE_NAME", DEFAULT_SERVICE_NAME, DEFAULT_SERVICE_NAME);

        let conf = Config {
            bq_table: env_or("BQ_TABLE", DEFAULT_BQ_TABLE, &service_name),
            folder_id: env_or("FOLDER_ID", DEFAULT_FOLDER_ID, &service_name),
            project_id: env_or("GCP_PROJECT", DEFAULT_PROJECT_ID, &service_name),
            port: load_port(&service_name),
            service_name,
        };

        conf
    }
}

fn env_or(name: &str, default: &str, service_name: &str) -> String {
    match env::var(name) {
        Ok(value) if value.trim().is_empty() => {
            error!(
                service_name,
                event = "config_error",
                variable = name,
                "Missing environment variables"
            );
            default.to_string()
        }
        Ok(value) => value,
        Err(_) => default.to_string(),
    }
}

fn load_port(service_name: &str) -> u16 {
    match env::var("PORT") {
        Ok(value) => value.parse().unwrap_or_else(|_| {
            error!(
                service_name,
                event = "config_error",
                variable = "PORT",
                value,
                "PORT is not a valid port number"
            );
            DEFAULT_PORT
        }),
        Err(_) => DEFAULT_PORT,
    }
}
