use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use project_info_collector::auth::{self, AccessToken};
use project_info_collector::config::Config;
use project_info_collector::metrics::{CloudMonitoringRecorder, DynDurationRecorder};
use project_info_collector::{AppState, GcpClients};
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    project_info_collector::set_up_logging();

    info!(
        "Initializing {} version {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let config = Config::load_from_env();

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;

    let token = match auth::resolve_access_token(&http, auth::METADATA_TOKEN_URL).await {
        Ok(token) => token,
        Err(e) => {
            error!(
                service_name = %config.service_name,
                event = "config_error",
                category = e.category(),
                error = %e,
                "Could not obtain an access token; remote calls will be rejected"
            );
            AccessToken::empty()
        }
    };

    let clients = GcpClients::new(&http, &token);
    let recorder: DynDurationRecorder = Arc::new(CloudMonitoringRecorder::new(
        clients.monitoring.clone(),
        &config.project_id,
        &config.service_name,
    ));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let app = project_info_collector::build_app(Arc::new(AppState {
        clients,
        recorder,
        config,
    }));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}
