use std::sync::Arc;
use std::time::Duration;

use api::logging::init_tracing;
use config::RouterConfig;
use gateway::Orchestrator;

#[tokio::main]
async fn main() {
    let config = RouterConfig::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {e}");
        eprintln!("Application cannot start without a valid configuration.");
        std::process::exit(1);
    });

    init_tracing(&config.logging);
    tracing::debug!(server = ?config.server, "starting with server configuration");

    let registry = config.expand().unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to resolve provider credentials");
        std::process::exit(1);
    });

    let request_timeout = Duration::from_secs(config.server.request_timeout_secs);
    let orchestrator = Arc::new(Orchestrator::new(registry, request_timeout));

    let bind_address = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .unwrap_or_else(|e| {
            tracing::error!(address = %bind_address, error = %e, "failed to bind listener");
            std::process::exit(1);
        });

    let app = api::build_router(orchestrator);

    tracing::info!(address = %bind_address, "router started successfully");

    axum::serve(listener, app)
        .await
        .unwrap_or_else(|e| tracing::error!(error = %e, "server terminated"));
}
