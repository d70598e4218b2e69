//! MCP resource server binary.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use mcp_resource_server::{BoxError, Config, build_app};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    if let Err(e) = init_logging(&config.log_level) {
        eprintln!("Invalid log level: {e}");
        return ExitCode::FAILURE;
    }

    let app = match build_app(&config) {
        Ok(app) => app,
        Err(e) => {
            tracing::error!(error = %e, "Configuration error");
            return ExitCode::FAILURE;
        }
    };

    match serve(&config, app).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Server failed");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: &str) -> Result<(), BoxError> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init()?;
    Ok(())
}

async fn serve(config: &Config, app: axum::Router) -> Result<(), BoxError> {
    tracing::info!("Starting MCP Server on {}:{}", config.host, config.port);
    tracing::info!("Authorization Server: {}", config.auth_base_url());
    tracing::info!("Transport: {}", config.transport);

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutting down"),
        Err(e) => tracing::warn!(error = %e, "Failed to listen for Ctrl-C"),
    }
}
