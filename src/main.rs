//! windows-input-mcp - paced Windows mouse and keyboard input over MCP
//!
//! Serves the input tools on stdio by default, or over streamable HTTP at
//! `http://<host>:<port>/mcp`. Logs go to stderr.

use clap::Parser;
use rmcp::ServiceExt;
use rmcp::transport::io::stdio;
use rmcp::transport::streamable_http_server::{
    StreamableHttpService, session::local::LocalSessionManager,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use windows_input_mcp::backend::create_backend;
use windows_input_mcp::config::{Cli, Settings, Transport};
use windows_input_mcp::server::InputServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::from_env()?;

    // stderr only: stdout carries the MCP protocol
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(&settings.log_level))
                .unwrap_or_else(|_| "info".to_string().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!(
        backend = ?settings.backend,
        driver = settings.driver.as_str(),
        transport = ?cli.transport,
        "Starting windows-input-mcp"
    );

    let backend = create_backend(&settings)?;
    let info = backend.info();
    tracing::info!(name = %info.name, ready = info.ready, "{}", info.details);

    let server = InputServer::new(backend, settings.rate)?;

    match cli.transport {
        Transport::Stdio => {
            let service = server.serve(stdio()).await?;
            tracing::info!("windows-input-mcp ready, listening on stdio");
            service.waiting().await?;
        }
        Transport::Sse | Transport::StreamableHttp => {
            // Every session shares one dispatcher, so pacing stays global.
            let service = StreamableHttpService::new(
                move || Ok(server.clone()),
                LocalSessionManager::default().into(),
                Default::default(),
            );
            let router = axum::Router::new().nest_service("/mcp", service);
            let listener = tokio::net::TcpListener::bind((cli.host.as_str(), cli.port)).await?;
            tracing::info!(
                "windows-input-mcp ready, listening on http://{}/mcp",
                listener.local_addr()?
            );
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await?;
        }
    }

    tracing::info!("windows-input-mcp shutting down");
    Ok(())
}
