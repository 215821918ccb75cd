use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use invoice_server::api::{self, AppState};
use invoice_server::config::{self, LogFormat, StorageKind};
use invoice_server::{db, telemetry};

/// Invoicing HTTP server
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Address to bind (overrides HOST)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides PORT)
    #[arg(long, short)]
    port: Option<u16>,

    /// Storage backend (overrides STORAGE)
    #[arg(long, value_enum)]
    storage: Option<StorageKind>,

    /// Postgres connection URL (overrides DATABASE_URL)
    #[arg(long)]
    database_url: Option<String>,

    /// Log output format (overrides LOG_FORMAT)
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = config::init(|config| {
        if let Some(host) = cli.host {
            config.host = host;
        }
        if let Some(port) = cli.port {
            config.port = port;
        }
        if let Some(storage) = cli.storage {
            config.storage = storage;
        }
        if cli.database_url.is_some() {
            config.database_url = cli.database_url;
        }
        if let Some(format) = cli.log_format {
            config.log_format = format;
        }
    })?;
    telemetry::init(&config);

    // Initialize storage
    let storage = db::init(&config).await?;
    let app = api::router(AppState::new(storage));

    let addr = config.listen_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, storage = ?config.storage, "invoice server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}
