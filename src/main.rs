use anyhow::{Context, Result};
use axum::Router;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use xpdb::app::{serve, XpdbApp};
use xpdb::cli::{log_filter, Cli};
use xpdb::config::{load_cluster_snapshot, load_settings_file, Settings};
use xpdb::store::InMemoryCluster;

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();

    // Load .env file if specified, then re-read flags so XPDB_* values from it apply
    if let Some(ref env_file) = cli.env_file {
        dotenvy::from_path(env_file)
            .with_context(|| format!("Failed to load env file {}", env_file.display()))?;
        cli = Cli::parse();
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(log_filter(cli.verbose))),
        )
        .init();

    let mut settings = match cli.config {
        Some(ref path) => load_settings_file(path)?,
        None => Settings::default(),
    };
    cli.overrides.apply(&mut settings)?;
    settings.validate()?;

    let cluster = match settings.cluster_state_file {
        Some(ref path) => InMemoryCluster::from_snapshot(load_cluster_snapshot(path)?),
        None => InMemoryCluster::new(),
    };

    let app = XpdbApp::new(&settings, cluster);
    let shutdown = CancellationToken::new();

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down");
            shutdown.cancel();
        });
    }

    let mut servers = Vec::new();

    if cli.command.runs_webhook() {
        let listener = TcpListener::bind(&settings.webhook_addr)
            .await
            .with_context(|| format!("Failed to bind webhook to {}", settings.webhook_addr))?;
        info!("Admission webhook listening on {}", settings.webhook_addr);
        info!("  POST /validate - AdmissionReview");
        info!("  GET  /metrics  - Prometheus counters");
        servers.push(spawn_server(listener, app.webhook_router(), shutdown.clone()));
    }

    if cli.command.runs_state() {
        let listener = TcpListener::bind(&settings.state_addr)
            .await
            .with_context(|| format!("Failed to bind state server to {}", settings.state_addr))?;
        info!("State server listening on {}", settings.state_addr);
        servers.push(spawn_server(listener, app.state_router(), shutdown.clone()));
    }

    for result in futures::future::join_all(servers).await {
        result.context("Server task failed")?.context("Server error")?;
    }

    Ok(())
}

/// Serve in the background; a failing server shuts the others down
fn spawn_server(
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> JoinHandle<std::io::Result<()>> {
    tokio::spawn(async move {
        let result = serve(listener, router, shutdown.clone()).await;
        if let Err(ref e) = result {
            error!("Server error: {}", e);
            shutdown.cancel();
        }
        result
    })
}
