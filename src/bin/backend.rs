//! Backend entry point: a standalone HTTP/3 host for `agent-proxy`'s
//! tunnel handler, standing in for the reverse-proxy module the
//! original embeds into (§6 Backend config keys).

use std::net::SocketAddr;
use std::sync::Arc;

use agent_proxy::config::BackendConfig;
use agent_proxy::metrics::Metrics;
use clap::Parser;
use prometheus_client::registry::Registry;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Debug, clap::Parser)]
#[command(name = "tunnelgate-backend")]
struct BackendArgs {
    #[arg(long, default_value = "0.0.0.0:4433")]
    listen: SocketAddr,

    #[arg(long)]
    config: std::path::PathBuf,

    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = BackendArgs::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| "info".into()))
        .init();

    let raw = tokio::fs::read_to_string(&args.config).await?;
    let config: BackendConfig = serde_yaml::from_str(&raw)?;
    config.validate()?;

    let mut registry = Registry::default();
    let metrics = Arc::new(Metrics::new(&mut registry));

    let server = agent_proxy::backend::BackendServer::bind(args.listen, config, metrics)?;
    let cancel = CancellationToken::new();
    let serve_cancel = cancel.clone();
    let serve_task = tokio::spawn(async move { server.serve(serve_cancel).await });

    wait_for_shutdown_signal().await;
    info!("shutdown signal received");
    cancel.cancel();
    if let Err(e) = serve_task.await {
        error!(error = %e, "backend server task panicked");
    }
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
