//! Frontend entry point: accepts local TCP/UDP, tunnels each connection
//! or flow to the backend over HTTP/3 (§6 Frontend CLI).

use std::sync::Arc;

use agent_proxy::config::{FrontendArgs, Options};
use agent_proxy::metrics::Metrics;
use agent_transport::{ClientPool, Connector, TransportConfig};
use clap::Parser;
use prometheus_client::registry::Registry;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = FrontendArgs::parse();

    if args.version {
        println!(env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| "info".into()))
        .init();

    let opts = Options::from_args(&args)?;
    info!(listen = %opts.listen_addr, server = %opts.server_uri, "starting frontend");

    let authority = opts
        .server_uri
        .authority()
        .ok_or_else(|| anyhow::anyhow!("server URI is missing an authority"))?
        .to_string();
    let server_name = opts
        .server_uri
        .host()
        .ok_or_else(|| anyhow::anyhow!("server URI is missing a host"))?
        .to_string();

    let mut transport_cfg = TransportConfig::new(authority, server_name);
    transport_cfg.skip_tls_verify = opts.skip_tls_verify;
    transport_cfg.handshake_timeout = opts.connect_timeout;

    let pool = Arc::new(ClientPool::new(transport_cfg));
    let connector = Arc::new(Connector::new(pool, opts.server_uri.clone()));

    let mut registry = Registry::default();
    let metrics = Arc::new(Metrics::new(&mut registry));
    let registry = Arc::new(registry);

    let cancel = CancellationToken::new();
    let tcp = agent_proxy::frontend::TcpFrontend::bind(opts.clone(), connector.clone(), metrics.clone()).await?;
    let udp = agent_proxy::frontend::UdpFrontend::bind(opts.clone(), connector.clone(), metrics.clone()).await?;
    let metrics_listener = tokio::net::TcpListener::bind(&opts.metrics_addr).await?;
    info!(addr = %opts.metrics_addr, "metrics endpoint listening");

    let tcp_cancel = cancel.clone();
    let udp_cancel = cancel.clone();
    let metrics_cancel = cancel.clone();
    let tcp_task = tokio::spawn(async move { tcp.serve(tcp_cancel).await });
    let udp_task = tokio::spawn(async move { udp.serve(udp_cancel).await });
    let metrics_app = agent_proxy::MetricsApp::new(registry);
    let metrics_task = tokio::spawn(async move {
        axum::serve(metrics_listener, metrics_app.router())
            .with_graceful_shutdown(async move { metrics_cancel.cancelled().await })
            .await
    });

    wait_for_shutdown_signal().await;
    info!("shutdown signal received");
    cancel.cancel();
    connector.close().await;

    if let Err(e) = tcp_task.await {
        error!(error = %e, "tcp frontend task panicked");
    }
    if let Err(e) = udp_task.await {
        error!(error = %e, "udp frontend task panicked");
    }
    match metrics_task.await {
        Ok(Err(e)) => error!(error = %e, "metrics endpoint failed"),
        Err(e) => error!(error = %e, "metrics endpoint task panicked"),
        Ok(Ok(())) => {}
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
