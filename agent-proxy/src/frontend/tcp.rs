//! Downstream TCP listener, one tunnel per accepted connection (C6).

use std::net::SocketAddr;
use std::sync::Arc;

use agent_core::compression::CompressedDuplex;
use agent_core::copy;
use agent_transport::Connector;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Options;
use crate::frontend::timed::TimedConn;
use crate::metrics::{Metrics, ProtoLabel, Protocol};

pub struct TcpFrontend {
    listener: TcpListener,
    connector: Arc<Connector>,
    opts: Options,
    metrics: Arc<Metrics>,
}

impl TcpFrontend {
    pub async fn bind(opts: Options, connector: Arc<Connector>, metrics: Arc<Metrics>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(&opts.listen_addr).await?;
        info!(addr = %opts.listen_addr, "tcp frontend listening");
        Ok(TcpFrontend {
            listener,
            connector,
            opts,
            metrics,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn serve(&self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("tcp frontend stopping");
                    return;
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let connector = self.connector.clone();
                            let opts = self.opts.clone();
                            let metrics = self.metrics.clone();
                            tokio::spawn(async move {
                                handle(stream, peer, connector, opts, metrics).await;
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "tcp accept failed");
                            return;
                        }
                    }
                }
            }
        }
    }
}

async fn handle(downstream: TcpStream, peer: SocketAddr, connector: Arc<Connector>, opts: Options, metrics: Arc<Metrics>) {
    metrics
        .downstream_connections_total
        .get_or_create(&ProtoLabel { protocol: Protocol::Tcp })
        .inc();

    let tunnel = match connector.connect("tcp", opts.compression.as_deref()).await {
        Ok(t) => t,
        Err(e) => {
            warn!(%peer, error = %e, "tcp connect to upstream failed");
            return;
        }
    };
    metrics
        .tunnels_created_total
        .get_or_create(&ProtoLabel { protocol: Protocol::Tcp })
        .inc();

    let mut downstream = TimedConn::new(downstream, opts.read_timeout, opts.write_timeout);

    if opts.compression.as_deref().is_some_and(|c| c.eq_ignore_ascii_case("snappy")) {
        run_compressed(&mut downstream, tunnel, peer, &opts).await;
    } else {
        run_plain(&mut downstream, tunnel, peer, &opts).await;
    }

    metrics
        .tunnels_closed_total
        .get_or_create(&ProtoLabel { protocol: Protocol::Tcp })
        .inc();
}

async fn run_plain(downstream: &mut (impl tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send), mut upstream: impl tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send, peer: SocketAddr, opts: &Options) {
    let (mut up_r, mut up_w) = tokio::io::split(&mut upstream);
    let (mut down_r, mut down_w) = tokio::io::split(downstream);

    let up_to_down = copy::copy(&mut down_w, &mut up_r, false);
    let down_to_up = copy::copy(&mut up_w, &mut down_r, false);
    let (r1, r2) = tokio::join!(up_to_down, down_to_up);
    debug!(%peer, upstream = ?opts.server_uri, up_to_down = ?r1, down_to_up = ?r2, "tcp stream ended");
}

async fn run_compressed<D, U>(downstream: &mut D, upstream: U, peer: SocketAddr, opts: &Options)
where
    D: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send,
    U: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let upstream = CompressedDuplex::new(upstream);
    let (mut down_r, mut down_w) = tokio::io::split(downstream);

    let up_to_down = async {
        let mut buf = vec![0u8; agent_core::buffer_pool::COPY_BUFFER_SIZE];
        loop {
            match upstream.read(&mut buf).await {
                Ok(0) => return Ok::<(), std::io::Error>(()),
                Ok(n) => tokio::io::AsyncWriteExt::write_all(&mut down_w, &buf[..n]).await?,
                Err(_) => return Ok(()),
            }
        }
    };
    let down_to_up = async {
        let mut buf = vec![0u8; agent_core::buffer_pool::COPY_BUFFER_SIZE];
        loop {
            match tokio::io::AsyncReadExt::read(&mut down_r, &mut buf).await {
                Ok(0) => return Ok::<(), std::io::Error>(()),
                Ok(n) => {
                    if upstream.write(&buf[..n]).await.is_err() {
                        return Ok(());
                    }
                }
                Err(e) => return Err(e),
            }
        }
    };
    let (r1, r2) = tokio::join!(up_to_down, down_to_up);
    let _ = upstream.close().await;
    debug!(%peer, upstream = ?opts.server_uri, up_to_down = ?r1, down_to_up = ?r2, "tcp stream ended (snappy)");
}
