//! Downstream UDP listener with per-source-address flow demultiplexing
//! and idle eviction (C7), grounded in the double-checked-locking
//! `getRemoteWriter` pattern: a flow's upstream tunnel is created lazily
//! on first packet from a source address and torn down when its read
//! side observes EOF or error.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use agent_core::buffer_pool::{DATAGRAM_BUFFERS, MAX_DATAGRAM_SIZE};
use agent_core::framing;
use agent_transport::{Connector, TunnelWriter};
use tokio::net::UdpSocket;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Options;
use crate::metrics::{EvictionLabel, Metrics, ProtoLabel, Protocol};

struct Flow {
    writer: Arc<tokio::sync::Mutex<TunnelWriter>>,
}

pub struct UdpFrontend {
    socket: Arc<UdpSocket>,
    connector: Arc<Connector>,
    opts: Options,
    metrics: Arc<Metrics>,
    flows: Arc<RwLock<HashMap<SocketAddr, Flow>>>,
}

impl UdpFrontend {
    pub async fn bind(opts: Options, connector: Arc<Connector>, metrics: Arc<Metrics>) -> std::io::Result<Self> {
        let socket = Arc::new(UdpSocket::bind(&opts.listen_addr).await?);
        info!(addr = %opts.listen_addr, "udp frontend listening");
        Ok(UdpFrontend {
            socket,
            connector,
            opts,
            metrics,
            flows: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub async fn serve(&self, cancel: CancellationToken) {
        let mut buf = DATAGRAM_BUFFERS.get();
        loop {
            let recv = self.socket.recv_from(&mut buf);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("udp frontend stopping");
                    return;
                }
                result = recv => {
                    match result {
                        Ok((n, from)) => {
                            let data = buf[..n].to_vec();
                            self.handle(from, data).await;
                        }
                        Err(e) => {
                            error!(error = %e, "udp recv failed");
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn handle(&self, from: SocketAddr, data: Vec<u8>) {
        let writer = match self.get_or_create_flow(from).await {
            Ok(w) => w,
            Err(e) => {
                warn!(%from, error = %e, "udp connect to upstream failed");
                return;
            }
        };
        let mut guard = writer.lock().await;
        if let Err(e) = framing::write_datagram(&mut *guard, &data).await {
            warn!(%from, error = %e, "udp write to upstream failed");
        }
    }

    async fn get_or_create_flow(&self, from: SocketAddr) -> Result<Arc<tokio::sync::Mutex<TunnelWriter>>, agent_transport::DuplexError> {
        if let Some(flow) = self.flows.read().await.get(&from) {
            return Ok(flow.writer.clone());
        }

        let tunnel = self.connector.connect("udp", self.opts.compression.as_deref()).await?;
        self.metrics
            .tunnels_created_total
            .get_or_create(&ProtoLabel { protocol: Protocol::Udp })
            .inc();
        let (mut reader, writer) = tunnel.split();

        let mut flows = self.flows.write().await;
        if let Some(flow) = flows.get(&from) {
            // Lost the race: another task already created this flow.
            let _ = reader.close().await;
            return Ok(flow.writer.clone());
        }
        let writer = Arc::new(tokio::sync::Mutex::new(writer));
        flows.insert(from, Flow { writer: writer.clone() });
        drop(flows);

        self.metrics.udp_flows_active.set(self.flows.read().await.len() as i64);

        let socket = self.socket.clone();
        let flows_table = self.flows.clone();
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            let mut dst = vec![0u8; MAX_DATAGRAM_SIZE];
            loop {
                match framing::read_datagram(&mut reader, &mut dst).await {
                    Ok(n) => {
                        if let Err(e) = socket.send_to(&dst[..n], from).await {
                            debug!(%from, error = %e, "udp write to downstream failed");
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(%from, error = %e, "udp read from upstream ended");
                        break;
                    }
                }
            }
            reader.close().await;
            let mut flows = flows_table.write().await;
            flows.remove(&from);
            metrics.udp_flows_active.set(flows.len() as i64);
            metrics
                .udp_flow_evictions_total
                .get_or_create(&EvictionLabel { reason: "closed" })
                .inc();
        });

        Ok(writer)
    }
}
