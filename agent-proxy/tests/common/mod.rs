//! Shared harness for the tunnel integration tests: an in-process TCP/UDP
//! echo upstream, a loopback backend, and a loopback frontend wired
//! together with `skip_tls_verify` standing in for a trusted certificate.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use agent_proxy::backend::BackendServer;
use agent_proxy::config::{BackendConfig, Options};
use agent_proxy::frontend::{TcpFrontend, UdpFrontend};
use agent_proxy::metrics::Metrics;
use agent_transport::{ClientPool, Connector, TransportConfig};
use prometheus_client::registry::Registry;
use tokio::net::{TcpListener, UdpSocket};
use tokio_util::sync::CancellationToken;

pub struct Harness {
    pub cancel: CancellationToken,
    pub backend_task: tokio::task::JoinHandle<()>,
    pub connector: Arc<Connector>,
    pub server_uri: http::Uri,
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub async fn spawn_tcp_echo() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else { return };
            tokio::spawn(async move {
                let (mut r, mut w) = stream.split();
                let _ = tokio::io::copy(&mut r, &mut w).await;
            });
        }
    });
    addr
}

pub async fn spawn_udp_echo() -> SocketAddr {
    let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
    let addr = socket.local_addr().unwrap();
    tokio::spawn(async move {
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let Ok((n, from)) = socket.recv_from(&mut buf).await else { return };
            let _ = socket.send_to(&buf[..n], from).await;
        }
    });
    addr
}

/// Starts a backend listening on loopback and returns a ready-to-use
/// `Connector` pointed at it, plus the cancellation token controlling
/// both the backend task and, transitively, anything spawned off the
/// returned connector's pool.
pub async fn start_backend(path: &str, upstream_tcp: Option<SocketAddr>, upstream_udp: Option<SocketAddr>, compression: Option<&str>) -> Harness {
    let config = BackendConfig {
        path: path.to_string(),
        upstream_tcp: upstream_tcp.map(|a| a.to_string()),
        upstream_udp: upstream_udp.map(|a| a.to_string()),
        connect_timeout: None,
        read_timeout: None,
        write_timeout: None,
        timeout: None,
        users: Vec::new(),
    };

    let mut registry = Registry::default();
    let metrics = Arc::new(Metrics::new(&mut registry));
    let server = BackendServer::bind("127.0.0.1:0".parse().unwrap(), config, metrics).unwrap();
    let backend_addr = server.local_addr().unwrap();

    let cancel = CancellationToken::new();
    let serve_cancel = cancel.clone();
    let backend_task = tokio::spawn(async move { server.serve(serve_cancel).await });

    let mut transport_cfg = TransportConfig::new(backend_addr.to_string(), "localhost");
    transport_cfg.skip_tls_verify = true;
    transport_cfg.idle_timeout = Duration::from_secs(60);

    let pool = Arc::new(ClientPool::new(transport_cfg));
    let base_uri: http::Uri = format!("https://{backend_addr}/{path}").parse().unwrap();
    let connector = Arc::new(Connector::new(pool, base_uri.clone()));
    let _ = compression;

    Harness {
        cancel,
        backend_task,
        connector,
        server_uri: base_uri,
    }
}

pub fn frontend_options(server_uri: http::Uri, compression: Option<&str>) -> Options {
    Options {
        listen_addr: "127.0.0.1:0".to_string(),
        server_uri,
        connector: "caddy-http3".to_string(),
        log_level: "info".to_string(),
        connect_timeout: Duration::from_secs(5),
        read_timeout: Duration::from_secs(30),
        write_timeout: Duration::from_secs(30),
        skip_tls_verify: true,
        compression: compression.map(str::to_string),
        metrics_addr: "127.0.0.1:0".to_string(),
    }
}

pub async fn spawn_tcp_frontend(opts: Options, connector: Arc<Connector>, metrics: Arc<Metrics>, cancel: CancellationToken) -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let frontend = TcpFrontend::bind(opts, connector, metrics).await.unwrap();
    let addr = frontend.local_addr().unwrap();
    let handle = tokio::spawn(async move { frontend.serve(cancel).await });
    (addr, handle)
}

pub async fn spawn_udp_frontend(opts: Options, connector: Arc<Connector>, metrics: Arc<Metrics>, cancel: CancellationToken) -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let frontend = UdpFrontend::bind(opts, connector, metrics).await.unwrap();
    let addr = frontend.local_addr().unwrap();
    let handle = tokio::spawn(async move { frontend.serve(cancel).await });
    (addr, handle)
}
