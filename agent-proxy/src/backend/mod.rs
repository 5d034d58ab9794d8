//! Upstream-facing HTTP/3 server: accepts tunnel requests at the
//! configured path and forwards their duplex body to a dialed TCP/UDP
//! upstream (§4.4/§4.8/§4.9, C8/C9), mirroring `GoodogCaddyAdapter.ServeHTTP`
//! and `forwarder.ForwardTCP`/`ForwardUDP`.

pub mod tcp;
pub mod udp;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use h3::error::ErrorLevel;
use h3::server::RequestStream;
use http::{Method, Request, StatusCode};
use quinn::crypto::rustls::QuicServerConfig;
use rustls::pki_types::{CertificateDer, PrivatePkcs8KeyDer};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::BackendConfig;
use crate::error::ProxyError;
use crate::metrics::{Metrics, ProtoLabel, Protocol};

pub struct BackendServer {
    endpoint: quinn::Endpoint,
    config: Arc<BackendConfig>,
    metrics: Arc<Metrics>,
}

impl BackendServer {
    pub fn bind(addr: SocketAddr, config: BackendConfig, metrics: Arc<Metrics>) -> Result<Self, ProxyError> {
        config.validate()?;
        let (cert, key) = self_signed_cert()?;
        let mut tls = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![cert], key)
            .map_err(|e| ProxyError::ConfigInvalid(e.to_string()))?;
        tls.alpn_protocols = vec![b"h3".to_vec()];

        let quic_server_config = QuicServerConfig::try_from(tls).map_err(|e| ProxyError::ConfigInvalid(e.to_string()))?;
        let server_config = quinn::ServerConfig::with_crypto(Arc::new(quic_server_config));
        let endpoint = quinn::Endpoint::server(server_config, addr).map_err(|e| ProxyError::Io(e))?;

        Ok(BackendServer {
            endpoint,
            config: Arc::new(config),
            metrics,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ProxyError> {
        self.endpoint.local_addr().map_err(ProxyError::Io)
    }

    pub async fn serve(&self, cancel: CancellationToken) {
        info!(addr = ?self.endpoint.local_addr(), path = %self.config.path, "http/3 backend listening");
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("backend stopping");
                    self.endpoint.close(0u32.into(), b"shutdown");
                    return;
                }
                incoming = self.endpoint.accept() => {
                    let Some(incoming) = incoming else { return };
                    let config = self.config.clone();
                    let metrics = self.metrics.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(incoming, config, metrics).await {
                            warn!(error = %e, "http/3 connection ended with error");
                        }
                    });
                }
            }
        }
    }
}

async fn handle_connection(
    incoming: quinn::Incoming,
    config: Arc<BackendConfig>,
    metrics: Arc<Metrics>,
) -> Result<(), ProxyError> {
    let connection = incoming.await.map_err(|e| ProxyError::ConnectFailed(e.to_string()))?;
    let mut h3_conn = h3::server::builder()
        .build(h3_quinn::Connection::new(connection))
        .await
        .map_err(|e| ProxyError::ConnectFailed(e.to_string()))?;

    loop {
        match h3_conn.accept().await {
            Ok(Some((req, stream))) => {
                let config = config.clone();
                let metrics = metrics.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_request(req, stream, config, metrics).await {
                        debug!(error = %e, "tunnel request ended with error");
                    }
                });
            }
            Ok(None) => return Ok(()),
            Err(e) => {
                return match e.get_error_level() {
                    ErrorLevel::ConnectionError => Ok(()),
                    ErrorLevel::StreamError => continue,
                };
            }
        }
    }
}

async fn handle_request(
    req: Request<()>,
    mut stream: RequestStream<h3_quinn::BidiStream<Bytes>, Bytes>,
    config: Arc<BackendConfig>,
    metrics: Arc<Metrics>,
) -> Result<(), ProxyError> {
    let path = req.uri().path().trim_start_matches('/').to_lowercase();
    if path != config.path.to_lowercase() {
        respond(&mut stream, StatusCode::NOT_FOUND).await;
        return Ok(());
    }
    if req.method() != Method::POST {
        respond(&mut stream, StatusCode::PAYMENT_REQUIRED).await;
        return Ok(());
    }

    let query: std::collections::HashMap<String, String> = req
        .uri()
        .query()
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default();

    if query.get("version").map(String::as_str) != Some("v1") {
        respond(&mut stream, StatusCode::BAD_REQUEST).await;
        return Ok(());
    }
    let compression = query.get("compression").map(String::as_str);
    let protocol = query.get("protocol").map(String::as_str).unwrap_or_default();

    respond(&mut stream, StatusCode::OK).await;
    let tunnel = TunnelStream::new(stream);

    let result = match protocol {
        "tcp" => {
            metrics
                .backend_requests_total
                .get_or_create(&ProtoLabel { protocol: Protocol::Tcp })
                .inc();
            tcp::forward(tunnel, &config, compression).await
        }
        "udp" => {
            metrics
                .backend_requests_total
                .get_or_create(&ProtoLabel { protocol: Protocol::Udp })
                .inc();
            udp::forward(tunnel, &config, compression).await
        }
        other => {
            warn!(protocol = %other, "unknown tunnel protocol requested");
            return Ok(());
        }
    };
    if let Err(e) = result {
        error!(error = %e, "tunnel forwarding failed");
    }
    Ok(())
}

/// Adapts the server-side request/response stream into a full-duplex
/// byte stream the same way [`agent_transport::duplex`] does for the
/// client side: the request body is the read side, the response body
/// is the write side.
pub struct TunnelStream {
    inner: RequestStream<h3_quinn::BidiStream<Bytes>, Bytes>,
    pending: bytes::BytesMut,
}

impl TunnelStream {
    fn new(inner: RequestStream<h3_quinn::BidiStream<Bytes>, Bytes>) -> Self {
        TunnelStream {
            inner,
            pending: bytes::BytesMut::new(),
        }
    }
}

impl tokio::io::AsyncRead for TunnelStream {
    fn poll_read(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        use bytes::Buf;
        if self.pending.is_empty() {
            let fut = self.inner.recv_data();
            tokio::pin!(fut);
            match fut.poll(cx) {
                std::task::Poll::Ready(Ok(Some(mut data))) => {
                    let mut chunk = bytes::BytesMut::with_capacity(data.remaining());
                    while data.has_remaining() {
                        let b = data.chunk();
                        chunk.extend_from_slice(b);
                        let len = b.len();
                        data.advance(len);
                    }
                    self.pending = chunk;
                }
                std::task::Poll::Ready(Ok(None)) => return std::task::Poll::Ready(Ok(())),
                std::task::Poll::Ready(Err(e)) => return std::task::Poll::Ready(Err(std::io::Error::other(e))),
                std::task::Poll::Pending => return std::task::Poll::Pending,
            }
        }
        let n = self.pending.len().min(buf.remaining());
        let chunk = self.pending.split_to(n);
        buf.put_slice(&chunk);
        std::task::Poll::Ready(Ok(()))
    }
}

impl tokio::io::AsyncWrite for TunnelStream {
    fn poll_write(mut self: std::pin::Pin<&mut Self>, cx: &mut std::task::Context<'_>, buf: &[u8]) -> std::task::Poll<std::io::Result<usize>> {
        let fut = self.inner.send_data(Bytes::copy_from_slice(buf));
        tokio::pin!(fut);
        match fut.poll(cx) {
            std::task::Poll::Ready(Ok(())) => std::task::Poll::Ready(Ok(buf.len())),
            std::task::Poll::Ready(Err(e)) => std::task::Poll::Ready(Err(std::io::Error::other(e))),
            std::task::Poll::Pending => std::task::Poll::Pending,
        }
    }

    fn poll_flush(self: std::pin::Pin<&mut Self>, _cx: &mut std::task::Context<'_>) -> std::task::Poll<std::io::Result<()>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: std::pin::Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> std::task::Poll<std::io::Result<()>> {
        let fut = self.inner.finish();
        tokio::pin!(fut);
        fut.poll(cx).map_err(std::io::Error::other)
    }
}

async fn respond(stream: &mut RequestStream<h3_quinn::BidiStream<Bytes>, Bytes>, status: StatusCode) {
    let response = http::Response::builder().status(status).body(()).expect("response built from valid parts");
    if let Err(e) = stream.send_response(response).await {
        debug!(error = %e, "failed to send tunnel response headers");
    }
}

fn self_signed_cert() -> Result<(CertificateDer<'static>, PrivatePkcs8KeyDer<'static>), ProxyError> {
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".into()])
        .map_err(|e| ProxyError::ConfigInvalid(e.to_string()))?;
    let key = PrivatePkcs8KeyDer::from(certified.key_pair.serialize_der());
    Ok((certified.cert.der().clone(), key))
}
