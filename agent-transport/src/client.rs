//! Builds one HTTP/3-over-QUIC transport: a `quinn` endpoint, the QUIC
//! handshake, and the `h3` client connection driven from it. Used by
//! [`crate::pool`] whenever the pool decides a fresh transport is
//! needed.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use h3::client::SendRequest;
use h3_quinn::quinn;

use crate::config::TransportConfig;

/// A live HTTP/3 transport: the request-issuing handle plus a task
/// driving the underlying connection so it keeps making progress
/// between requests.
pub struct Transport {
    pub send_request: SendRequest<h3_quinn::OpenStreams, Bytes>,
    driver: tokio::task::JoinHandle<()>,
}

impl Transport {
    pub async fn connect(cfg: &TransportConfig) -> anyhow::Result<Transport> {
        let remote: SocketAddr = tokio::net::lookup_host(&cfg.server_authority)
            .await?
            .next()
            .context("server authority resolved to no addresses")?;

        let bind_addr: SocketAddr = if remote.is_ipv6() {
            "[::]:0".parse().unwrap()
        } else {
            "0.0.0.0:0".parse().unwrap()
        };
        let mut endpoint = quinn::Endpoint::client(bind_addr)?;
        endpoint.set_default_client_config(build_client_config(cfg)?);

        let connecting = endpoint.connect(remote, &cfg.server_name)?;
        let quic_conn = tokio::time::timeout(cfg.handshake_timeout, connecting)
            .await
            .context("QUIC handshake timed out")??;

        let h3_conn = h3_quinn::Connection::new(quic_conn);
        let (mut driver, send_request) = h3::client::builder()
            .build::<_, _, Bytes>(h3_conn)
            .await
            .context("HTTP/3 handshake failed")?;

        let driver = tokio::spawn(async move {
            if let Err(err) = std::future::poll_fn(|cx| driver.poll_close(cx)).await {
                tracing::debug!(error = %err, "HTTP/3 connection driver exited");
            }
        });

        Ok(Transport { send_request, driver })
    }

    /// Best-effort shutdown; used on eviction and on destroy-after-failure.
    pub fn close(&self) {
        self.driver.abort();
    }
}

fn build_client_config(cfg: &TransportConfig) -> anyhow::Result<quinn::ClientConfig> {
    let mut roots = rustls::RootCertStore::empty();
    for cert in rustls_native_certs::load_native_certs().certs {
        let _ = roots.add(cert);
    }

    let tls_builder = rustls::ClientConfig::builder().with_root_certificates(roots.clone());
    let mut tls_config = if cfg.skip_tls_verify {
        rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoServerVerification))
            .with_no_client_auth()
    } else {
        tls_builder.with_no_client_auth()
    };
    tls_config.alpn_protocols = vec![b"h3".to_vec()];

    let quic_tls = quinn::crypto::rustls::QuicClientConfig::try_from(tls_config)?;
    let mut client_config = quinn::ClientConfig::new(Arc::new(quic_tls));

    let mut transport = quinn::TransportConfig::default();
    transport.max_idle_timeout(Some(
        cfg.idle_timeout
            .try_into()
            .context("idle timeout out of range for QUIC")?,
    ));
    transport.keep_alive_interval(Some(Duration::from_secs(15)));
    client_config.transport_config(Arc::new(transport));

    Ok(client_config)
}

/// Accepts any server certificate; only ever wired in when
/// `skip_tls_verify` is set, which is a testing affordance, not a
/// production posture.
#[derive(Debug)]
struct NoServerVerification;

impl rustls::client::danger::ServerCertVerifier for NoServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
