//! §8 scenario: a plaintext TCP connection through the frontend is
//! echoed back correctly end-to-end over the loopback HTTP/3 tunnel.

mod common;

use std::sync::Arc;

use prometheus_client::registry::Registry;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[tokio::test]
async fn tcp_echo_round_trip_no_compression() {
    let upstream = common::spawn_tcp_echo().await;
    let harness = common::start_backend("tunnel", Some(upstream), None, None).await;

    let mut registry = Registry::default();
    let metrics = Arc::new(agent_proxy::Metrics::new(&mut registry));
    let opts = common::frontend_options(harness.server_uri.clone(), None);
    let (frontend_addr, _frontend_task) =
        common::spawn_tcp_frontend(opts, harness.connector.clone(), metrics, harness.cancel.clone()).await;

    let mut client = TcpStream::connect(frontend_addr).await.unwrap();
    client.write_all(b"hello tunnel").await.unwrap();

    let mut buf = [0u8; 64];
    let n = client.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"hello tunnel");
}
