//! §8 scenario: the same round trip as `tcp_echo`, but with snappy
//! compression negotiated on both the frontend and backend side.

mod common;

use std::sync::Arc;

use prometheus_client::registry::Registry;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[tokio::test]
async fn tcp_echo_round_trip_snappy() {
    let upstream = common::spawn_tcp_echo().await;
    let harness = common::start_backend("tunnel", Some(upstream), None, Some("snappy")).await;

    let mut registry = Registry::default();
    let metrics = Arc::new(agent_proxy::Metrics::new(&mut registry));
    let opts = common::frontend_options(harness.server_uri.clone(), Some("snappy"));
    let (frontend_addr, _frontend_task) =
        common::spawn_tcp_frontend(opts, harness.connector.clone(), metrics, harness.cancel.clone()).await;

    let mut client = TcpStream::connect(frontend_addr).await.unwrap();
    let payload = vec![b'x'; 8192];
    client.write_all(&payload).await.unwrap();

    let mut received = Vec::new();
    while received.len() < payload.len() {
        let mut buf = [0u8; 4096];
        let n = client.read(&mut buf).await.unwrap();
        assert!(n > 0, "connection closed before full echo received");
        received.extend_from_slice(&buf[..n]);
    }
    assert_eq!(received, payload);
}
