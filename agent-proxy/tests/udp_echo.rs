//! §8 scenario: a UDP datagram sent through the frontend is echoed
//! back by the upstream over the same per-source-address flow.

mod common;

use std::sync::Arc;
use std::time::Duration;

use prometheus_client::registry::Registry;
use tokio::net::UdpSocket;

#[tokio::test]
async fn udp_echo_round_trip() {
    let upstream = common::spawn_udp_echo().await;
    let harness = common::start_backend("tunnel", None, Some(upstream), None).await;

    let mut registry = Registry::default();
    let metrics = Arc::new(agent_proxy::Metrics::new(&mut registry));
    let opts = common::frontend_options(harness.server_uri.clone(), None);
    let (frontend_addr, _frontend_task) =
        common::spawn_udp_frontend(opts, harness.connector.clone(), metrics, harness.cancel.clone()).await;

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.connect(frontend_addr).await.unwrap();
    client.send(b"ping").await.unwrap();

    let mut buf = [0u8; 64];
    let n = tokio::time::timeout(Duration::from_secs(5), client.recv(&mut buf)).await.unwrap().unwrap();
    assert_eq!(&buf[..n], b"ping");
}
