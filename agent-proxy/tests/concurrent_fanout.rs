//! §8 scenario: many concurrent TCP connections through the same
//! frontend, sharing the connector's pool, each get their own tunnel
//! and their own correctly-isolated echo.

mod common;

use std::sync::Arc;

use prometheus_client::registry::Registry;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[tokio::test]
async fn concurrent_connections_get_isolated_tunnels() {
    let upstream = common::spawn_tcp_echo().await;
    let harness = common::start_backend("tunnel", Some(upstream), None, None).await;

    let mut registry = Registry::default();
    let metrics = Arc::new(agent_proxy::Metrics::new(&mut registry));
    let opts = common::frontend_options(harness.server_uri.clone(), None);
    let (frontend_addr, _frontend_task) =
        common::spawn_tcp_frontend(opts, harness.connector.clone(), metrics, harness.cancel.clone()).await;

    let mut tasks = Vec::new();
    for i in 0..16u32 {
        tasks.push(tokio::spawn(async move {
            let mut client = TcpStream::connect(frontend_addr).await.unwrap();
            let payload = format!("conn-{i}");
            client.write_all(payload.as_bytes()).await.unwrap();
            let mut buf = [0u8; 32];
            let n = client.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], payload.as_bytes());
        }));
    }
    for t in tasks {
        t.await.unwrap();
    }
}
