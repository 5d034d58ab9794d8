//! §8 scenario: a pool entry with zero active streams is evicted once
//! it has sat idle past the configured timeout, so the next acquire
//! builds a fresh transport instead of reusing the stale one.

mod common;

use std::sync::Arc;
use std::time::Duration;

use agent_transport::ClientPool;

#[tokio::test]
async fn idle_entry_is_evicted_and_replaced() {
    let upstream = common::spawn_tcp_echo().await;
    let harness = common::start_backend("tunnel", Some(upstream), None, None).await;

    let authority = harness.server_uri.authority().unwrap().to_string();
    let mut cfg = agent_transport::TransportConfig::new(authority, "localhost");
    cfg.skip_tls_verify = true;
    cfg.idle_timeout = Duration::from_millis(50);
    let pool = ClientPool::new(cfg);

    let first = pool.acquire().await.unwrap();
    let first_ptr = Arc::as_ptr(&first.transport);
    pool.release(first.id).await;

    tokio::time::sleep(Duration::from_millis(200)).await;

    let second = pool.acquire().await.unwrap();
    assert_ne!(Arc::as_ptr(&second.transport), first_ptr, "idle entry should have been evicted, not reused");
    pool.release(second.id).await;

    pool.close_all().await;
}
