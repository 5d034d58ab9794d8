//! §8 scenario: a tunnel dial against a path the backend isn't
//! configured to serve surfaces as a connect failure rather than a
//! silently-broken stream, mirroring `GoodogCaddyAdapter.ServeHTTP`'s
//! 404 response for an unmatched path.

mod common;

#[tokio::test]
async fn wrong_path_is_rejected() {
    let upstream = common::spawn_tcp_echo().await;
    let harness = common::start_backend("tunnel", Some(upstream), None, None).await;

    let authority = harness.server_uri.authority().unwrap().to_string();
    let mut cfg = agent_transport::TransportConfig::new(authority, "localhost");
    cfg.skip_tls_verify = true;
    let pool = std::sync::Arc::new(agent_transport::ClientPool::new(cfg));

    let wrong_uri: http::Uri = format!("https://{}/not-the-configured-path", harness.server_uri.authority().unwrap())
        .parse()
        .unwrap();
    let connector = agent_transport::Connector::new(pool, wrong_uri);

    let result = connector.connect("tcp", None).await;
    assert!(result.is_err(), "connect against an unconfigured path should fail");
}
