//! Ties the client pool (C5) and the duplex adapter (C4) together into
//! the single `Connect` operation the frontend handlers call, mirroring
//! the Go `Connector` interface's `Connect`/`Close`.

use std::sync::Arc;

use crate::duplex::{self, TunnelDuplex, TunnelRequest};
use crate::error::DuplexError;
use crate::pool::ClientPool;

pub struct Connector {
    pool: Arc<ClientPool>,
    base_uri: http::Uri,
}

impl Connector {
    pub fn new(pool: Arc<ClientPool>, base_uri: http::Uri) -> Self {
        Connector { pool, base_uri }
    }

    /// Acquires a pool entry and performs the tunnel handshake. If the
    /// handshake fails the entry is destroyed rather than released, so
    /// a backend rejection never leaves a phantom stream counted
    /// against an otherwise-healthy transport.
    pub async fn connect(
        &self,
        protocol: &str,
        compression: Option<&str>,
    ) -> Result<TunnelDuplex, DuplexError> {
        let lease = self
            .pool
            .acquire()
            .await
            .map_err(|e| DuplexError::ConnectFailed(e.to_string()))?;

        let mut send_request = lease.transport.send_request.clone();
        let request = TunnelRequest::new(&self.base_uri, protocol, compression);
        match duplex::connect(&mut send_request, &request, self.pool.clone(), lease.id).await {
            Ok(tunnel) => Ok(tunnel),
            Err(e) => {
                self.pool.destroy(lease.id).await;
                Err(e)
            }
        }
    }

    pub async fn close(&self) {
        self.pool.close_all().await;
    }
}
