use std::time::Duration;

/// QUIC DoS guidance: cap concurrent request/response exchanges
/// multiplexed onto a single transport.
pub const MAX_STREAMS_PER_CONN: u16 = 66;

/// How long a pool entry may sit with zero active streams before it is
/// eligible for eviction on the next acquire.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(8 * 60);

/// Upper bound on the QUIC handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(6);

/// Immutable configuration for the HTTP/3 client pool and the
/// transports it builds.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Authority (`host:port`) to dial for every new transport.
    pub server_authority: String,
    /// Server name used for the TLS handshake (SNI).
    pub server_name: String,
    /// Skip certificate verification; only meant for local testing.
    pub skip_tls_verify: bool,
    pub max_streams_per_conn: u16,
    /// Floor on pool size below which a new transport is always built
    /// rather than reusing an existing one.
    pub min_clients: usize,
    pub idle_timeout: Duration,
    pub handshake_timeout: Duration,
}

impl TransportConfig {
    pub fn new(server_authority: impl Into<String>, server_name: impl Into<String>) -> Self {
        TransportConfig {
            server_authority: server_authority.into(),
            server_name: server_name.into(),
            skip_tls_verify: false,
            max_streams_per_conn: MAX_STREAMS_PER_CONN,
            min_clients: 0,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}
