use thiserror::Error;

/// Errors raised while obtaining or driving an HTTP/3 tunnel (C4/C5).
#[derive(Debug, Error)]
pub enum DuplexError {
    #[error("tunnel: io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("tunnel: connect failed: {0}")]
    ConnectFailed(String),
    #[error("tunnel: h3 error: {0}")]
    H3(#[from] h3::Error),
    #[error("tunnel: closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("pool: connect failed: {0}")]
    ConnectFailed(#[from] anyhow::Error),
    #[error("pool: handshake timed out after {0:?}")]
    HandshakeTimeout(std::time::Duration),
}
