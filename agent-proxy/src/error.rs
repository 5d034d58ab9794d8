use thiserror::Error;

/// Top-level error type for the frontend and backend handlers. Wraps
/// the lower crates' errors and adds the handler-boundary kinds (A1)
/// that never occur inside `agent-core`/`agent-transport`.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("proxy: invalid configuration: {0}")]
    ConfigInvalid(String),
    #[error("proxy: connect failed: {0}")]
    ConnectFailed(String),
    #[error("proxy: io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("proxy: tunnel error: {0}")]
    Duplex(#[from] agent_transport::DuplexError),
    #[error("proxy: compression error: {0}")]
    Compression(#[from] agent_core::compression::CompressionError),
    #[error("proxy: framing error: {0}")]
    Framing(#[from] agent_core::framing::FramingError),
    #[error("proxy: copy error: {0}")]
    Copy(#[from] agent_core::copy::CopyError),
}

impl From<agent_transport::PoolError> for ProxyError {
    fn from(e: agent_transport::PoolError) -> Self {
        ProxyError::ConnectFailed(e.to_string())
    }
}
