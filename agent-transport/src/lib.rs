pub mod client;
pub mod config;
pub mod connector;
pub mod duplex;
pub mod error;
pub mod pool;

pub use client::Transport;
pub use config::TransportConfig;
pub use connector::Connector;
pub use duplex::{TunnelDuplex, TunnelReader, TunnelRequest, TunnelWriter};
pub use error::{DuplexError, PoolError};
pub use pool::{ClientPool, EntryId, Lease};
