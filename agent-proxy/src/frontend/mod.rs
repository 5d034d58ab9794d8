//! Downstream-facing proxy: accepts local TCP/UDP traffic and tunnels
//! it over HTTP/3 to the backend (§2 Proxy, C6/C7).

pub mod tcp;
pub mod timed;
pub mod udp;

pub use tcp::TcpFrontend;
pub use udp::UdpFrontend;
