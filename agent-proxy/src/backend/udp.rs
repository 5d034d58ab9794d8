//! Dials the configured upstream UDP address and splices datagrams
//! through the tunnel's length-prefixed framing (C9), grounded in
//! `forwarder.ForwardUDP`.

use agent_core::buffer_pool::MAX_DATAGRAM_SIZE;
use agent_core::compression::CompressedDuplex;
use agent_core::framing;
use tokio::net::UdpSocket;
use tracing::debug;

use super::TunnelStream;
use crate::config::BackendConfig;
use crate::error::ProxyError;

pub async fn forward(tunnel: TunnelStream, config: &BackendConfig, compression: Option<&str>) -> Result<(), ProxyError> {
    let addr = config
        .upstream_udp
        .as_deref()
        .ok_or_else(|| ProxyError::ConfigInvalid("upstream_udp not configured".into()))?;

    let socket = UdpSocket::bind("0.0.0.0:0").await.map_err(|e| ProxyError::ConnectFailed(e.to_string()))?;
    tokio::time::timeout(config.connect_timeout(), socket.connect(addr))
        .await
        .map_err(|_| ProxyError::ConnectFailed(format!("connect to {addr} timed out")))?
        .map_err(|e| ProxyError::ConnectFailed(e.to_string()))?;

    if compression.is_some_and(|c| c.eq_ignore_ascii_case("snappy")) {
        let tunnel = CompressedDuplex::new(tunnel);
        let up_to_down = async {
            let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
            loop {
                let n = socket.recv(&mut buf).await?;
                if n == 0 {
                    continue;
                }
                tunnel.write(&buf[..n]).await.map_err(std::io::Error::other)?;
            }
            #[allow(unreachable_code)]
            Ok::<(), std::io::Error>(())
        };
        let down_to_up = async {
            let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
            loop {
                let n = tunnel.read(&mut buf).await.map_err(std::io::Error::other)?;
                if n == 0 {
                    return Ok::<(), std::io::Error>(());
                }
                socket.send(&buf[..n]).await?;
            }
        };
        let (r1, r2) = tokio::join!(up_to_down, down_to_up);
        let _ = tunnel.close().await;
        debug!(upstream = addr, "udp backend flow ended up->down={:?} down->up={:?}", r1, r2);
        return Ok(());
    }

    let mut tunnel = tunnel;
    let (mut tun_r, mut tun_w) = tokio::io::split(&mut tunnel);
    let up_to_down = async {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            let n = socket.recv(&mut buf).await?;
            if n == 0 {
                continue;
            }
            framing::write_datagram(&mut tun_w, &buf[..n])
                .await
                .map_err(std::io::Error::other)?;
        }
        #[allow(unreachable_code)]
        Ok::<(), std::io::Error>(())
    };
    let down_to_up = async {
        let mut dst = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            let n = framing::read_datagram(&mut tun_r, &mut dst).await.map_err(std::io::Error::other)?;
            socket.send(&dst[..n]).await?;
        }
        #[allow(unreachable_code)]
        Ok::<(), std::io::Error>(())
    };
    let (r1, r2) = tokio::join!(up_to_down, down_to_up);
    debug!(upstream = addr, "udp backend flow ended up->down={:?} down->up={:?}", r1, r2);
    Ok(())
}
