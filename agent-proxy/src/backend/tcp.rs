//! Dials the configured upstream TCP address and splices it to the
//! tunnel stream (C8), grounded in `forwarder.ForwardTCP`.

use agent_core::compression::CompressedDuplex;
use agent_core::copy;
use tokio::net::TcpStream;
use tracing::debug;

use super::TunnelStream;
use crate::config::BackendConfig;
use crate::error::ProxyError;
use crate::frontend::timed::TimedConn;

pub async fn forward(mut tunnel: TunnelStream, config: &BackendConfig, compression: Option<&str>) -> Result<(), ProxyError> {
    let addr = config
        .upstream_tcp
        .as_deref()
        .ok_or_else(|| ProxyError::ConfigInvalid("upstream_tcp not configured".into()))?;

    let stream = tokio::time::timeout(config.connect_timeout(), TcpStream::connect(addr))
        .await
        .map_err(|_| ProxyError::ConnectFailed(format!("connect to {addr} timed out")))?
        .map_err(|e| ProxyError::ConnectFailed(e.to_string()))?;

    let mut upstream = TimedConn::new(stream, config.read_timeout(), config.write_timeout());

    if compression.is_some_and(|c| c.eq_ignore_ascii_case("snappy")) {
        let downstream = CompressedDuplex::new(tunnel);
        let (mut up_r, mut up_w) = tokio::io::split(&mut upstream);
        let down_to_up = async {
            let mut buf = vec![0u8; agent_core::buffer_pool::COPY_BUFFER_SIZE];
            loop {
                match downstream.read(&mut buf).await {
                    Ok(0) => return Ok::<(), std::io::Error>(()),
                    Ok(n) => tokio::io::AsyncWriteExt::write_all(&mut up_w, &buf[..n]).await?,
                    Err(_) => return Ok(()),
                }
            }
        };
        let up_to_down = async {
            let mut buf = vec![0u8; agent_core::buffer_pool::COPY_BUFFER_SIZE];
            loop {
                match tokio::io::AsyncReadExt::read(&mut up_r, &mut buf).await {
                    Ok(0) => return Ok::<(), std::io::Error>(()),
                    Ok(n) => {
                        if downstream.write(&buf[..n]).await.is_err() {
                            return Ok(());
                        }
                    }
                    Err(e) => return Err(e),
                }
            }
        };
        let (r1, r2) = tokio::join!(down_to_up, up_to_down);
        let _ = downstream.close().await;
        debug!(upstream = addr, "tcp backend stream ended down->up={:?} up->down={:?}", r1, r2);
        return Ok(());
    }

    let (mut tun_r, mut tun_w) = tokio::io::split(&mut tunnel);
    let (mut up_r, mut up_w) = tokio::io::split(&mut upstream);
    let up_to_down = copy::copy(&mut tun_w, &mut up_r, false);
    let down_to_up = copy::copy(&mut up_w, &mut tun_r, false);
    let (r1, r2) = tokio::join!(up_to_down, down_to_up);
    debug!(upstream = addr, "tcp backend stream ended up->down={:?} down->up={:?}", r1, r2);
    Ok(())
}
