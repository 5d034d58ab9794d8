//! 16-bit length-prefixed datagram framing over a byte stream (C1).
//!
//! UDP payloads never exceed 65507 bytes on IPv4 (and are similarly
//! bounded on IPv6), so a fixed `u16` length prefix is sufficient and
//! keeps readers and writers trivially in sync without a varint decoder.

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

pub const MAX_DATAGRAM_LEN: usize = u16::MAX as usize;

#[derive(Debug, Error)]
pub enum FramingError {
    #[error("framing: io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("framing: destination buffer too small for {needed} bytes")]
    BufferTooSmall { needed: usize },
}

/// Writes `u16_be(len(payload)) || payload` to `stream`.
///
/// `payload.len()` must be `<= MAX_DATAGRAM_LEN`; callers (the UDP
/// frontend/backend handlers) are responsible for that bound since it
/// already holds for any datagram read off a real UDP socket.
pub async fn write_datagram<W>(stream: &mut W, payload: &[u8]) -> Result<(), FramingError>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    debug_assert!(payload.len() <= MAX_DATAGRAM_LEN);
    let len = payload.len() as u16;
    stream.write_u16(len).await?;
    stream.write_all(payload).await?;
    Ok(())
}

/// Reads one framed datagram into `dst`, returning the number of bytes
/// written. `dst` must be at least as large as the advertised length;
/// a short buffer is a caller bug, not a recoverable wire condition, so
/// it is reported distinctly rather than silently truncated.
pub async fn read_datagram<R>(stream: &mut R, dst: &mut [u8]) -> Result<usize, FramingError>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let n = stream.read_u16().await? as usize;
    if n > dst.len() {
        return Err(FramingError::BufferTooSmall { needed: n });
    }
    stream.read_exact(&mut dst[..n]).await?;
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0)]
    #[test_case(1)]
    #[test_case(222)]
    #[test_case(65535)]
    #[tokio::test]
    async fn round_trips_exact_bytes(len: usize) {
        let payload: Vec<u8> = (0..len).map(|i| (i % 256) as u8).collect();
        let mut wire = Vec::new();
        write_datagram(&mut wire, &payload).await.unwrap();

        let mut cursor = std::io::Cursor::new(wire);
        let mut dst = vec![0u8; len];
        let n = read_datagram(&mut cursor, &mut dst).await.unwrap();
        assert_eq!(n, len);
        assert_eq!(&dst[..n], payload.as_slice());
    }

    #[tokio::test]
    async fn rejects_undersized_destination() {
        let mut wire = Vec::new();
        write_datagram(&mut wire, &[1, 2, 3, 4]).await.unwrap();
        let mut cursor = std::io::Cursor::new(wire);
        let mut dst = vec![0u8; 2];
        let err = read_datagram(&mut cursor, &mut dst).await.unwrap_err();
        assert!(matches!(err, FramingError::BufferTooSmall { needed: 4 }));
    }

    #[tokio::test]
    async fn unexpected_eof_is_io_error() {
        let wire: Vec<u8> = vec![0, 5, 1, 2]; // advertises 5, only 2 follow
        let mut cursor = std::io::Cursor::new(wire);
        let mut dst = vec![0u8; 16];
        let err = read_datagram(&mut cursor, &mut dst).await.unwrap_err();
        assert!(matches!(err, FramingError::Io(_)));
    }
}
