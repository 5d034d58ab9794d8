//! Optional per-direction snappy compression layer over a duplex byte
//! stream (C2).
//!
//! `snap::raw::Encoder`/`Decoder` replace the pooled `*snappy.Reader`/
//! `*snappy.Writer` pair the frontend/backend used originally; each
//! compressed chunk is framed with its own 4-byte big-endian length
//! prefix (distinct from the 2-byte UDP datagram framing in
//! [`crate::framing`]) because a snappy block can expand slightly
//! beyond 65535 bytes in the worst case and must not overflow a `u16`.

use std::sync::Mutex;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};

#[derive(Debug, Error)]
pub enum CompressionError {
    #[error("compression: io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("compression: snappy error: {0}")]
    Snappy(#[from] snap::Error),
    #[error("compression: reader closed")]
    ReaderClosed,
    #[error("compression: writer closed")]
    WriterClosed,
}

/// Process-wide free-lists of snappy codec state. Construction of an
/// `Encoder`/`Decoder` allocates internal scratch buffers, so reuse
/// matters at high connect rates exactly as it did for the pooled Go
/// `sync.Pool` of `*snappy.{Reader,Writer}`.
struct CodecPool {
    encoders: Mutex<Vec<snap::raw::Encoder>>,
    decoders: Mutex<Vec<snap::raw::Decoder>>,
}

static CODEC_POOL: CodecPool = CodecPool {
    encoders: Mutex::new(Vec::new()),
    decoders: Mutex::new(Vec::new()),
};

fn get_encoder() -> snap::raw::Encoder {
    CODEC_POOL
        .encoders
        .lock()
        .expect("codec pool mutex poisoned")
        .pop()
        .unwrap_or_default()
}

fn put_encoder(enc: snap::raw::Encoder) {
    CODEC_POOL
        .encoders
        .lock()
        .expect("codec pool mutex poisoned")
        .push(enc);
}

fn get_decoder() -> snap::raw::Decoder {
    CODEC_POOL
        .decoders
        .lock()
        .expect("codec pool mutex poisoned")
        .pop()
        .unwrap_or_default()
}

fn put_decoder(dec: snap::raw::Decoder) {
    CODEC_POOL
        .decoders
        .lock()
        .expect("codec pool mutex poisoned")
        .push(dec);
}

struct ReaderState<R> {
    half: R,
    decoder: snap::raw::Decoder,
    pending: BytesMut,
    cursor: usize,
}

struct WriterState<W> {
    half: W,
    encoder: snap::raw::Encoder,
}

/// Wraps a duplex stream with independently synchronised read and
/// write sides, so callers in different directions never contend with
/// each other. Constructed over `tokio::io::split`'s halves, which
/// already guard the one real shared resource (the underlying `D`)
/// with their own lock; our two `tokio::sync::Mutex`es add the
/// higher-level "closed" state each side needs.
pub struct CompressedDuplex<D> {
    reader: tokio::sync::Mutex<Option<ReaderState<ReadHalf<D>>>>,
    writer: tokio::sync::Mutex<Option<WriterState<WriteHalf<D>>>>,
}

impl<D> CompressedDuplex<D>
where
    D: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(inner: D) -> Self {
        let (read_half, write_half) = tokio::io::split(inner);
        CompressedDuplex {
            reader: tokio::sync::Mutex::new(Some(ReaderState {
                half: read_half,
                decoder: get_decoder(),
                pending: BytesMut::new(),
                cursor: 0,
            })),
            writer: tokio::sync::Mutex::new(Some(WriterState {
                half: write_half,
                encoder: get_encoder(),
            })),
        }
    }

    pub async fn read(&self, dst: &mut [u8]) -> Result<usize, CompressionError> {
        let mut guard = self.reader.lock().await;
        let state = guard.as_mut().ok_or(CompressionError::ReaderClosed)?;

        if state.cursor >= state.pending.len() {
            let len = match state.half.read_u32().await {
                Ok(len) => len as usize,
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(0),
                Err(e) => return Err(e.into()),
            };
            let mut frame = vec![0u8; len];
            state.half.read_exact(&mut frame).await?;
            let decompressed = state.decoder.decompress_vec(&frame)?;
            state.pending = BytesMut::from(&decompressed[..]);
            state.cursor = 0;
        }

        let available = &state.pending[state.cursor..];
        let n = available.len().min(dst.len());
        dst[..n].copy_from_slice(&available[..n]);
        state.cursor += n;
        Ok(n)
    }

    pub async fn write(&self, payload: &[u8]) -> Result<(), CompressionError> {
        let mut guard = self.writer.lock().await;
        let state = guard.as_mut().ok_or(CompressionError::WriterClosed)?;

        let compressed = state.encoder.compress_vec(payload)?;
        state.half.write_u32(compressed.len() as u32).await?;
        state.half.write_all(&compressed).await?;
        state.half.flush().await?;
        Ok(())
    }

    /// Closes the underlying stream first so a reader blocked in the
    /// other half unblocks, then returns the pooled codecs exactly
    /// once. Idempotent: a second call observes both sides already
    /// `None` and is a no-op.
    pub async fn close(&self) -> Result<(), CompressionError> {
        let write_half = {
            let mut guard = self.writer.lock().await;
            guard.take()
        };
        let mut shutdown_result = Ok(());
        if let Some(mut state) = write_half {
            shutdown_result = state.half.shutdown().await.map_err(CompressionError::from);
            put_encoder(state.encoder);
        }

        let read_half = {
            let mut guard = self.reader.lock().await;
            guard.take()
        };
        if let Some(state) = read_half {
            put_decoder(state.decoder);
            drop(state.half);
        }

        shutdown_result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn round_trips_through_compression() {
        let (client, server) = duplex(4096);
        let client = CompressedDuplex::new(client);
        let server = CompressedDuplex::new(server);

        let payload = b"hello snappy world, compress me please, compress me please";
        client.write(payload).await.unwrap();

        let mut buf = vec![0u8; payload.len()];
        let mut got = 0;
        while got < buf.len() {
            let n = server.read(&mut buf[got..]).await.unwrap();
            assert!(n > 0);
            got += n;
        }
        assert_eq!(&buf, payload);
    }

    #[tokio::test]
    async fn closed_sides_return_soft_errors() {
        let (client, _server) = duplex(4096);
        let wrapper = CompressedDuplex::new(client);
        wrapper.close().await.unwrap();

        let err = wrapper.write(b"nope").await.unwrap_err();
        assert!(matches!(err, CompressionError::WriterClosed));

        let mut buf = [0u8; 4];
        let err = wrapper.read(&mut buf).await.unwrap_err();
        assert!(matches!(err, CompressionError::ReaderClosed));
    }
}
