//! Adapts an HTTP/3 request/response exchange into a full-duplex byte
//! stream (C4): the request body is the write side, the response body
//! is the read side.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::{Buf, Bytes, BytesMut};
use h3::client::SendRequest;
use h3::quic::{BidiStream, OpenStreams};
use h3_quinn::OpenStreams as QuinnOpenStreams;
use http::{Method, Request, StatusCode};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::error::DuplexError;
use crate::pool::{ClientPool, EntryId};

pub const USER_AGENT: &str = "goodog/frontend";

/// Query-string parameters the backend uses to route and configure a
/// tunneled request; mirrors `https://HOST/PATH?version=v1&protocol=...`.
pub struct TunnelRequest {
    pub uri: http::Uri,
}

impl TunnelRequest {
    pub fn new(base: &http::Uri, protocol: &str, compression: Option<&str>) -> Self {
        let mut query = format!("version=v1&protocol={protocol}");
        if let Some(c) = compression {
            query.push_str("&compression=");
            query.push_str(c);
        }
        let path = base.path();
        let uri = format!("{}://{}{}?{}", base.scheme_str().unwrap_or("https"), base.authority().expect("tunnel URI must carry an authority"), path, query)
            .parse()
            .expect("tunnel URI is well-formed by construction");
        TunnelRequest { uri }
    }
}

type Send = <QuinnOpenStreams as OpenStreams<Bytes>>::BidiStream;

/// Shared once-guard state between the read and write halves so the
/// parent pool's `release` runs exactly once regardless of which side
/// notices the tunnel ending first.
struct Shared {
    pool: Arc<ClientPool>,
    entry_id: EntryId,
    released: AtomicBool,
}

impl Shared {
    async fn release_once(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.pool.release(self.entry_id).await;
        }
    }
}

/// One side of a tunnel's duplex stream. Holds its own half of the
/// underlying bidirectional HTTP/3 stream so the read and write sides
/// never contend with each other's lock.
pub struct TunnelReader {
    recv: h3::client::RequestStream<<Send as BidiStream<Bytes>>::RecvStream, Bytes>,
    pending: BytesMut,
    shared: Arc<Shared>,
}

pub struct TunnelWriter {
    send: h3::client::RequestStream<<Send as BidiStream<Bytes>>::SendStream, Bytes>,
    shared: Arc<Shared>,
}

pub struct TunnelDuplex {
    pub reader: TunnelReader,
    pub writer: TunnelWriter,
}

impl TunnelDuplex {
    pub fn split(self) -> (TunnelReader, TunnelWriter) {
        (self.reader, self.writer)
    }
}

/// Lets callers that don't need independent halves (e.g. a single
/// buffered copy loop over the whole tunnel) treat it as one duplex
/// stream, delegating to the reader/writer fields directly.
impl AsyncRead for TunnelDuplex {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.reader).poll_read(cx, buf)
    }
}

impl AsyncWrite for TunnelDuplex {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.writer).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.writer).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.writer).poll_shutdown(cx)
    }
}

/// Performs the client side of §4.4/§6: POST to the tunnel URI,
/// require a 200 response, and hand back a duplex wrapping the
/// request body (write) and response body (read).
pub async fn connect(
    send_request: &mut SendRequest<QuinnOpenStreams, Bytes>,
    request: &TunnelRequest,
    pool: Arc<ClientPool>,
    entry_id: EntryId,
) -> Result<TunnelDuplex, DuplexError> {
    let req = Request::builder()
        .method(Method::POST)
        .uri(request.uri.clone())
        .header(http::header::USER_AGENT, USER_AGENT)
        .body(())
        .expect("request built from well-formed parts");

    let mut stream = send_request.send_request(req).await?;
    let response = stream.recv_response().await?;
    if response.status() != StatusCode::OK {
        return Err(DuplexError::ConnectFailed(response.status().to_string()));
    }

    let (send, recv) = stream.split();
    let shared = Arc::new(Shared {
        pool,
        entry_id,
        released: AtomicBool::new(false),
    });
    Ok(TunnelDuplex {
        reader: TunnelReader {
            recv,
            pending: BytesMut::new(),
            shared: shared.clone(),
        },
        writer: TunnelWriter { send, shared },
    })
}

impl TunnelReader {
    /// Closes the read side: unblocks any in-flight receive and runs
    /// the shared release exactly once.
    pub async fn close(&mut self) {
        self.shared.release_once().await;
    }
}

impl TunnelWriter {
    pub async fn close(&mut self) -> Result<(), DuplexError> {
        self.send.finish().await.map_err(DuplexError::from)?;
        self.shared.release_once().await;
        Ok(())
    }
}

impl AsyncRead for TunnelReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        if self.pending.is_empty() {
            let fut = self.recv.recv_data();
            tokio::pin!(fut);
            match fut.poll(cx) {
                Poll::Ready(Ok(Some(mut data))) => {
                    let mut chunk = BytesMut::with_capacity(data.remaining());
                    while data.has_remaining() {
                        let b = data.chunk();
                        chunk.extend_from_slice(b);
                        let len = b.len();
                        data.advance(len);
                    }
                    self.pending = chunk;
                }
                Poll::Ready(Ok(None)) => return Poll::Ready(Ok(())), // clean EOF
                Poll::Ready(Err(e)) => {
                    return Poll::Ready(Err(std::io::Error::other(e)));
                }
                Poll::Pending => return Poll::Pending,
            }
        }

        let n = self.pending.len().min(buf.remaining());
        let chunk = self.pending.split_to(n);
        buf.put_slice(&chunk);
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for TunnelWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        let fut = self.send.send_data(Bytes::copy_from_slice(buf));
        tokio::pin!(fut);
        match fut.poll(cx) {
            Poll::Ready(Ok(())) => Poll::Ready(Ok(buf.len())),
            Poll::Ready(Err(e)) => Poll::Ready(Err(std::io::Error::other(e))),
            Poll::Pending => Poll::Pending,
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        let fut = self.send.finish();
        tokio::pin!(fut);
        fut.poll(cx).map_err(std::io::Error::other)
    }
}
