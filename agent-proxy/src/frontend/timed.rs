//! Per-operation read/write deadlines for a downstream connection,
//! mirroring `netext.NewTimedConn`: every `read`/`write` call gets its
//! own deadline rather than one deadline for the whole connection.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::Sleep;

pin_project_lite::pin_project! {
    /// Applies a fresh deadline to each individual read/write operation
    /// rather than one deadline for the connection's whole lifetime, so a
    /// connection idle between messages is not killed by activity on the
    /// other direction.
    ///
    /// The deadline timer is created lazily on the first `Pending` poll of
    /// an operation and kept alive across repeated polls of that same
    /// operation, rather than rebuilt every poll — rebuilding it every poll
    /// would drop the timer's waker registration before it could ever fire.
    pub struct TimedConn<C> {
        #[pin]
        inner: C,
        read_timeout: Duration,
        write_timeout: Duration,
        read_deadline: Option<Pin<Box<Sleep>>>,
        write_deadline: Option<Pin<Box<Sleep>>>,
    }
}

impl<C> TimedConn<C>
where
    C: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(inner: C, read_timeout: Duration, write_timeout: Duration) -> Self {
        TimedConn {
            inner,
            read_timeout,
            write_timeout,
            read_deadline: None,
            write_deadline: None,
        }
    }
}

impl<C> AsyncRead for TimedConn<C>
where
    C: AsyncRead + Unpin,
{
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.project();
        if let Poll::Ready(r) = this.inner.poll_read(cx, buf) {
            *this.read_deadline = None;
            return Poll::Ready(r);
        }

        let read_timeout = *this.read_timeout;
        let deadline = this
            .read_deadline
            .get_or_insert_with(|| Box::pin(tokio::time::sleep_until(tokio::time::Instant::now() + read_timeout)));
        match deadline.as_mut().poll(cx) {
            Poll::Ready(()) => {
                *this.read_deadline = None;
                Poll::Ready(Err(io::Error::new(io::ErrorKind::TimedOut, "read timed out")))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<C> AsyncWrite for TimedConn<C>
where
    C: AsyncWrite + Unpin,
{
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let this = self.project();
        if let Poll::Ready(r) = this.inner.poll_write(cx, buf) {
            *this.write_deadline = None;
            return Poll::Ready(r);
        }

        let write_timeout = *this.write_timeout;
        let deadline = this
            .write_deadline
            .get_or_insert_with(|| Box::pin(tokio::time::sleep_until(tokio::time::Instant::now() + write_timeout)));
        match deadline.as_mut().poll(cx) {
            Poll::Ready(()) => {
                *this.write_deadline = None;
                Poll::Ready(Err(io::Error::new(io::ErrorKind::TimedOut, "write timed out")))
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    #[tokio::test]
    async fn read_times_out_when_peer_sends_nothing() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();

        let mut timed = TimedConn::new(server, Duration::from_millis(50), Duration::from_secs(5));
        let mut buf = [0u8; 16];
        let result = timed.read(&mut buf).await;
        let err = result.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn read_succeeds_before_deadline() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mut client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();

        client.write_all(b"hi").await.unwrap();

        let mut timed = TimedConn::new(server, Duration::from_secs(5), Duration::from_secs(5));
        let mut buf = [0u8; 16];
        let n = timed.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hi");
    }
}
