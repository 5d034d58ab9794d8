//! Process-wide free-list of fixed-size byte buffers.
//!
//! Mirrors the teacher's convention of sizing buffers to a named constant
//! and reusing them across flows instead of allocating per copy loop.

use std::sync::Mutex;

use bytes::BytesMut;

/// Datagrams and stream copies never need to carry more than one UDP
/// packet's worth of payload at a time.
pub const MAX_DATAGRAM_SIZE: usize = 65535;

/// Default chunk size for the stream copy loop (C3).
pub const COPY_BUFFER_SIZE: usize = 32 * 1024;

/// A lock-protected free-list of same-sized buffers.
///
/// `get` pops a buffer (allocating a fresh one if the list is empty) and
/// clears it to the requested length; `put` returns it to the list after
/// resetting its length to zero so no stale bytes leak across flows.
pub struct BufferPool {
    size: usize,
    free: Mutex<Vec<BytesMut>>,
}

impl BufferPool {
    pub const fn new(size: usize) -> Self {
        BufferPool {
            size,
            free: Mutex::new(Vec::new()),
        }
    }

    pub fn get(&self) -> BytesMut {
        let mut buf = self
            .free
            .lock()
            .expect("buffer pool mutex poisoned")
            .pop()
            .unwrap_or_else(|| BytesMut::with_capacity(self.size));
        buf.clear();
        buf.resize(self.size, 0);
        buf
    }

    pub fn put(&self, mut buf: BytesMut) {
        buf.clear();
        self.free.lock().expect("buffer pool mutex poisoned").push(buf);
    }
}

/// Shared free-list for the C3 stream-copy loop.
pub static COPY_BUFFERS: BufferPool = BufferPool::new(COPY_BUFFER_SIZE);

/// Shared free-list for UDP datagram handling (C7/C9), sized to the
/// largest possible datagram.
pub static DATAGRAM_BUFFERS: BufferPool = BufferPool::new(MAX_DATAGRAM_SIZE);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_released_buffers() {
        let pool = BufferPool::new(16);
        let a = pool.get();
        assert_eq!(a.len(), 16);
        pool.put(a);
        let b = pool.get();
        assert_eq!(b.len(), 16);
        assert!(b.iter().all(|&b| b == 0));
    }
}
