//! Growable receive buffer.
//!
//! # Responsibilities
//! - Pull every byte currently available from a non-blocking socket
//! - Expose the unread region and a read cursor
//! - Extract fixed-width big-endian fields without copying the remainder
//!
//! # Design Decisions
//! - Backed by `BytesMut`; advancing the cursor is O(1) and never moves
//!   unread bytes
//! - `fill` drains the socket until it would block, since the reactor only
//!   reports a readiness edge once; `fill_up_to` bounds one pass so the
//!   caller can consume between passes
//! - End-of-stream seen after data is remembered, so the caller can finish
//!   processing buffered bytes before closing

use std::io::{self, Read};

use bytes::{Buf, Bytes, BytesMut};

/// Default number of bytes reserved per socket read.
const READ_CHUNK: usize = 4096;

/// Outcome of a [`ByteBuffer::fill`] call.
#[derive(Debug)]
pub enum FillStatus {
    /// This many new bytes were appended.
    Data(usize),
    /// Nothing was available right now.
    WouldBlock,
    /// The peer closed the stream and no new bytes arrived.
    Closed,
    /// A read error the connection cannot recover from.
    Failed(io::Error),
}

/// Receive buffer with a read cursor.
#[derive(Debug)]
pub struct ByteBuffer {
    inner: BytesMut,
    chunk: usize,
    eof: bool,
}

impl ByteBuffer {
    /// Create a buffer with the given initial capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: BytesMut::with_capacity(capacity),
            chunk: capacity.max(READ_CHUNK),
            eof: false,
        }
    }

    /// Append as many bytes as `src` can currently supply.
    pub fn fill<R: Read + ?Sized>(&mut self, src: &mut R) -> FillStatus {
        self.fill_up_to(src, usize::MAX)
    }

    /// Like [`ByteBuffer::fill`], but stop once `budget` bytes have arrived.
    ///
    /// `Data(budget)` means the socket may still hold more.
    pub fn fill_up_to<R: Read + ?Sized>(&mut self, src: &mut R, budget: usize) -> FillStatus {
        let mut total = 0;

        while total < budget {
            let start = self.inner.len();
            self.inner.resize(start + self.chunk.min(budget - total), 0);

            match src.read(&mut self.inner[start..]) {
                Ok(0) => {
                    self.inner.truncate(start);
                    self.eof = true;
                    break;
                }
                Ok(n) => {
                    self.inner.truncate(start + n);
                    total += n;
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {
                    self.inner.truncate(start);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.inner.truncate(start);
                    break;
                }
                Err(e) => {
                    self.inner.truncate(start);
                    if total > 0 {
                        // Hand over what arrived; the error resurfaces on
                        // the next read or as end-of-stream.
                        self.eof = true;
                        break;
                    }
                    return FillStatus::Failed(e);
                }
            }
        }

        match (total, self.eof) {
            (0, true) => FillStatus::Closed,
            (0, false) => FillStatus::WouldBlock,
            (n, _) => FillStatus::Data(n),
        }
    }

    /// Append bytes directly, bypassing the socket.
    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.inner.extend_from_slice(bytes);
    }

    /// Number of unread bytes.
    pub fn read_available(&self) -> usize {
        self.inner.len()
    }

    /// The unread region.
    pub fn as_slice(&self) -> &[u8] {
        &self.inner
    }

    /// Read the next four bytes as a big-endian `u32` without consuming them.
    pub fn peek_u32_be(&self) -> Option<u32> {
        let mut head = self.inner.get(..4)?;
        Some(head.get_u32())
    }

    /// Move the read cursor forward by `n` bytes.
    pub fn advance(&mut self, n: usize) {
        self.inner.advance(n.min(self.inner.len()));
    }

    /// Detach the next `n` unread bytes without copying them.
    pub fn split_to(&mut self, n: usize) -> Bytes {
        self.inner.split_to(n.min(self.inner.len())).freeze()
    }

    /// Whether the peer has closed its side of the stream.
    pub fn at_eof(&self) -> bool {
        self.eof
    }

    /// Shrink oversized storage once every byte has been consumed.
    ///
    /// Only called between logical messages.
    pub fn compact(&mut self) {
        if self.inner.is_empty() && self.inner.capacity() > self.chunk * 16 {
            self.inner = BytesMut::with_capacity(self.chunk);
        }
    }
}

impl Default for ByteBuffer {
    fn default() -> Self {
        Self::with_capacity(READ_CHUNK)
    }
}
