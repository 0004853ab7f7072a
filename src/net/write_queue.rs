//! Outbound byte queue with partial-write resumption.
//!
//! Chunks are flushed strictly in FIFO order. A short write leaves the
//! unsent tail of the front chunk in place, so the next flush resumes from
//! exactly where the socket stopped accepting bytes.

use std::collections::VecDeque;
use std::io::{self, Write};

use bytes::{Buf, Bytes};

use crate::error::ProtocolError;

/// Outcome of a [`WriteQueue::flush`] call.
#[derive(Debug)]
pub enum WriteStatus {
    /// Every queued byte reached the socket.
    Drained,
    /// The socket stopped accepting bytes; arm write interest and retry.
    WouldBlock,
    /// The socket is no longer usable.
    Failed(io::Error),
}

/// Ordered list of pending outbound chunks.
#[derive(Debug, Default)]
pub struct WriteQueue {
    chunks: VecDeque<Bytes>,
    pending: usize,
}

impl WriteQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk behind everything already queued.
    pub fn enqueue(&mut self, bytes: impl Into<Bytes>) {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return;
        }
        self.pending += bytes.len();
        self.chunks.push_back(bytes);
    }

    /// Queue `payload` behind a 4-byte big-endian length prefix.
    ///
    /// The prefix and the payload stay two separate chunks. Nothing is
    /// queued if the length does not fit the prefix.
    pub fn enqueue_framed(&mut self, payload: impl Into<Bytes>) -> Result<(), ProtocolError> {
        let payload = payload.into();
        let prefix = length_prefix(payload.len())?;
        self.pending += prefix.len();
        self.chunks.push_back(Bytes::copy_from_slice(&prefix));
        self.enqueue(payload);
        Ok(())
    }

    /// Write as much as `dst` accepts, oldest chunk first.
    pub fn flush<W: Write + ?Sized>(&mut self, dst: &mut W) -> WriteStatus {
        while let Some(front) = self.chunks.front_mut() {
            match dst.write(&front[..]) {
                Ok(0) => {
                    return WriteStatus::Failed(io::ErrorKind::WriteZero.into());
                }
                Ok(n) => {
                    front.advance(n);
                    self.pending -= n;
                    if front.is_empty() {
                        self.chunks.pop_front();
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return WriteStatus::WouldBlock;
                }
                Err(e) => return WriteStatus::Failed(e),
            }
        }

        WriteStatus::Drained
    }

    /// Total unsent bytes across all chunks.
    pub fn pending_bytes(&self) -> usize {
        self.pending
    }

    /// Number of chunks still holding unsent bytes.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Discard everything still queued.
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.pending = 0;
    }
}

/// Big-endian length prefix for a payload of `len` bytes.
pub fn length_prefix(len: usize) -> Result<[u8; 4], ProtocolError> {
    u32::try_from(len)
        .map(u32::to_be_bytes)
        .map_err(|_| ProtocolError::FrameTooLarge {
            len,
            limit: u32::MAX as usize,
        })
}
