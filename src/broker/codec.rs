//! Length-prefixed framing for the broker link.
//!
//! A frame is a 4-byte big-endian length `N` followed by exactly `N` payload
//! bytes. Encoding lives in
//! [`WriteQueue::enqueue_framed`](crate::net::write_queue::WriteQueue::enqueue_framed);
//! this module only decodes.

use bytes::Bytes;

use crate::error::ProtocolError;
use crate::net::buffer::ByteBuffer;

/// Size of the length prefix.
pub const LENGTH_PREFIX: usize = 4;

/// Default ceiling on a single frame's payload.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameState {
    AwaitingLength,
    AwaitingPayload { len: usize },
}

/// Resumable frame decoder.
///
/// The state survives between wakeups, so a length prefix that has been
/// consumed is never read twice while its payload trickles in.
#[derive(Debug)]
pub struct FrameDecoder {
    state: FrameState,
    max_frame_bytes: usize,
}

impl FrameDecoder {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            state: FrameState::AwaitingLength,
            max_frame_bytes,
        }
    }

    /// Take the next complete payload out of `buffer`.
    ///
    /// Returns `Ok(None)` when the buffer holds only part of a frame; the
    /// partial bytes stay buffered.
    pub fn decode(&mut self, buffer: &mut ByteBuffer) -> Result<Option<Bytes>, ProtocolError> {
        loop {
            match self.state {
                FrameState::AwaitingLength => {
                    let Some(len) = buffer.peek_u32_be() else {
                        return Ok(None);
                    };
                    let len = len as usize;
                    if len > self.max_frame_bytes {
                        return Err(ProtocolError::FrameTooLarge {
                            len,
                            limit: self.max_frame_bytes,
                        });
                    }
                    buffer.advance(LENGTH_PREFIX);
                    self.state = FrameState::AwaitingPayload { len };
                }
                FrameState::AwaitingPayload { len } => {
                    if buffer.read_available() < len {
                        return Ok(None);
                    }
                    self.state = FrameState::AwaitingLength;
                    return Ok(Some(buffer.split_to(len)));
                }
            }
        }
    }

    /// Whether the decoder sits on a frame boundary.
    pub fn is_idle(&self) -> bool {
        self.state == FrameState::AwaitingLength
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}
