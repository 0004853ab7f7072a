//! Broker-facing protocol role.
//!
//! # Responsibilities
//! - Cut the byte stream into length-prefixed frames
//! - Decode each frame as an [`Envelope`] carrying a [`WireResponse`]
//! - Hand every reply upward in frame order, draining all complete frames
//!   buffered by one read before yielding
//! - Close the link on a frame that is not an envelope; drop, log and count
//!   a reply whose inner payload is unusable

use crate::broker::codec::FrameDecoder;
use crate::broker::wire::{Envelope, WireResponse};
use crate::error::ProtocolError;
use crate::http::response::Response;
use crate::net::connection::{Inbound, Protocol, ProtocolContext, Role};
use crate::observability::metrics;
use prost::Message;

/// Protocol role for the single link to the broker.
#[derive(Debug)]
pub struct BrokerProtocol {
    decoder: FrameDecoder,
}

impl BrokerProtocol {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            decoder: FrameDecoder::new(max_frame_bytes),
        }
    }
}

/// Open a reply envelope.
///
/// Failures here spoil only this reply; the frame boundaries around it are
/// still intact.
fn open_reply(envelope: &Envelope) -> Result<Response, ProtocolError> {
    let wire: WireResponse = envelope.open()?;
    Ok(Response::try_from(wire)?)
}

impl Protocol for BrokerProtocol {
    fn role(&self) -> Role {
        Role::BrokerLink
    }

    fn on_data(&mut self, ctx: &mut ProtocolContext<'_>) -> Result<(), ProtocolError> {
        while let Some(frame) = self.decoder.decode(ctx.buffer)? {
            let len = frame.len();
            let envelope = Envelope::decode(frame)?;
            let reply = match open_reply(&envelope) {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::warn!(connection_id = %ctx.id, bytes = len, error = %e, "Malformed broker reply, dropping");
                    metrics::record_dropped_reply();
                    continue;
                }
            };

            tracing::trace!(
                connection_id = %ctx.id,
                stream_id = reply.stream_id,
                status = reply.status,
                bytes = len,
                "Broker frame decoded"
            );
            metrics::record_frame_decoded();
            ctx.inbound.push(Inbound::Response(reply));
        }
        Ok(())
    }
}
