//! HTTP-facing protocol role.
//!
//! # Responsibilities
//! - Drive the incremental parser over each connection's buffered bytes
//! - Assemble header lines from arbitrarily fragmented field/value events
//! - Answer `Expect: 100-continue` as soon as the headers are complete
//! - Hand every finished request, tagged with its connection id, upward

use bytes::BytesMut;

use crate::error::ProtocolError;
use crate::http::parser::{HttpParser, MessageHead, ParserEvents, ParserLimits};
use crate::http::request::{Header, HeaderKey, Request};
use crate::http::response::CONTINUE;
use crate::net::connection::{ConnectionId, Inbound, Output, Protocol, ProtocolContext, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum HeaderPhase {
    #[default]
    None,
    Field,
    Value,
}

/// Builds header lines out of field and value fragments.
///
/// A pending pair is committed only when the parser leaves the value
/// phase, either by starting a new field or by finishing the headers.
#[derive(Debug, Default)]
pub struct HeaderAccumulator {
    phase: HeaderPhase,
    field: String,
    value: String,
    expect_continue: bool,
}

impl HeaderAccumulator {
    pub fn reset(&mut self) {
        self.phase = HeaderPhase::None;
        self.field.clear();
        self.value.clear();
        self.expect_continue = false;
    }

    pub fn on_field(&mut self, fragment: &str, headers: &mut Vec<Header>) {
        if self.phase == HeaderPhase::Value {
            self.commit(headers);
        }
        self.field.push_str(fragment);
        self.phase = HeaderPhase::Field;
    }

    pub fn on_value(&mut self, fragment: &str) {
        self.value.push_str(fragment);
        self.phase = HeaderPhase::Value;
    }

    /// Commit the last pending pair at end-of-headers.
    pub fn finish(&mut self, headers: &mut Vec<Header>) {
        if self.phase == HeaderPhase::Value {
            self.commit(headers);
        }
        self.phase = HeaderPhase::None;
    }

    /// Whether any committed header asked for a 100-continue.
    pub fn expects_continue(&self) -> bool {
        self.expect_continue
    }

    fn commit(&mut self, headers: &mut Vec<Header>) {
        if self.field.eq_ignore_ascii_case("expect") && self.value.eq_ignore_ascii_case("100-continue") {
            self.expect_continue = true;
        }
        headers.push(Header {
            key: HeaderKey::from_name(&self.field),
            value: std::mem::take(&mut self.value),
        });
        self.field.clear();
    }
}

/// Per-message state; reset at every message-begin.
#[derive(Debug, Default)]
struct MessageState {
    url: String,
    headers: Vec<Header>,
    accumulator: HeaderAccumulator,
    body: Option<BytesMut>,
}

/// Parser callbacks bound to one connection for the duration of a call.
struct RequestEvents<'a, 'b> {
    id: ConnectionId,
    message: &'a mut MessageState,
    output: &'a mut Output<'b>,
    inbound: &'a mut Vec<Inbound>,
}

impl ParserEvents for RequestEvents<'_, '_> {
    fn on_message_begin(&mut self) {
        self.message.url.clear();
        self.message.headers.clear();
        self.message.accumulator.reset();
        self.message.body = None;
    }

    fn on_url(&mut self, fragment: &str) {
        self.message.url.push_str(fragment);
    }

    fn on_header_field(&mut self, fragment: &str) {
        self.message.accumulator.on_field(fragment, &mut self.message.headers);
    }

    fn on_header_value(&mut self, fragment: &str) {
        self.message.accumulator.on_value(fragment);
    }

    fn on_headers_complete(&mut self, _head: &MessageHead) {
        self.message.accumulator.finish(&mut self.message.headers);

        if self.message.accumulator.expects_continue() {
            tracing::debug!(connection_id = %self.id, "Sending 100 Continue");
            self.output.send_now(CONTINUE);
        }
    }

    fn on_body(&mut self, fragment: &[u8]) {
        self.message
            .body
            .get_or_insert_with(BytesMut::new)
            .extend_from_slice(fragment);
    }

    fn on_message_complete(&mut self, head: &MessageHead) {
        let request = Request {
            stream_id: self.id.as_u64(),
            method: head.method.clone(),
            url: std::mem::take(&mut self.message.url),
            version: head.version,
            headers: std::mem::take(&mut self.message.headers),
            body: self.message.body.take().map(BytesMut::freeze),
        };

        tracing::debug!(
            connection_id = %self.id,
            method = %request.method,
            url = %request.url,
            "Request parsed"
        );
        self.inbound.push(Inbound::Request(request));
    }
}

/// Protocol role for client-facing HTTP/1.1 connections.
#[derive(Debug)]
pub struct ClientProtocol {
    parser: HttpParser,
    message: MessageState,
}

impl ClientProtocol {
    pub fn new(limits: ParserLimits) -> Self {
        Self {
            parser: HttpParser::new(limits),
            message: MessageState::default(),
        }
    }
}

impl Protocol for ClientProtocol {
    fn role(&self) -> Role {
        Role::ClientHttp
    }

    fn on_data(&mut self, ctx: &mut ProtocolContext<'_>) -> Result<(), ProtocolError> {
        let mut events = RequestEvents {
            id: ctx.id,
            message: &mut self.message,
            output: &mut ctx.output,
            inbound: &mut *ctx.inbound,
        };

        let consumed = self.parser.execute(ctx.buffer.as_slice(), &mut events)?;
        ctx.buffer.advance(consumed);
        Ok(())
    }
}
