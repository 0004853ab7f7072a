//! Property tests over the resumable I/O and parsing layers.

use std::io::{self, Write};

use harq_gateway::broker::wire::{Envelope, WireResponse};
use harq_gateway::broker::BrokerProtocol;
use harq_gateway::http::{ClientProtocol, ParserLimits, Response};
use harq_gateway::net::connection::{ConnectionId, Inbound, Protocol, ProtocolContext};
use harq_gateway::net::{ByteBuffer, WriteQueue, WriteStatus};
use proptest::prelude::*;

/// Accepts at most `limit` bytes per call and refuses every third call.
struct ShortWriter {
    limit: usize,
    calls: usize,
    written: Vec<u8>,
}

impl Write for ShortWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.calls += 1;
        if self.calls % 3 == 0 {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        if self.calls % 5 == 0 {
            return Err(io::ErrorKind::Interrupted.into());
        }
        let n = buf.len().min(self.limit);
        self.written.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `role` over `input` delivered in the given pieces.
fn feed(role: &mut dyn Protocol, pieces: &[&[u8]]) -> Vec<Inbound> {
    let mut buffer = ByteBuffer::default();
    let mut writes = WriteQueue::new();
    let mut socket: Vec<u8> = Vec::new();
    let mut inbound = Vec::new();

    for piece in pieces {
        buffer.extend_from_slice(piece);
        let mut ctx = ProtocolContext::new(
            ConnectionId::from_raw(7),
            &mut buffer,
            &mut writes,
            &mut socket,
            &mut inbound,
        );
        role.on_data(&mut ctx).unwrap();
    }
    inbound
}

fn split_at_points<'a>(input: &'a [u8], points: &[usize]) -> Vec<&'a [u8]> {
    let mut cuts: Vec<usize> = points.iter().map(|p| p % (input.len() + 1)).collect();
    cuts.sort_unstable();
    cuts.dedup();

    let mut pieces = Vec::new();
    let mut start = 0;
    for cut in cuts {
        pieces.push(&input[start..cut]);
        start = cut;
    }
    pieces.push(&input[start..]);
    pieces
}

const PIPELINE: &[u8] = b"POST /a HTTP/1.1\r\nHost: h\r\nContent-Length: 3\r\n\r\nxyz\
GET /b?q=1 HTTP/1.1\r\nAccept: */*\r\nUser-Agent: p\r\n\r\n\
PUT /c HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n2\r\nab\r\n1;ext=1\r\nc\r\n0\r\nT: v\r\n\r\n";

proptest! {
    #[test]
    fn short_writes_deliver_every_byte_once(
        chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 1..16),
        limit in 1usize..17,
    ) {
        let mut queue = WriteQueue::new();
        let mut expected = Vec::new();
        for chunk in &chunks {
            queue.enqueue(chunk.clone());
            expected.extend_from_slice(chunk);
        }

        let mut writer = ShortWriter { limit, calls: 0, written: Vec::new() };
        let mut rounds = 0;
        loop {
            match queue.flush(&mut writer) {
                WriteStatus::Drained => break,
                WriteStatus::WouldBlock => rounds += 1,
                WriteStatus::Failed(e) => panic!("unexpected failure: {e}"),
            }
            prop_assert!(rounds < 10_000);
        }

        prop_assert!(queue.is_empty());
        prop_assert_eq!(writer.written, expected);
    }

    #[test]
    fn http_parsing_ignores_read_boundaries(points in prop::collection::vec(any::<usize>(), 0..12)) {
        let whole = feed(&mut ClientProtocol::new(ParserLimits::default()), &[PIPELINE]);
        prop_assert_eq!(whole.len(), 3);

        let pieces = split_at_points(PIPELINE, &points);
        let split = feed(&mut ClientProtocol::new(ParserLimits::default()), &pieces);
        prop_assert_eq!(split, whole);
    }

    #[test]
    fn broker_frames_ignore_read_boundaries(
        statuses in prop::collection::vec(100u16..600, 1..8),
        points in prop::collection::vec(any::<usize>(), 0..12),
    ) {
        let mut stream = Vec::new();
        for (i, status) in statuses.iter().enumerate() {
            let rsp = Response::new(i as u64, *status).with_body(vec![b'x'; i]);
            let payload = Envelope::seal("/harq-http-reply", &WireResponse::from(&rsp)).to_bytes();
            stream.extend_from_slice(&(payload.len() as u32).to_be_bytes());
            stream.extend_from_slice(&payload);
        }

        let pieces = split_at_points(&stream, &points);
        let inbound = feed(&mut BrokerProtocol::new(1 << 20), &pieces);

        let got: Vec<(u64, u16)> = inbound
            .into_iter()
            .map(|i| match i {
                Inbound::Response(r) => (r.stream_id, r.status),
                Inbound::Request(_) => panic!("broker link produced a request"),
            })
            .collect();
        let want: Vec<(u64, u16)> = statuses.iter().enumerate().map(|(i, s)| (i as u64, *s)).collect();
        prop_assert_eq!(got, want);
    }
}
