//! Incremental HTTP/1.1 request parser.
//!
//! The parser is fed whatever bytes are buffered, consumes as much as forms
//! complete syntax, and reports progress through [`ParserEvents`]. Anything
//! it does not consume must be offered again, with more bytes appended, on
//! the next call. No state lives on the stack between calls.
//!
//! # Data Flow
//! ```text
//! buffered bytes
//!     → head (request line + headers, via httparse)
//!         → message-begin, url, header-field/value…, headers-complete
//!     → body framing: none | Content-Length | chunked
//!         → body fragment…
//!     → message-complete
//!     → back to head (keep-alive / pipelining)
//! ```

use crate::http::request::{Method, Version};

/// Limits applied while parsing.
#[derive(Debug, Clone, Copy)]
pub struct ParserLimits {
    /// Largest request line plus header block.
    pub max_head_bytes: usize,
    /// Most header lines in one request.
    pub max_headers: usize,
    /// Largest body, whether length-delimited or chunked.
    pub max_body_bytes: u64,
}

impl Default for ParserLimits {
    fn default() -> Self {
        Self {
            max_head_bytes: 64 * 1024,
            max_headers: 64,
            max_body_bytes: 8 * 1024 * 1024,
        }
    }
}

/// Longest chunk-size or trailer line accepted.
const MAX_LINE_BYTES: usize = 4096;

/// Errors that abort the connection being parsed.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid request head: {0}")]
    Head(httparse::Error),
    #[error("request head exceeds {0} bytes")]
    HeadTooLarge(usize),
    #[error("invalid Content-Length")]
    InvalidContentLength,
    #[error("unsupported Transfer-Encoding")]
    UnsupportedTransferEncoding,
    #[error("invalid chunk size line")]
    InvalidChunkSize,
    #[error("chunk data not followed by CRLF")]
    InvalidChunkTerminator,
    #[error("chunk trailer line exceeds {0} bytes")]
    TrailerTooLarge(usize),
    #[error("request body exceeds {0} bytes")]
    BodyTooLarge(u64),
}

/// Method and version of the message currently being parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHead {
    pub method: Method,
    pub version: Version,
}

/// Callbacks fired as the parser makes progress.
///
/// Implementors carry whatever per-connection context they need; the parser
/// never reaches for it on its own.
pub trait ParserEvents {
    fn on_message_begin(&mut self);
    fn on_url(&mut self, fragment: &str);
    fn on_header_field(&mut self, fragment: &str);
    fn on_header_value(&mut self, fragment: &str);
    fn on_headers_complete(&mut self, head: &MessageHead);
    fn on_body(&mut self, fragment: &[u8]);
    fn on_message_complete(&mut self, head: &MessageHead);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Head,
    Body { remaining: u64 },
    ChunkSize,
    ChunkData { remaining: u64 },
    ChunkDataEnd,
    Trailers,
}

/// How the body of the current message is delimited.
enum Framing {
    Empty,
    Length(u64),
    Chunked,
}

/// Resumable request parser.
#[derive(Debug)]
pub struct HttpParser {
    state: State,
    head: MessageHead,
    body_bytes: u64,
    limits: ParserLimits,
}

impl HttpParser {
    pub fn new(limits: ParserLimits) -> Self {
        Self {
            state: State::Head,
            head: MessageHead {
                method: Method::from_token("GET"),
                version: Version::HTTP_11,
            },
            body_bytes: 0,
            limits,
        }
    }

    /// Whether the parser sits between messages.
    pub fn is_idle(&self) -> bool {
        self.state == State::Head
    }

    /// Parse as much of `data` as possible; returns the bytes consumed.
    pub fn execute<E: ParserEvents>(&mut self, data: &[u8], events: &mut E) -> Result<usize, ParseError> {
        let mut pos = 0;

        loop {
            let rest = &data[pos..];
            let step = match self.state {
                State::Head => self.parse_head(rest, events)?,
                State::Body { remaining } => {
                    let n = self.body_fragment(rest, remaining, events);
                    if remaining == n as u64 {
                        self.complete(events);
                    } else {
                        self.state = State::Body { remaining: remaining - n as u64 };
                    }
                    n
                }
                State::ChunkSize => self.parse_chunk_size(rest)?,
                State::ChunkData { remaining } => {
                    let n = self.body_fragment(rest, remaining, events);
                    self.state = if remaining == n as u64 {
                        State::ChunkDataEnd
                    } else {
                        State::ChunkData { remaining: remaining - n as u64 }
                    };
                    n
                }
                State::ChunkDataEnd => match rest {
                    [b'\r', b'\n', ..] => {
                        self.state = State::ChunkSize;
                        2
                    }
                    [] | [b'\r'] => 0,
                    _ => return Err(ParseError::InvalidChunkTerminator),
                },
                State::Trailers => self.skip_trailer(rest, events)?,
            };

            // Every state consumes whenever it can, so zero means the
            // remaining bytes are an incomplete unit.
            if step == 0 {
                break;
            }
            pos += step;
        }

        Ok(pos)
    }

    fn parse_head<E: ParserEvents>(&mut self, data: &[u8], events: &mut E) -> Result<usize, ParseError> {
        if data.is_empty() {
            return Ok(0);
        }

        let mut headers = vec![httparse::EMPTY_HEADER; self.limits.max_headers];
        let mut req = httparse::Request::new(&mut headers);

        let consumed = match req.parse(data) {
            Ok(httparse::Status::Complete(n)) => n,
            Ok(httparse::Status::Partial) => {
                if data.len() > self.limits.max_head_bytes {
                    return Err(ParseError::HeadTooLarge(self.limits.max_head_bytes));
                }
                return Ok(0);
            }
            Err(e) => return Err(ParseError::Head(e)),
        };
        if consumed > self.limits.max_head_bytes {
            return Err(ParseError::HeadTooLarge(self.limits.max_head_bytes));
        }

        events.on_message_begin();
        events.on_url(req.path.unwrap_or_default());

        let mut framing = Framing::Empty;
        for header in req.headers.iter() {
            let value = String::from_utf8_lossy(header.value);
            events.on_header_field(header.name);
            events.on_header_value(&value);

            if header.name.eq_ignore_ascii_case("transfer-encoding") {
                framing = transfer_encoding(&value)?;
            } else if header.name.eq_ignore_ascii_case("content-length")
                && !matches!(framing, Framing::Chunked)
            {
                let len = value
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| ParseError::InvalidContentLength)?;
                if let Framing::Length(prev) = framing {
                    if prev != len {
                        return Err(ParseError::InvalidContentLength);
                    }
                }
                framing = Framing::Length(len);
            }
        }

        self.head = MessageHead {
            method: Method::from_token(req.method.unwrap_or_default()),
            version: Version {
                major: 1,
                minor: u32::from(req.version.unwrap_or(1)),
            },
        };
        self.body_bytes = 0;

        // Rejected before headers-complete so no interim 100 goes out for
        // a body that would be refused anyway.
        if let Framing::Length(len) = framing {
            if len > self.limits.max_body_bytes {
                return Err(ParseError::BodyTooLarge(self.limits.max_body_bytes));
            }
        }
        events.on_headers_complete(&self.head);

        match framing {
            Framing::Empty | Framing::Length(0) => self.complete(events),
            Framing::Length(len) => self.state = State::Body { remaining: len },
            Framing::Chunked => self.state = State::ChunkSize,
        }

        Ok(consumed)
    }

    fn body_fragment<E: ParserEvents>(&mut self, data: &[u8], remaining: u64, events: &mut E) -> usize {
        let n = (data.len() as u64).min(remaining) as usize;
        if n > 0 {
            events.on_body(&data[..n]);
            self.body_bytes += n as u64;
        }
        n
    }

    fn parse_chunk_size(&mut self, data: &[u8]) -> Result<usize, ParseError> {
        match httparse::parse_chunk_size(data) {
            Ok(httparse::Status::Complete((consumed, size))) => {
                if self.body_bytes.saturating_add(size) > self.limits.max_body_bytes {
                    return Err(ParseError::BodyTooLarge(self.limits.max_body_bytes));
                }
                self.state = if size == 0 {
                    State::Trailers
                } else {
                    State::ChunkData { remaining: size }
                };
                Ok(consumed)
            }
            Ok(httparse::Status::Partial) if data.len() <= MAX_LINE_BYTES => Ok(0),
            Ok(httparse::Status::Partial) | Err(_) => Err(ParseError::InvalidChunkSize),
        }
    }

    fn skip_trailer<E: ParserEvents>(&mut self, data: &[u8], events: &mut E) -> Result<usize, ParseError> {
        match data.windows(2).position(|w| w == b"\r\n") {
            Some(0) => {
                self.complete(events);
                Ok(2)
            }
            Some(end) => Ok(end + 2),
            None if data.len() > MAX_LINE_BYTES => Err(ParseError::TrailerTooLarge(MAX_LINE_BYTES)),
            None => Ok(0),
        }
    }

    fn complete<E: ParserEvents>(&mut self, events: &mut E) {
        events.on_message_complete(&self.head);
        self.state = State::Head;
        self.body_bytes = 0;
    }
}

fn transfer_encoding(value: &str) -> Result<Framing, ParseError> {
    let last = value.rsplit(',').next().unwrap_or_default().trim();
    if last.eq_ignore_ascii_case("chunked") {
        Ok(Framing::Chunked)
    } else if last.eq_ignore_ascii_case("identity") {
        Ok(Framing::Empty)
    } else {
        Err(ParseError::UnsupportedTransferEncoding)
    }
}
