//! Reply model and its literal HTTP/1.1 rendering.
//!
//! # Responsibilities
//! - Carry a broker reply back to the originating connection
//! - Render status line, echoed headers, computed Content-Length, body
//!
//! # Design Decisions
//! - Reply headers are echoed verbatim; the gateway owns Content-Length
//!   and drops any copy the backend supplied so the framing stays correct

use bytes::{BufMut, Bytes, BytesMut};

/// Interim response sent when a client asks for `Expect: 100-continue`.
pub const CONTINUE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

/// A reply addressed to a client connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Id of the connection that must receive this reply.
    pub stream_id: u64,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Response {
    pub fn new(stream_id: u64, status: u16) -> Self {
        Self {
            stream_id,
            status,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Canonical reason phrase for the status code.
    pub fn reason(&self) -> &'static str {
        http::StatusCode::from_u16(self.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Unknown")
    }

    /// Render the reply exactly as it goes on the wire.
    pub fn to_http_bytes(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(64 + self.body.len());
        out.put_slice(format!("HTTP/1.1 {} {}\r\n", self.status, self.reason()).as_bytes());

        for (name, value) in &self.headers {
            if name.eq_ignore_ascii_case("content-length") {
                continue;
            }
            out.put_slice(name.as_bytes());
            out.put_slice(b": ");
            out.put_slice(value.as_bytes());
            out.put_slice(b"\r\n");
        }

        out.put_slice(format!("Content-Length: {}\r\n\r\n", self.body.len()).as_bytes());
        out.put_slice(&self.body);
        out.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_status_length_and_body() {
        let rsp = Response::new(7, 200).with_body("ok");
        assert_eq!(
            &rsp.to_http_bytes()[..],
            b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok"
        );
    }

    #[test]
    fn echoes_headers_in_order() {
        let rsp = Response::new(1, 404)
            .with_header("Content-Type", "text/plain")
            .with_header("X-Id", "a")
            .with_header("X-Id", "b");
        let text = String::from_utf8(rsp.to_http_bytes().to_vec()).unwrap();
        assert_eq!(
            text,
            "HTTP/1.1 404 Not Found\r\nContent-Type: text/plain\r\nX-Id: a\r\nX-Id: b\r\nContent-Length: 0\r\n\r\n"
        );
    }

    #[test]
    fn backend_content_length_is_replaced() {
        let rsp = Response::new(1, 200)
            .with_header("content-length", "999")
            .with_body("abc");
        let text = String::from_utf8(rsp.to_http_bytes().to_vec()).unwrap();
        assert!(!text.contains("999"));
        assert!(text.ends_with("Content-Length: 3\r\n\r\nabc"));
    }

    #[test]
    fn unknown_status_has_fallback_reason() {
        assert_eq!(Response::new(1, 599).reason(), "Unknown");
        assert_eq!(Response::new(1, 503).reason(), "Service Unavailable");
    }
}
