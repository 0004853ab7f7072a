//! HTTP/1.1 side of the gateway.
//!
//! # Data Flow
//! ```text
//! client bytes
//!     → parser.rs (incremental head + body framing)
//!     → client.rs (header assembly, 100-continue, Request per message)
//!     → [gateway forwards Request to the broker]
//!     …
//! broker reply
//!     → response.rs (status line, headers, Content-Length, body)
//!     → client socket
//! ```

pub mod client;
pub mod parser;
pub mod request;
pub mod response;

pub use client::ClientProtocol;
pub use parser::{ParseError, ParserLimits};
pub use request::{Header, HeaderKey, Method, Request, StandardHeader, StandardMethod, Version};
pub use response::Response;
