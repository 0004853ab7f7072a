//! Request model handed from the HTTP side to the broker side.
//!
//! # Design Decisions
//! - Methods and header names are tagged sums: a small standard set, or
//!   the literal token the client sent
//! - Headers stay an ordered list; duplicates are separate entries

use std::fmt;

use bytes::Bytes;

/// Methods with a compact wire tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardMethod {
    Delete,
    Get,
    Head,
    Post,
    Put,
}

impl StandardMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            StandardMethod::Delete => "DELETE",
            StandardMethod::Get => "GET",
            StandardMethod::Head => "HEAD",
            StandardMethod::Post => "POST",
            StandardMethod::Put => "PUT",
        }
    }
}

/// Request method: standard tag or the literal verb.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Standard(StandardMethod),
    Custom(String),
}

impl Method {
    /// Map a request-line verb. Verbs are case-sensitive per RFC 9110.
    pub fn from_token(token: &str) -> Self {
        let standard = match token {
            "DELETE" => StandardMethod::Delete,
            "GET" => StandardMethod::Get,
            "HEAD" => StandardMethod::Head,
            "POST" => StandardMethod::Post,
            "PUT" => StandardMethod::Put,
            other => return Method::Custom(other.to_string()),
        };
        Method::Standard(standard)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::Standard(m) => m.as_str(),
            Method::Custom(verb) => verb,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Header names with a compact wire tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardHeader {
    Host,
    Accept,
    UserAgent,
}

impl StandardHeader {
    pub fn as_str(&self) -> &'static str {
        match self {
            StandardHeader::Host => "Host",
            StandardHeader::Accept => "Accept",
            StandardHeader::UserAgent => "User-Agent",
        }
    }
}

/// Header name: standard tag or the literal name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HeaderKey {
    Standard(StandardHeader),
    Custom(String),
}

impl HeaderKey {
    /// Recognize the standard names case-insensitively.
    pub fn from_name(name: &str) -> Self {
        let standard = if name.eq_ignore_ascii_case("host") {
            StandardHeader::Host
        } else if name.eq_ignore_ascii_case("accept") {
            StandardHeader::Accept
        } else if name.eq_ignore_ascii_case("user-agent") {
            StandardHeader::UserAgent
        } else {
            return HeaderKey::Custom(name.to_string());
        };
        HeaderKey::Standard(standard)
    }

    pub fn as_str(&self) -> &str {
        match self {
            HeaderKey::Standard(h) => h.as_str(),
            HeaderKey::Custom(name) => name,
        }
    }
}

/// One header line as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub key: HeaderKey,
    pub value: String,
}

impl Header {
    pub fn new(name: &str, value: impl Into<String>) -> Self {
        Self {
            key: HeaderKey::from_name(name),
            value: value.into(),
        }
    }
}

/// HTTP protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
}

impl Version {
    pub const HTTP_10: Version = Version { major: 1, minor: 0 };
    pub const HTTP_11: Version = Version { major: 1, minor: 1 };
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// A fully parsed client request.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Id of the connection the request arrived on.
    pub stream_id: u64,
    pub method: Method,
    pub url: String,
    pub version: Version,
    pub headers: Vec<Header>,
    /// `None` when the request carried no body bytes at all.
    pub body: Option<Bytes>,
}

impl Request {
    /// First header whose name matches `name` case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.key.as_str().eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}
