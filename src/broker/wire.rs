//! Broker wire messages with prost serialization.
//!
//! Every frame on the broker link carries one [`Envelope`]. Its payload is
//! itself a prost message whose type depends on direction: [`WireRequest`]
//! and [`WireAction`] travel to the broker, [`WireResponse`] comes back.

use bytes::Bytes;
use prost::Message;

use crate::http::request::{Header, HeaderKey, Method, Request, StandardHeader, StandardMethod, Version};
use crate::http::response::Response;

/// Errors converting a decoded wire message into a domain value.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WireError {
    #[error("unknown {field} tag {value}")]
    UnknownTag { field: &'static str, value: i32 },
    #[error("{0} carries neither a tag nor a literal")]
    MissingName(&'static str),
    #[error("status {0} is outside the HTTP range")]
    StatusOutOfRange(u32),
}

// ============ Envelope ============

/// Destination name plus an opaque serialized payload.
#[derive(Clone, PartialEq, Message)]
pub struct Envelope {
    #[prost(string, tag = "1")]
    pub destination: String,
    #[prost(bytes = "bytes", tag = "2")]
    pub payload: Bytes,
}

impl Envelope {
    /// Wrap an already-encodable message.
    pub fn seal<M: Message>(destination: impl Into<String>, message: &M) -> Self {
        Self {
            destination: destination.into(),
            payload: Bytes::from(message.encode_to_vec()),
        }
    }

    /// Serialized envelope, ready to be length-prefixed.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.encode_to_vec())
    }

    /// Decode the payload as `M`.
    pub fn open<M: Message + Default>(&self) -> Result<M, prost::DecodeError> {
        M::decode(self.payload.clone())
    }
}

// ============ Requests ============

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum WireMethod {
    Delete = 0,
    Get = 1,
    Head = 2,
    Post = 3,
    Put = 4,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum WireHeaderKey {
    Host = 0,
    Accept = 1,
    UserAgent = 2,
}

/// A request header: compact tag when standard, literal name otherwise.
#[derive(Clone, PartialEq, Message)]
pub struct WireHeader {
    #[prost(enumeration = "WireHeaderKey", optional, tag = "1")]
    pub key: Option<i32>,
    #[prost(string, optional, tag = "2")]
    pub custom_key: Option<String>,
    #[prost(string, tag = "3")]
    pub value: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct WireRequest {
    #[prost(uint64, tag = "1")]
    pub stream_id: u64,
    #[prost(enumeration = "WireMethod", optional, tag = "2")]
    pub method: Option<i32>,
    #[prost(string, optional, tag = "3")]
    pub custom_method: Option<String>,
    #[prost(string, tag = "4")]
    pub url: String,
    #[prost(uint32, tag = "5")]
    pub version_major: u32,
    #[prost(uint32, tag = "6")]
    pub version_minor: u32,
    #[prost(message, repeated, tag = "7")]
    pub headers: Vec<WireHeader>,
    /// Absent when the request had no body bytes.
    #[prost(bytes = "bytes", optional, tag = "8")]
    pub body: Option<Bytes>,
}

impl From<StandardMethod> for WireMethod {
    fn from(method: StandardMethod) -> Self {
        match method {
            StandardMethod::Delete => WireMethod::Delete,
            StandardMethod::Get => WireMethod::Get,
            StandardMethod::Head => WireMethod::Head,
            StandardMethod::Post => WireMethod::Post,
            StandardMethod::Put => WireMethod::Put,
        }
    }
}

impl From<WireMethod> for StandardMethod {
    fn from(method: WireMethod) -> Self {
        match method {
            WireMethod::Delete => StandardMethod::Delete,
            WireMethod::Get => StandardMethod::Get,
            WireMethod::Head => StandardMethod::Head,
            WireMethod::Post => StandardMethod::Post,
            WireMethod::Put => StandardMethod::Put,
        }
    }
}

impl From<StandardHeader> for WireHeaderKey {
    fn from(header: StandardHeader) -> Self {
        match header {
            StandardHeader::Host => WireHeaderKey::Host,
            StandardHeader::Accept => WireHeaderKey::Accept,
            StandardHeader::UserAgent => WireHeaderKey::UserAgent,
        }
    }
}

impl From<WireHeaderKey> for StandardHeader {
    fn from(key: WireHeaderKey) -> Self {
        match key {
            WireHeaderKey::Host => StandardHeader::Host,
            WireHeaderKey::Accept => StandardHeader::Accept,
            WireHeaderKey::UserAgent => StandardHeader::UserAgent,
        }
    }
}

impl From<&Header> for WireHeader {
    fn from(header: &Header) -> Self {
        let (key, custom_key) = match &header.key {
            HeaderKey::Standard(h) => (Some(WireHeaderKey::from(*h) as i32), None),
            HeaderKey::Custom(name) => (None, Some(name.clone())),
        };
        Self {
            key,
            custom_key,
            value: header.value.clone(),
        }
    }
}

impl TryFrom<WireHeader> for Header {
    type Error = WireError;

    fn try_from(wire: WireHeader) -> Result<Self, Self::Error> {
        let key = match (wire.key, wire.custom_key) {
            (Some(tag), _) => {
                let known = WireHeaderKey::try_from(tag).map_err(|_| WireError::UnknownTag {
                    field: "header",
                    value: tag,
                })?;
                HeaderKey::Standard(known.into())
            }
            (None, Some(name)) => HeaderKey::Custom(name),
            (None, None) => return Err(WireError::MissingName("header")),
        };
        Ok(Header { key, value: wire.value })
    }
}

impl From<&Request> for WireRequest {
    fn from(req: &Request) -> Self {
        let (method, custom_method) = match &req.method {
            Method::Standard(m) => (Some(WireMethod::from(*m) as i32), None),
            Method::Custom(verb) => (None, Some(verb.clone())),
        };
        Self {
            stream_id: req.stream_id,
            method,
            custom_method,
            url: req.url.clone(),
            version_major: req.version.major,
            version_minor: req.version.minor,
            headers: req.headers.iter().map(WireHeader::from).collect(),
            body: req.body.clone(),
        }
    }
}

impl TryFrom<WireRequest> for Request {
    type Error = WireError;

    fn try_from(wire: WireRequest) -> Result<Self, Self::Error> {
        let method = match (wire.method, wire.custom_method) {
            (Some(tag), _) => {
                let known = WireMethod::try_from(tag).map_err(|_| WireError::UnknownTag {
                    field: "method",
                    value: tag,
                })?;
                Method::Standard(known.into())
            }
            (None, Some(verb)) => Method::Custom(verb),
            (None, None) => return Err(WireError::MissingName("method")),
        };

        let headers = wire
            .headers
            .into_iter()
            .map(Header::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Request {
            stream_id: wire.stream_id,
            method,
            url: wire.url,
            version: Version {
                major: wire.version_major,
                minor: wire.version_minor,
            },
            headers,
            body: wire.body,
        })
    }
}

// ============ Responses ============

#[derive(Clone, PartialEq, Message)]
pub struct WireResponseHeader {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub value: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct WireResponse {
    #[prost(uint64, tag = "1")]
    pub stream_id: u64,
    #[prost(uint32, tag = "2")]
    pub status: u32,
    #[prost(message, repeated, tag = "3")]
    pub headers: Vec<WireResponseHeader>,
    #[prost(bytes = "bytes", tag = "4")]
    pub body: Bytes,
}

impl From<&Response> for WireResponse {
    fn from(rsp: &Response) -> Self {
        Self {
            stream_id: rsp.stream_id,
            status: u32::from(rsp.status),
            headers: rsp
                .headers
                .iter()
                .map(|(name, value)| WireResponseHeader {
                    name: name.clone(),
                    value: value.clone(),
                })
                .collect(),
            body: rsp.body.clone(),
        }
    }
}

impl TryFrom<WireResponse> for Response {
    type Error = WireError;

    fn try_from(wire: WireResponse) -> Result<Self, Self::Error> {
        let status = u16::try_from(wire.status)
            .ok()
            .filter(|s| (100..1000).contains(s))
            .ok_or(WireError::StatusOutOfRange(wire.status))?;

        Ok(Response {
            stream_id: wire.stream_id,
            status,
            headers: wire.headers.into_iter().map(|h| (h.name, h.value)).collect(),
            body: wire.body,
        })
    }
}

// ============ Actions ============

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum WireActionKind {
    CreateTransientQueue = 0,
    Subscribe = 1,
}

#[derive(Clone, PartialEq, Message)]
pub struct WireAction {
    #[prost(enumeration = "WireActionKind", tag = "1")]
    pub kind: i32,
    #[prost(string, tag = "2")]
    pub target: String,
}
