//! SIP message types and parsing

use bytes::Bytes;
use rsip::headers::UntypedHeader;
use rsip::{Header, Headers, Method, Request, Response};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SipError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

impl From<rsip::Error> for SipError {
    fn from(err: rsip::Error) -> Self {
        SipError::ParseError(err.to_string())
    }
}

/// SIP methods the gateway distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SipMethod {
    Invite,
    Ack,
    Cancel,
    Bye,
    Options,
    Other,
}

impl SipMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SipMethod::Invite => "INVITE",
            SipMethod::Ack => "ACK",
            SipMethod::Cancel => "CANCEL",
            SipMethod::Bye => "BYE",
            SipMethod::Options => "OPTIONS",
            SipMethod::Other => "OTHER",
        }
    }

    pub fn from_rsip(method: &Method) -> Self {
        match method {
            Method::Invite => SipMethod::Invite,
            Method::Ack => SipMethod::Ack,
            Method::Cancel => SipMethod::Cancel,
            Method::Bye => SipMethod::Bye,
            Method::Options => SipMethod::Options,
            _ => SipMethod::Other,
        }
    }
}

impl fmt::Display for SipMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Value of the first header matching `name`, typed or untyped
fn find_header(headers: &Headers, name: &str) -> Option<String> {
    headers.iter().find_map(|h| match h {
        Header::CallId(cid) if name.eq_ignore_ascii_case("Call-ID") => {
            Some(cid.value().to_string())
        }
        Header::ContentType(ct) if name.eq_ignore_ascii_case("Content-Type") => {
            Some(ct.value().to_string())
        }
        Header::Other(other, value) if other.eq_ignore_ascii_case(name) => Some(value.clone()),
        _ => None,
    })
}

fn tag_param(value: &str) -> Option<String> {
    value.split(';').skip(1).find_map(|param| {
        let (name, tag) = param.split_once('=')?;
        if name.trim().eq_ignore_ascii_case("tag") {
            Some(tag.trim().to_string())
        } else {
            None
        }
    })
}

/// SIP Request wrapper
#[derive(Debug, Clone)]
pub struct SipRequest {
    pub inner: Request,
}

impl SipRequest {
    pub fn new(inner: Request) -> Self {
        Self { inner }
    }

    pub fn parse(data: &[u8]) -> Result<Self, SipError> {
        let request = rsip::Request::try_from(data)?;
        Ok(Self::new(request))
    }

    pub fn method(&self) -> SipMethod {
        SipMethod::from_rsip(&self.inner.method)
    }

    pub fn headers(&self) -> &Headers {
        &self.inner.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.inner.body
    }

    /// Header value by name; `Call-ID` and `Content-Type` match their
    /// typed rsip variants as well as untyped ones.
    pub fn header(&self, name: &str) -> Option<String> {
        find_header(&self.inner.headers, name)
    }

    pub fn call_id(&self) -> Option<String> {
        self.header("Call-ID")
    }

    /// `tag` parameter of the From header
    pub fn from_tag(&self) -> Option<String> {
        self.inner.headers.iter().find_map(|h| match h {
            Header::From(from) => tag_param(from.value()),
            _ => None,
        })
    }

    pub fn cseq(&self) -> Option<u32> {
        self.inner.headers.iter().find_map(|h| match h {
            Header::CSeq(cseq) => cseq.value().split_whitespace().next()?.parse().ok(),
            _ => None,
        })
    }

    /// Content-Type, or the empty string when the header is absent
    pub fn content_type(&self) -> String {
        self.header("Content-Type").unwrap_or_default()
    }

    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.inner.to_string())
    }
}

/// SIP Response wrapper
#[derive(Debug, Clone)]
pub struct SipResponse {
    pub inner: Response,
}

impl SipResponse {
    pub fn new(inner: Response) -> Self {
        Self { inner }
    }

    pub fn parse(data: &[u8]) -> Result<Self, SipError> {
        let response = rsip::Response::try_from(data)?;
        Ok(Self::new(response))
    }

    pub fn status_code(&self) -> u16 {
        self.inner.status_code.clone().into()
    }

    pub fn headers(&self) -> &Headers {
        &self.inner.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.inner.body
    }

    pub fn call_id(&self) -> Option<String> {
        find_header(&self.inner.headers, "Call-ID")
    }

    pub fn content_type(&self) -> Option<String> {
        find_header(&self.inner.headers, "Content-Type")
    }

    /// Status code with its reason phrase, for logs
    pub fn status_text(&self) -> String {
        self.inner.status_code.to_string()
    }

    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.inner.to_string())
    }
}

/// SIP Message (either request or response)
#[derive(Debug, Clone)]
pub enum SipMessage {
    Request(SipRequest),
    Response(SipResponse),
}

impl SipMessage {
    pub fn parse(data: &[u8]) -> Result<Self, SipError> {
        // Try parsing as request first
        if let Ok(request) = SipRequest::parse(data) {
            return Ok(SipMessage::Request(request));
        }

        if let Ok(response) = SipResponse::parse(data) {
            return Ok(SipMessage::Response(response));
        }

        Err(SipError::ParseError(
            "Could not parse as SIP request or response".to_string(),
        ))
    }
}
