//! SIP message types and parsing

use bytes::Bytes;
use rsip::{Header, Headers, Method, Request, Response, StatusCode, Uri, Version};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SipError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Transaction error: {0}")]
    TransactionError(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Dialog terminated")]
    DialogTerminated,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<rsip::Error> for SipError {
    fn from(err: rsip::Error) -> Self {
        SipError::ParseError(err.to_string())
    }
}

/// SIP method types used by this stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SipMethod {
    Invite,
    Ack,
    Cancel,
    Bye,
    Options,
}

impl SipMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SipMethod::Invite => "INVITE",
            SipMethod::Ack => "ACK",
            SipMethod::Cancel => "CANCEL",
            SipMethod::Bye => "BYE",
            SipMethod::Options => "OPTIONS",
        }
    }

    pub fn from_rsip(method: &Method) -> Option<Self> {
        match method {
            Method::Invite => Some(SipMethod::Invite),
            Method::Ack => Some(SipMethod::Ack),
            Method::Cancel => Some(SipMethod::Cancel),
            Method::Bye => Some(SipMethod::Bye),
            Method::Options => Some(SipMethod::Options),
            _ => None,
        }
    }

    pub fn to_rsip(&self) -> Method {
        match self {
            SipMethod::Invite => Method::Invite,
            SipMethod::Ack => Method::Ack,
            SipMethod::Cancel => Method::Cancel,
            SipMethod::Bye => Method::Bye,
            SipMethod::Options => Method::Options,
        }
    }
}

impl fmt::Display for SipMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Strip the "Name: " prefix a serialized header may carry
fn strip_header_name(serialized: String, name: &str) -> String {
    let prefix_len = name.len() + 1;
    if serialized.len() > prefix_len
        && serialized[..name.len()].eq_ignore_ascii_case(name)
        && serialized.as_bytes()[name.len()] == b':'
    {
        serialized[prefix_len..].trim().to_string()
    } else {
        serialized.trim().to_string()
    }
}

/// Find a header by name (case-insensitive) and return its value
fn find_header_value(headers: &Headers, name: &str) -> Option<String> {
    headers.iter().find_map(|h| {
        let serialized = h.to_string();
        let (header_name, value) = serialized.split_once(':')?;
        if header_name.trim().eq_ignore_ascii_case(name) {
            Some(value.trim().to_string())
        } else {
            None
        }
    })
}

/// Extract feature tags (`+...` parameters) from a Contact header value
fn feature_tags_from_contact(contact: &str) -> Vec<String> {
    contact
        .split(';')
        .skip(1)
        .map(|p| p.trim().to_string())
        .filter(|p| p.starts_with('+') || p == "automata")
        .collect()
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

    pub fn method(&self) -> Option<SipMethod> {
        SipMethod::from_rsip(&self.inner.method)
    }

    pub fn uri(&self) -> &Uri {
        &self.inner.uri
    }

    pub fn headers(&self) -> &Headers {
        &self.inner.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.inner.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.inner.body
    }

    pub fn call_id(&self) -> Option<String> {
        self.inner.headers.iter().find_map(|h| match h {
            Header::CallId(cid) => Some(strip_header_name(cid.to_string(), "Call-ID")),
            _ => None,
        })
    }

    pub fn cseq(&self) -> Option<u32> {
        self.inner.headers.iter().find_map(|h| match h {
            Header::CSeq(cseq) => strip_header_name(cseq.to_string(), "CSeq")
                .split_whitespace()
                .next()
                .and_then(|s| s.parse().ok()),
            _ => None,
        })
    }

    pub fn header_value(&self, name: &str) -> Option<String> {
        find_header_value(&self.inner.headers, name)
    }

    pub fn from_value(&self) -> Option<String> {
        self.header_value("From")
    }

    pub fn to_value(&self) -> Option<String> {
        self.header_value("To")
    }

    /// Identity asserted by the network, falling back to the From header
    pub fn asserted_identity(&self) -> Option<String> {
        self.header_value("P-Asserted-Identity")
            .or_else(|| self.from_value())
    }

    /// Feature tags carried in the Contact header
    pub fn feature_tags(&self) -> Vec<String> {
        self.header_value("Contact")
            .map(|c| feature_tags_from_contact(&c))
            .unwrap_or_default()
    }

    /// `+sip.instance` parameter of the Contact header, if present
    pub fn sip_instance(&self) -> Option<String> {
        let contact = self.header_value("Contact")?;
        contact.split(';').skip(1).find_map(|p| {
            let p = p.trim();
            p.strip_prefix("+sip.instance=")
                .map(|v| v.trim_matches('"').to_string())
        })
    }

    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.inner.body).to_string()
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

    pub fn header_value(&self, name: &str) -> Option<String> {
        find_header_value(&self.inner.headers, name)
    }

    /// Feature tags carried in the Contact header
    pub fn feature_tags(&self) -> Vec<String> {
        self.header_value("Contact")
            .map(|c| feature_tags_from_contact(&c))
            .unwrap_or_default()
    }

    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.inner.body).to_string()
    }

    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.inner.to_string())
    }
}

/// Build a SIP response from a request, copying the dialog headers
pub struct ResponseBuilder {
    status_code: u16,
    to_tag: Option<String>,
    headers: Vec<Header>,
    body: Vec<u8>,
}

impl ResponseBuilder {
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            to_tag: None,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn header(mut self, header: Header) -> Self {
        self.headers.push(header);
        self
    }

    /// Tag appended to the copied To header
    pub fn to_tag(mut self, tag: impl Into<String>) -> Self {
        self.to_tag = Some(tag.into());
        self
    }

    pub fn build_for_request(mut self, request: &SipRequest) -> Result<SipResponse, SipError> {
        for header in request.headers().iter() {
            match header {
                Header::Via(_) | Header::From(_) | Header::CallId(_) | Header::CSeq(_) => {
                    self.headers.push(header.clone());
                }
                Header::To(to) => {
                    let value = strip_header_name(to.to_string(), "To");
                    let value = match (&self.to_tag, value.contains("tag=")) {
                        (Some(tag), false) => format!("{};tag={}", value, tag),
                        _ => value,
                    };
                    self.headers.push(Header::To(value.into()));
                }
                _ => {}
            }
        }

        self.headers.push(Header::ContentLength(
            self.body.len().to_string().into(),
        ));

        let response = Response {
            status_code: StatusCode::from(self.status_code),
            headers: Headers::from(self.headers),
            body: self.body,
            version: Version::V2,
        };

        Ok(SipResponse::new(response))
    }
}
