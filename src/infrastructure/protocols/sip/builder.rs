//! SIP message builder utilities

use super::message::{SipError, SipRequest, SipResponse};
use rsip::{Header, Headers, Method, Request, Response, StatusCode, Version};
use std::net::SocketAddr;

/// Build a SIP response from a request
pub struct ResponseBuilder {
    status_code: u16,
    headers: Vec<Header>,
    body: Vec<u8>,
}

impl ResponseBuilder {
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn not_acceptable_here() -> Self {
        Self::new(488)
    }

    /// Attach a body together with its Content-Type
    pub fn body(mut self, body: Vec<u8>, content_type: &str) -> Self {
        self.headers
            .push(Header::ContentType(content_type.to_string().into()));
        self.body = body;
        self
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn build_for_request(self, request: &SipRequest) -> Result<SipResponse, SipError> {
        if !(100..700).contains(&self.status_code) {
            return Err(SipError::InvalidMessage(format!(
                "status code {} out of range",
                self.status_code
            )));
        }

        // Copy essential headers from request
        let mut headers: Vec<Header> = request
            .headers()
            .iter()
            .filter(|header| {
                matches!(
                    header,
                    Header::Via(_) | Header::From(_) | Header::To(_) | Header::CallId(_) | Header::CSeq(_)
                )
            })
            .cloned()
            .collect();
        headers.extend(self.headers);
        headers.push(Header::ContentLength(self.body.len().to_string().into()));

        let response = Response {
            status_code: StatusCode::from(self.status_code),
            headers: Headers::from(headers),
            body: self.body,
            version: Version::V2,
        };

        Ok(SipResponse::new(response))
    }
}

/// Copy of `request` with our own Via on top, so that replies to a relayed
/// request come back to `local`.
pub fn with_top_via(request: &SipRequest, local: SocketAddr, branch: &str) -> SipRequest {
    let via = Header::Via(format!("SIP/2.0/UDP {};branch=z9hG4bK{}", local, branch).into());
    let mut headers = vec![via];
    headers.extend(request.headers().iter().cloned());

    let mut inner = request.inner.clone();
    inner.headers = Headers::from(headers);
    SipRequest::new(inner)
}

/// ACK for a final response received on a relayed INVITE.
///
/// `invite` is the request as relayed, so its topmost Via is our own.
pub fn build_ack(invite: &SipRequest, response: &SipResponse) -> SipRequest {
    let mut headers: Vec<Header> = Vec::new();
    if let Some(via) = invite.headers().iter().find(|h| matches!(h, Header::Via(_))) {
        headers.push(via.clone());
    }
    headers.extend(
        invite
            .headers()
            .iter()
            .filter(|h| matches!(h, Header::From(_) | Header::CallId(_)))
            .cloned(),
    );
    if let Some(to) = response.headers().iter().find(|h| matches!(h, Header::To(_))) {
        headers.push(to.clone());
    }
    let seq = invite.cseq().unwrap_or(1);
    headers.push(Header::CSeq(format!("{} ACK", seq).into()));
    headers.push(Header::MaxForwards("70".into()));
    headers.push(Header::ContentLength("0".into()));

    SipRequest::new(Request {
        method: Method::Ack,
        uri: invite.inner.uri.clone(),
        version: Version::V2,
        headers: Headers::from(headers),
        body: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invite() -> SipRequest {
        SipRequest::parse(
            b"INVITE sip:srs@recorder.example.com SIP/2.0\r\n\
              Via: SIP/2.0/UDP 192.168.1.100:5060;branch=z9hG4bK776asdhds\r\n\
              From: <sip:src@example.com>;tag=1928301774\r\n\
              To: <sip:srs@recorder.example.com>\r\n\
              Call-ID: builder-test\r\n\
              CSeq: 1 INVITE\r\n\
              Content-Length: 0\r\n\r\n",
        )
        .unwrap()
    }

    #[test]
    fn test_build_rejection_for_request() {
        let response = ResponseBuilder::not_acceptable_here()
            .build_for_request(&invite())
            .unwrap();

        assert_eq!(response.status_code(), 488);
        assert_eq!(response.call_id(), Some("builder-test".to_string()));
        assert!(response.body().is_empty());
    }

    #[test]
    fn test_build_with_body() {
        let response = ResponseBuilder::ok()
            .body(b"v=0\r\n".to_vec(), "application/sdp")
            .build_for_request(&invite())
            .unwrap();

        assert_eq!(response.status_code(), 200);
        assert_eq!(response.content_type(), Some("application/sdp".to_string()));
        assert_eq!(response.body(), b"v=0\r\n");
    }

    #[test]
    fn test_out_of_range_status_is_rejected() {
        assert!(ResponseBuilder::new(42).build_for_request(&invite()).is_err());
    }

    #[test]
    fn test_top_via_is_prepended() {
        let relayed = with_top_via(&invite(), "127.0.0.1:5070".parse().unwrap(), "abc");
        let first = relayed.headers().iter().next().unwrap();
        assert!(matches!(first, Header::Via(_)));
        assert!(relayed.to_bytes().len() > invite().to_bytes().len());
    }

    #[test]
    fn test_ack_carries_response_to_tag() {
        let relayed = with_top_via(&invite(), "127.0.0.1:5070".parse().unwrap(), "abc");
        let response = SipResponse::parse(
            b"SIP/2.0 486 Busy Here\r\n\
              Via: SIP/2.0/UDP 127.0.0.1:5070;branch=z9hG4bKabc\r\n\
              From: <sip:src@example.com>;tag=1928301774\r\n\
              To: <sip:srs@recorder.example.com>;tag=fs-1\r\n\
              Call-ID: builder-test\r\n\
              CSeq: 1 INVITE\r\n\
              Content-Length: 0\r\n\r\n",
        )
        .unwrap();

        let ack = build_ack(&relayed, &response);
        let raw = String::from_utf8(ack.to_bytes().to_vec()).unwrap();
        assert!(raw.starts_with("ACK sip:srs@recorder.example.com SIP/2.0"));
        assert!(raw.contains("tag=fs-1"));
        assert!(raw.contains("1 ACK"));
        assert!(raw.contains("z9hG4bKabc"));
        assert!(!raw.contains("z9hG4bK776asdhds"));
    }
}
