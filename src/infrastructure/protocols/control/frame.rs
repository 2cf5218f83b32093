//! Control-plane frame codec
//!
//! Wire format: `<decimal payload length>#<kind>|<data>`.

use crate::domain::TransportError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Largest accepted payload; SIPREC offers with metadata stay well below it.
pub const MAX_FRAME_LEN: usize = 4 * 1024 * 1024;

/// Longest length prefix we accept before the `#`
const MAX_PREFIX_DIGITS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Credentials presented by the connecting side
    Auth(String),
    AuthOk,
    AuthFail(String),
    /// A raw SIP request or response
    Sip(Bytes),
}

impl Frame {
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Auth(_) => "auth",
            Frame::AuthOk => "auth-ok",
            Frame::AuthFail(_) => "auth-fail",
            Frame::Sip(_) => "sip",
        }
    }

    pub fn encode(&self) -> Bytes {
        let data: &[u8] = match self {
            Frame::Auth(secret) => secret.as_bytes(),
            Frame::AuthOk => b"",
            Frame::AuthFail(reason) => reason.as_bytes(),
            Frame::Sip(raw) => raw,
        };
        let kind = self.kind();
        let payload_len = kind.len() + 1 + data.len();

        let prefix = format!("{}#", payload_len);
        let mut buf = BytesMut::with_capacity(prefix.len() + payload_len);
        buf.put_slice(prefix.as_bytes());
        buf.put_slice(kind.as_bytes());
        buf.put_u8(b'|');
        buf.put_slice(data);
        buf.freeze()
    }

    /// Decode one frame from the front of `buf`.
    ///
    /// Returns `Ok(None)` when more bytes are needed; consumed bytes are
    /// removed from `buf` only once a whole frame is available.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Frame>, TransportError> {
        let hash = match buf.iter().position(|b| *b == b'#') {
            Some(pos) => pos,
            None if buf.len() > MAX_PREFIX_DIGITS => {
                return Err(TransportError::Framing("missing length prefix".to_string()))
            }
            None => return Ok(None),
        };

        let prefix = std::str::from_utf8(&buf[..hash])
            .map_err(|_| TransportError::Framing("non-ascii length prefix".to_string()))?;
        let len: usize = prefix
            .parse()
            .map_err(|_| TransportError::Framing(format!("invalid length prefix {:?}", prefix)))?;
        if len > MAX_FRAME_LEN {
            return Err(TransportError::Framing(format!(
                "frame of {} bytes exceeds limit",
                len
            )));
        }

        if buf.len() < hash + 1 + len {
            return Ok(None);
        }

        buf.advance(hash + 1);
        let payload = buf.split_to(len).freeze();

        let bar = payload
            .iter()
            .position(|b| *b == b'|')
            .ok_or_else(|| TransportError::Framing("missing frame kind".to_string()))?;
        let kind = &payload[..bar];
        let data = payload.slice(bar + 1..);

        let frame = match kind {
            b"auth" => Frame::Auth(String::from_utf8_lossy(&data).into_owned()),
            b"auth-ok" => Frame::AuthOk,
            b"auth-fail" => Frame::AuthFail(String::from_utf8_lossy(&data).into_owned()),
            b"sip" => Frame::Sip(data),
            other => {
                return Err(TransportError::Framing(format!(
                    "unknown frame kind {:?}",
                    String::from_utf8_lossy(other)
                )))
            }
        };

        Ok(Some(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let frame = Frame::Auth("cymru".to_string());
        assert_eq!(&frame.encode()[..], b"10#auth|cymru");
        assert_eq!(&Frame::AuthOk.encode()[..], b"8#auth-ok|");
    }

    #[test]
    fn test_decode_partial_then_complete() {
        let encoded = Frame::Sip(Bytes::from_static(b"OPTIONS sip:a SIP/2.0\r\n\r\n")).encode();
        let mut buf = BytesMut::from(&encoded[..5]);
        assert_eq!(Frame::decode(&mut buf).unwrap(), None);
        assert_eq!(buf.len(), 5);

        buf.extend_from_slice(&encoded[5..]);
        let frame = Frame::decode(&mut buf).unwrap().unwrap();
        assert_eq!(
            frame,
            Frame::Sip(Bytes::from_static(b"OPTIONS sip:a SIP/2.0\r\n\r\n"))
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_back_to_back_frames() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&Frame::AuthOk.encode());
        buf.extend_from_slice(&Frame::AuthFail("bad secret".to_string()).encode());

        assert_eq!(Frame::decode(&mut buf).unwrap(), Some(Frame::AuthOk));
        assert_eq!(
            Frame::decode(&mut buf).unwrap(),
            Some(Frame::AuthFail("bad secret".to_string()))
        );
        assert_eq!(Frame::decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let mut buf = BytesMut::from(&b"12x#sip|"[..]);
        assert!(Frame::decode(&mut buf).is_err());

        let mut buf = BytesMut::from(&b"123456789012"[..]);
        assert!(Frame::decode(&mut buf).is_err());

        let mut buf = BytesMut::from(&b"6#ping|x"[..]);
        assert!(Frame::decode(&mut buf).is_err());

        let mut buf = BytesMut::from(format!("{}#", MAX_FRAME_LEN + 1).as_bytes());
        assert!(Frame::decode(&mut buf).is_err());
    }
}
