//! SIP message handling
//!
//! The gateway does not run its own SIP transaction layer: the signaling
//! element owns transactions and hands us parsed requests over the control
//! plane. This module only parses, inspects and answers messages.

pub mod builder;
pub mod message;
pub mod multipart;

pub use builder::ResponseBuilder;
pub use message::{SipError, SipMessage, SipMethod, SipRequest, SipResponse};
