//! Admission filter for inbound INVITEs

use crate::domain::RecorderKind;
use crate::infrastructure::protocols::sip::multipart;
use crate::infrastructure::protocols::sip::SipRequest;

/// 488 Not Acceptable Here
pub const REJECT_STATUS: u16 = 488;

/// Which INVITEs reach the bound handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionPolicy {
    /// Only SIPREC offers (multipart bodies)
    SiprecOnly,
    /// Everything; the backend does its own checks
    AdmitAll,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Admit,
    Reject { status: u16 },
}

impl AdmissionPolicy {
    /// The media relay backend needs a multipart offer; the media server
    /// backend admits unconditionally.
    pub fn for_recorder(kind: RecorderKind) -> Self {
        match kind {
            RecorderKind::RtpEngine => AdmissionPolicy::SiprecOnly,
            RecorderKind::Freeswitch => AdmissionPolicy::AdmitAll,
        }
    }

    /// Pure decision; runs before anything is allocated for the call
    pub fn inspect(&self, request: &SipRequest) -> Admission {
        match self {
            AdmissionPolicy::AdmitAll => Admission::Admit,
            AdmissionPolicy::SiprecOnly => {
                if multipart::is_multipart(&request.content_type()) {
                    Admission::Admit
                } else {
                    Admission::Reject {
                        status: REJECT_STATUS,
                    }
                }
            }
        }
    }
}
