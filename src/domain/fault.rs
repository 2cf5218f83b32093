//! Fault classification for call handler outcomes

use std::fmt;
use thiserror::Error;

/// The only error a call handler may return.
///
/// `Protocol` means the signaling layer already concluded the transaction
/// (remote rejection, timeout, cancel); nothing further is sent for it.
/// `Internal` is a defect in the backend and is answered with a 500.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifiedFault {
    #[error("protocol fault {status} {reason}")]
    Protocol { status: u16, reason: String },

    #[error("internal fault: {cause}")]
    Internal { cause: String },
}

impl ClassifiedFault {
    pub fn protocol(status: u16, reason: impl Into<String>) -> Self {
        ClassifiedFault::Protocol {
            status,
            reason: reason.into(),
        }
    }

    pub fn internal(cause: impl fmt::Display) -> Self {
        ClassifiedFault::Internal {
            cause: cause.to_string(),
        }
    }

    /// Normalize a fault: a "protocol" status below 400 is not a failure
    /// status and is reclassified as internal.
    pub fn normalized(self) -> Self {
        match self {
            ClassifiedFault::Protocol { status, reason } if status < 400 => {
                ClassifiedFault::Internal {
                    cause: format!("non-failure status {} reported as fault: {}", status, reason),
                }
            }
            other => other,
        }
    }

    pub fn is_protocol(&self) -> bool {
        matches!(self, ClassifiedFault::Protocol { .. })
    }
}

impl From<anyhow::Error> for ClassifiedFault {
    fn from(err: anyhow::Error) -> Self {
        ClassifiedFault::Internal {
            cause: format!("{:#}", err),
        }
    }
}

/// Result type produced by every call handler
pub type Outcome = std::result::Result<(), ClassifiedFault>;

/// Terminal state reached by a supervised request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Supervision {
    /// Handler completed and owns its own response
    Succeeded,
    /// Downstream finalized the transaction; nothing was sent
    ProtocolFaulted { status: u16 },
    /// Internal fault answered with 500
    Sent,
    /// Internal fault; the 500 could not be delivered
    SendFailed,
}

impl Supervision {
    pub fn name(&self) -> &'static str {
        match self {
            Supervision::Succeeded => "Succeeded",
            Supervision::ProtocolFaulted { .. } => "ProtocolFaulted",
            Supervision::Sent => "Sent",
            Supervision::SendFailed => "SendFailed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_low_status_is_reclassified_as_internal() {
        let fault = ClassifiedFault::protocol(200, "OK").normalized();
        assert!(!fault.is_protocol());

        let fault = ClassifiedFault::protocol(486, "Busy Here").normalized();
        assert_eq!(fault, ClassifiedFault::protocol(486, "Busy Here"));
    }

    #[test]
    fn test_anyhow_error_becomes_internal() {
        let err = anyhow::anyhow!("engine unreachable").context("offer failed");
        let fault = ClassifiedFault::from(err);
        match fault {
            ClassifiedFault::Internal { cause } => {
                assert!(cause.contains("offer failed"));
                assert!(cause.contains("engine unreachable"));
            }
            other => panic!("unexpected fault: {:?}", other),
        }
    }
}
