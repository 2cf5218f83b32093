//! Infrastructure layer - Technical implementations
//!
//! This layer contains:
//! - Log output setup
//! - Protocol implementations (SIP messages, control-plane transport)
//! - Recorder backend adapters (rtpengine, freeswitch)

pub mod logging;
pub mod protocols;
pub mod recorders;
