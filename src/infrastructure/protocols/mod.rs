//! Protocol implementations

pub mod control;
pub mod sip;
