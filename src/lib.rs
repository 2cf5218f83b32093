//! recgate - SIPREC recording gateway
//!
//! Receives SIPREC INVITEs from a signaling element over a TCP control
//! plane and hands admitted calls to one configured recording backend
//! (rtpengine or freeswitch) behind a fault-containing supervision boundary.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types
pub use config::{Config, GatewayConfig};
pub use domain::shared::error::{ConfigError, GatewayError, SinkError, TransportError};
pub use domain::{ClassifiedFault, Outcome, Supervision};
