//! Domain layer - closed types shared by the gateway
//!
//! This layer contains:
//! - Recorder selection (exactly one backend per process)
//! - Control-plane connection state
//! - Call handler fault classification
//! - The error taxonomy

pub mod connection;
pub mod fault;
pub mod recorder;
pub mod shared;

// Re-export commonly used types
pub use connection::ConnectionState;
pub use fault::{ClassifiedFault, Outcome, Supervision};
pub use recorder::{RecorderKind, RecorderSelection};
pub use shared::{ConfigError, GatewayError, SinkError, TransportError};
