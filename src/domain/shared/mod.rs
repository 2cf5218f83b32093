//! Shared kernel - error types used across all layers

pub mod error;

pub use error::{ConfigError, GatewayError, SinkError, TransportError};
