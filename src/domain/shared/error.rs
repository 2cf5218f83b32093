//! Gateway error taxonomy

use thiserror::Error;

/// Startup configuration errors. Always fatal: the process must not accept
/// traffic with an undefined recorder or transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("recorder type not specified in configuration: must be either rtpengine or freeswitch")]
    MissingRecorder,

    #[error("ambiguous recorder configuration: both rtpengine and freeswitch are configured")]
    AmbiguousRecorder,

    #[error("Invalid bind address: {0}")]
    InvalidBindAddress(String),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Failed to load configuration: {0}")]
    Load(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::Load(err.to_string())
    }
}

/// Control-plane transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to bind {endpoint}: {source}")]
    Bind {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Authentication rejected by {endpoint}: {reason}")]
    AuthRejected { endpoint: String, reason: String },

    #[error("Handshake with {0} timed out")]
    HandshakeTimeout(String),

    #[error("Framing error: {0}")]
    Framing(String),

    #[error("Connection closed by {0}")]
    Closed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures when emitting a response for an inbound transaction
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("transaction already finalized with status {0}")]
    AlreadyFinalized(u16),

    #[error("transaction closed: control-plane connection is gone")]
    TransactionClosed,

    #[error("Failed to build response: {0}")]
    Build(String),
}

/// Top-level startup failure
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Failed to bind recorder backend: {0}")]
    Backend(String),
}
