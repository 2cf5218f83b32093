//! Configuration management
//!
//! The raw [`Config`] mirrors the TOML file / environment layout. It is
//! validated once by [`Config::validate`] into a [`GatewayConfig`] whose
//! transport mode and recorder selection are closed enums.

use crate::domain::{ConfigError, RecorderSelection};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix, e.g. `RECGATE__TRANSPORT__HOST`
pub const ENV_PREFIX: &str = "RECGATE";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub transport: TransportSettings,
    #[serde(default)]
    pub rtpengine: Option<RtpEngineConfig>,
    #[serde(default)]
    pub freeswitch: Option<FreeswitchConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    Connect,
    Listen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportSettings {
    pub mode: TransportMode,
    /// Signaling element host (connect mode)
    #[serde(default)]
    pub host: Option<String>,
    /// Local bind address (listen mode)
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
    #[serde(default = "default_auth_timeout_ms")]
    pub auth_timeout_ms: u64,
}

fn default_reconnect_interval_ms() -> u64 {
    3000
}

fn default_auth_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RtpEngineConfig {
    /// UDP address of the media relay's NG control port
    pub ng_address: SocketAddr,
    #[serde(default = "default_rtpengine_timeout_ms")]
    pub timeout_ms: u64,
    /// Where DTMF event reports are received, if enabled
    #[serde(default)]
    pub dtmf_listen: Option<SocketAddr>,
}

fn default_rtpengine_timeout_ms() -> u64 {
    2000
}

impl Default for RtpEngineConfig {
    fn default() -> Self {
        Self {
            ng_address: SocketAddr::from(([127, 0, 0, 1], 22222)),
            timeout_ms: default_rtpengine_timeout_ms(),
            dtmf_listen: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreeswitchConfig {
    /// SIP address of the media server
    pub sip_address: SocketAddr,
    #[serde(default = "default_freeswitch_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_freeswitch_timeout_ms() -> u64 {
    10000
}

impl Default for FreeswitchConfig {
    fn default() -> Self {
        Self {
            sip_address: SocketAddr::from(([127, 0, 0, 1], 5080)),
            timeout_ms: default_freeswitch_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Validated control-plane transport mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportConfig {
    /// Outbound connection to the signaling element
    Connect {
        host: String,
        port: u16,
        secret: String,
    },
    /// The signaling element connects to us
    Listen {
        bind: SocketAddr,
        secret: Option<String>,
    },
}

impl TransportConfig {
    /// Endpoint string used in logs
    pub fn endpoint(&self) -> String {
        match self {
            TransportConfig::Connect { host, port, .. } => format!("{}:{}", host, port),
            TransportConfig::Listen { bind, .. } => bind.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlPlaneConfig {
    pub transport: TransportConfig,
    pub reconnect_interval: Duration,
    pub auth_timeout: Duration,
}

/// Fully validated startup configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub control_plane: ControlPlaneConfig,
    pub recorder: RecorderSelection,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load from an optional TOML file layered under `RECGATE__*` variables
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(contents, config::FileFormat::Toml))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Single validation pass over transport mode and recorder selection
    pub fn validate(self) -> Result<GatewayConfig, ConfigError> {
        let transport = self.transport.resolve()?;
        let recorder = RecorderSelection::resolve(self.rtpengine, self.freeswitch)?;

        Ok(GatewayConfig {
            control_plane: ControlPlaneConfig {
                transport,
                reconnect_interval: Duration::from_millis(self.transport.reconnect_interval_ms),
                auth_timeout: Duration::from_millis(self.transport.auth_timeout_ms),
            },
            recorder,
            logging: self.logging,
        })
    }
}

impl TransportSettings {
    fn resolve(&self) -> Result<TransportConfig, ConfigError> {
        let port = self.port.ok_or_else(|| ConfigError::InvalidValue {
            key: "transport.port".to_string(),
            reason: "missing".to_string(),
        })?;

        match self.mode {
            TransportMode::Connect => {
                let host = self
                    .host
                    .clone()
                    .filter(|h| !h.is_empty())
                    .ok_or_else(|| ConfigError::InvalidValue {
                        key: "transport.host".to_string(),
                        reason: "required in connect mode".to_string(),
                    })?;
                let secret = self.secret.clone().ok_or_else(|| ConfigError::InvalidValue {
                    key: "transport.secret".to_string(),
                    reason: "required in connect mode".to_string(),
                })?;
                Ok(TransportConfig::Connect { host, port, secret })
            }
            TransportMode::Listen => {
                let address = self.address.as_deref().unwrap_or("0.0.0.0");
                let ip: IpAddr = address
                    .parse()
                    .map_err(|_| ConfigError::InvalidBindAddress(address.to_string()))?;
                Ok(TransportConfig::Listen {
                    bind: SocketAddr::new(ip, port),
                    secret: self.secret.clone(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RecorderKind;

    #[test]
    fn test_connect_mode_with_rtpengine() {
        let config = Config::from_toml_str(
            r#"
            [transport]
            mode = "connect"
            host = "10.0.0.5"
            port = 9022
            secret = "cymru"

            [rtpengine]
            ng_address = "127.0.0.1:22222"
            dtmf_listen = "0.0.0.0:22223"
            "#,
        )
        .unwrap()
        .validate()
        .unwrap();

        assert_eq!(
            config.control_plane.transport,
            TransportConfig::Connect {
                host: "10.0.0.5".to_string(),
                port: 9022,
                secret: "cymru".to_string(),
            }
        );
        assert_eq!(config.control_plane.reconnect_interval, Duration::from_millis(3000));
        assert_eq!(config.recorder.kind(), RecorderKind::RtpEngine);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_listen_mode_with_freeswitch() {
        let config = Config::from_toml_str(
            r#"
            [transport]
            mode = "listen"
            address = "127.0.0.1"
            port = 4000

            [freeswitch]
            sip_address = "127.0.0.1:5080"
            "#,
        )
        .unwrap()
        .validate()
        .unwrap();

        assert_eq!(
            config.control_plane.transport,
            TransportConfig::Listen {
                bind: "127.0.0.1:4000".parse().unwrap(),
                secret: None,
            }
        );
        assert_eq!(config.recorder.kind(), RecorderKind::Freeswitch);
    }

    #[test]
    fn test_both_recorders_is_fatal() {
        let result = Config::from_toml_str(
            r#"
            [transport]
            mode = "listen"
            port = 4000

            [rtpengine]
            ng_address = "127.0.0.1:22222"

            [freeswitch]
            sip_address = "127.0.0.1:5080"
            "#,
        )
        .unwrap()
        .validate();

        assert!(matches!(result, Err(ConfigError::AmbiguousRecorder)));
    }

    #[test]
    fn test_no_recorder_is_fatal() {
        let result = Config::from_toml_str(
            r#"
            [transport]
            mode = "listen"
            port = 4000
            "#,
        )
        .unwrap()
        .validate();

        assert!(matches!(result, Err(ConfigError::MissingRecorder)));
    }

    #[test]
    fn test_invalid_bind_address() {
        let result = Config::from_toml_str(
            r#"
            [transport]
            mode = "listen"
            address = "not-an-ip"
            port = 4000

            [freeswitch]
            sip_address = "127.0.0.1:5080"
            "#,
        )
        .unwrap()
        .validate();

        assert!(matches!(result, Err(ConfigError::InvalidBindAddress(_))));
    }

    #[test]
    fn test_connect_mode_requires_secret() {
        let result = Config::from_toml_str(
            r#"
            [transport]
            mode = "connect"
            host = "10.0.0.5"
            port = 9022

            [freeswitch]
            sip_address = "127.0.0.1:5080"
            "#,
        )
        .unwrap()
        .validate();

        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }
}
