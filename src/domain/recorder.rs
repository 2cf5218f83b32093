//! Recorder backend selection

use super::shared::ConfigError;
use crate::config::{FreeswitchConfig, RtpEngineConfig};
use std::fmt;

/// Which recording backend handles admitted calls.
///
/// Resolved exactly once at startup; there is no way to construct a
/// selection with zero or two backends.
#[derive(Debug, Clone, PartialEq)]
pub enum RecorderSelection {
    RtpEngine(RtpEngineConfig),
    Freeswitch(FreeswitchConfig),
}

impl RecorderSelection {
    /// Resolve the selection from the optional recorder sections
    pub fn resolve(
        rtpengine: Option<RtpEngineConfig>,
        freeswitch: Option<FreeswitchConfig>,
    ) -> Result<Self, ConfigError> {
        match (rtpengine, freeswitch) {
            (Some(rtpengine), None) => Ok(RecorderSelection::RtpEngine(rtpengine)),
            (None, Some(freeswitch)) => Ok(RecorderSelection::Freeswitch(freeswitch)),
            (None, None) => Err(ConfigError::MissingRecorder),
            (Some(_), Some(_)) => Err(ConfigError::AmbiguousRecorder),
        }
    }

    pub fn kind(&self) -> RecorderKind {
        match self {
            RecorderSelection::RtpEngine(_) => RecorderKind::RtpEngine,
            RecorderSelection::Freeswitch(_) => RecorderKind::Freeswitch,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecorderKind {
    RtpEngine,
    Freeswitch,
}

impl RecorderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecorderKind::RtpEngine => "rtpengine",
            RecorderKind::Freeswitch => "freeswitch",
        }
    }
}

impl fmt::Display for RecorderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_single_backend() {
        let selection = RecorderSelection::resolve(Some(RtpEngineConfig::default()), None).unwrap();
        assert_eq!(selection.kind(), RecorderKind::RtpEngine);

        let selection = RecorderSelection::resolve(None, Some(FreeswitchConfig::default())).unwrap();
        assert_eq!(selection.kind(), RecorderKind::Freeswitch);
    }

    #[test]
    fn test_resolve_rejects_missing_and_ambiguous() {
        assert_eq!(
            RecorderSelection::resolve(None, None),
            Err(ConfigError::MissingRecorder)
        );
        assert_eq!(
            RecorderSelection::resolve(
                Some(RtpEngineConfig::default()),
                Some(FreeswitchConfig::default())
            ),
            Err(ConfigError::AmbiguousRecorder)
        );
    }
}
