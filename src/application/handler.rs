//! Backend call handler contract

use crate::config::{FreeswitchConfig, RtpEngineConfig};
use crate::domain::Outcome;
use crate::infrastructure::protocols::control::ResponseSink;
use crate::infrastructure::protocols::sip::SipRequest;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::Span;

/// A recording backend's INVITE handler.
///
/// On success the handler has sent its own final response through `sink`.
/// On failure it returns a [`ClassifiedFault`](crate::domain::ClassifiedFault):
/// `Protocol` when the signaling layer already concluded the transaction,
/// `Internal` for anything else. Panics are treated as internal faults.
#[async_trait]
pub trait CallHandler: Send + Sync {
    async fn handle(&self, request: SipRequest, sink: ResponseSink) -> Outcome;

    /// Release what the backend holds for the dialog a BYE ends
    async fn terminate(&self, request: &SipRequest) -> anyhow::Result<()> {
        let _ = request;
        Ok(())
    }

    /// Backend name used in logs
    fn name(&self) -> &'static str;
}

/// Auxiliary DTMF event listener registered alongside the media relay backend
#[async_trait]
pub trait DtmfListener: Send + Sync {
    /// Runs until the listener fails; never gates call handling
    async fn listen(&self) -> anyhow::Result<()>;
}

/// What binding the media relay backend produces
pub struct RtpEngineBinding {
    pub handler: Arc<dyn CallHandler>,
    pub dtmf: Option<Arc<dyn DtmfListener>>,
}

/// Factory for the concrete recorder backends
#[cfg_attr(test, mockall::automock)]
pub trait RecorderBackends: Send + Sync {
    fn rtpengine(&self, config: &RtpEngineConfig) -> anyhow::Result<RtpEngineBinding>;

    /// `logger` is the logging context the handler runs in
    fn freeswitch(
        &self,
        config: &FreeswitchConfig,
        logger: Span,
    ) -> anyhow::Result<Arc<dyn CallHandler>>;
}
