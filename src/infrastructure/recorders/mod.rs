//! Concrete recording backends

pub mod bencode;
pub mod dtmf;
pub mod freeswitch;
pub mod rtpengine;

pub use dtmf::{DtmfEvent, RtpEngineDtmfListener};
pub use freeswitch::FreeswitchHandler;
pub use rtpengine::{NgClient, RtpEngineHandler};

use crate::application::{CallHandler, DtmfListener, RecorderBackends, RtpEngineBinding};
use crate::config::{FreeswitchConfig, RtpEngineConfig};
use std::sync::Arc;
use tracing::Span;

/// Production factory for the recorder backends
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultBackends;

impl RecorderBackends for DefaultBackends {
    fn rtpengine(&self, config: &RtpEngineConfig) -> anyhow::Result<RtpEngineBinding> {
        let dtmf = config
            .dtmf_listen
            .map(|address| Arc::new(RtpEngineDtmfListener::new(address)) as Arc<dyn DtmfListener>);
        Ok(RtpEngineBinding {
            handler: Arc::new(RtpEngineHandler::new(config)),
            dtmf,
        })
    }

    fn freeswitch(
        &self,
        config: &FreeswitchConfig,
        logger: Span,
    ) -> anyhow::Result<Arc<dyn CallHandler>> {
        Ok(Arc::new(FreeswitchHandler::new(config, logger)))
    }
}
