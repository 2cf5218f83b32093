//! Backend binder
//!
//! Turns the validated [`RecorderSelection`] into exactly one bound call
//! handler plus the admission policy that goes with it. Runs once at startup.

use super::admission::AdmissionPolicy;
use super::fault_policy::FaultPolicy;
use super::handler::{CallHandler, RecorderBackends};
use crate::domain::{GatewayError, RecorderKind, RecorderSelection};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, info_span};

/// The recorder chosen for this process; immutable after binding
pub struct BoundRecorder {
    kind: RecorderKind,
    handler: Arc<dyn CallHandler>,
    admission: AdmissionPolicy,
    dtmf_task: Option<JoinHandle<()>>,
}

impl BoundRecorder {
    pub fn kind(&self) -> RecorderKind {
        self.kind
    }

    pub fn handler(&self) -> Arc<dyn CallHandler> {
        self.handler.clone()
    }

    pub fn admission(&self) -> AdmissionPolicy {
        self.admission
    }

    pub fn has_dtmf_listener(&self) -> bool {
        self.dtmf_task.is_some()
    }
}

impl std::fmt::Debug for BoundRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundRecorder")
            .field("kind", &self.kind)
            .field("handler", &self.handler.name())
            .field("admission", &self.admission)
            .field("dtmf_listener", &self.dtmf_task.is_some())
            .finish()
    }
}

/// Bind the selected backend.
///
/// The DTMF listener of the media relay backend is started as a background
/// task under `policy`; binding does not wait for it.
pub fn bind(
    selection: &RecorderSelection,
    backends: &dyn RecorderBackends,
    policy: &FaultPolicy,
) -> Result<BoundRecorder, GatewayError> {
    let kind = selection.kind();
    let admission = AdmissionPolicy::for_recorder(kind);

    match selection {
        RecorderSelection::RtpEngine(config) => {
            info!(
                ng_address = %config.ng_address,
                dtmf_listen = ?config.dtmf_listen,
                "using rtpengine as the recorder"
            );
            let binding = backends
                .rtpengine(config)
                .map_err(|e| GatewayError::Backend(format!("{:#}", e)))?;

            let dtmf_task = binding.dtmf.map(|listener| {
                policy.spawn("dtmf-listener", async move { listener.listen().await })
            });

            Ok(BoundRecorder {
                kind,
                handler: binding.handler,
                admission,
                dtmf_task,
            })
        }
        RecorderSelection::Freeswitch(config) => {
            info!(sip_address = %config.sip_address, "using freeswitch as the recorder");
            let logger = info_span!("freeswitch", sip_address = %config.sip_address);
            let handler = backends
                .freeswitch(config, logger)
                .map_err(|e| GatewayError::Backend(format!("{:#}", e)))?;

            Ok(BoundRecorder {
                kind,
                handler,
                admission,
                dtmf_task: None,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handler::{DtmfListener, MockRecorderBackends, RtpEngineBinding};
    use crate::config::{FreeswitchConfig, RtpEngineConfig};
    use crate::domain::Outcome;
    use crate::infrastructure::protocols::control::ResponseSink;
    use crate::infrastructure::protocols::sip::SipRequest;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct NamedHandler(&'static str);

    #[async_trait]
    impl CallHandler for NamedHandler {
        async fn handle(&self, _request: SipRequest, _sink: ResponseSink) -> Outcome {
            Ok(())
        }

        fn name(&self) -> &'static str {
            self.0
        }
    }

    struct FlagListener(Arc<AtomicBool>);

    #[async_trait]
    impl DtmfListener for FlagListener {
        async fn listen(&self) -> anyhow::Result<()> {
            self.0.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn policy() -> FaultPolicy {
        FaultPolicy::new(Arc::new(|code| panic!("unexpected exit {}", code)))
    }

    #[tokio::test]
    async fn test_bind_rtpengine_starts_dtmf_listener() {
        let started = Arc::new(AtomicBool::new(false));
        let flag = started.clone();

        let mut backends = MockRecorderBackends::new();
        backends.expect_rtpengine().times(1).returning(move |_| {
            Ok(RtpEngineBinding {
                handler: Arc::new(NamedHandler("rtpengine")),
                dtmf: Some(Arc::new(FlagListener(flag.clone()))),
            })
        });
        backends.expect_freeswitch().never();

        let selection = RecorderSelection::RtpEngine(RtpEngineConfig::default());
        let mut bound = bind(&selection, &backends, &policy()).unwrap();

        assert_eq!(bound.kind(), RecorderKind::RtpEngine);
        assert_eq!(bound.admission(), AdmissionPolicy::SiprecOnly);
        assert_eq!(bound.handler().name(), "rtpengine");
        assert!(bound.has_dtmf_listener());

        bound.dtmf_task.take().unwrap().await.unwrap();
        assert!(started.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_bind_freeswitch_admits_all() {
        let mut backends = MockRecorderBackends::new();
        backends.expect_rtpengine().never();
        backends
            .expect_freeswitch()
            .times(1)
            .returning(|_, _| Ok(Arc::new(NamedHandler("freeswitch")) as Arc<dyn CallHandler>));

        let selection = RecorderSelection::Freeswitch(FreeswitchConfig::default());
        let bound = bind(&selection, &backends, &policy()).unwrap();

        assert_eq!(bound.kind(), RecorderKind::Freeswitch);
        assert_eq!(bound.admission(), AdmissionPolicy::AdmitAll);
        assert!(!bound.has_dtmf_listener());
    }

    #[tokio::test]
    async fn test_backend_construction_failure_is_fatal() {
        let mut backends = MockRecorderBackends::new();
        backends
            .expect_freeswitch()
            .returning(|_, _| Err(anyhow::anyhow!("cannot resolve media server")));

        let selection = RecorderSelection::Freeswitch(FreeswitchConfig::default());
        let result = bind(&selection, &backends, &policy());

        assert!(matches!(result, Err(GatewayError::Backend(_))));
    }
}
