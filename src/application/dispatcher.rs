//! Inbound request dispatch
//!
//! Every request received on the control plane goes through here. INVITEs
//! are admitted or rejected inline, in arrival order, and admitted ones are
//! supervised in their own task so slow backends never hold up later calls.
//! A BYE releases the recording on the bound backend. Every task spawned
//! here runs under the process [`FaultPolicy`].

use super::admission::{Admission, AdmissionPolicy};
use super::binder::BoundRecorder;
use super::fault_policy::FaultPolicy;
use super::supervisor::Supervisor;
use crate::domain::Supervision;
use crate::infrastructure::protocols::control::ResponseSink;
use crate::infrastructure::protocols::sip::{SipMethod, SipRequest};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 501 Not Implemented
pub const NOT_IMPLEMENTED_STATUS: u16 = 501;

const OK_STATUS: u16 = 200;

/// What happened to one dispatched request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    /// Turned away by the admission filter; the handler never ran
    Rejected { status: u16, delivered: bool },
    Supervised(Supervision),
    /// ACK: never answered
    Ignored,
    /// BYE answered 200; `released` is false when the backend teardown failed
    TornDown { released: bool, delivered: bool },
    /// A method this gateway does not handle
    NotImplemented { delivered: bool },
}

pub struct Dispatcher {
    admission: AdmissionPolicy,
    supervisor: Arc<Supervisor>,
    policy: FaultPolicy,
}

impl Dispatcher {
    pub fn new(admission: AdmissionPolicy, supervisor: Supervisor, policy: FaultPolicy) -> Self {
        Self {
            admission,
            supervisor: Arc::new(supervisor),
            policy,
        }
    }

    pub fn for_recorder(recorder: &BoundRecorder, policy: &FaultPolicy) -> Self {
        Self::new(
            recorder.admission(),
            Supervisor::new(recorder.handler()),
            policy.clone(),
        )
    }

    /// Policy the control plane spawns its connection tasks under
    pub fn policy(&self) -> &FaultPolicy {
        &self.policy
    }

    /// Dispatch one request. The admission decision is taken before this
    /// returns; responding and supervision continue in the spawned task.
    pub fn dispatch(&self, request: SipRequest, sink: ResponseSink) -> JoinHandle<Dispatched> {
        let call_id = request.call_id().unwrap_or_default();

        match request.method() {
            SipMethod::Invite => match self.admission.inspect(&request) {
                Admission::Admit => {
                    debug!(
                        call_id = %call_id,
                        backend = self.supervisor.handler_name(),
                        "Admitted INVITE"
                    );
                    let supervisor = self.supervisor.clone();
                    self.policy.spawn_guarded("dispatch", async move {
                        Dispatched::Supervised(supervisor.supervise(request, sink).await)
                    })
                }
                Admission::Reject { status } => {
                    info!(
                        call_id = %call_id,
                        content_type = %request.content_type(),
                        "rejecting non-SIPREC INVITE with call-id {}",
                        call_id
                    );
                    self.policy.spawn_guarded("dispatch", async move {
                        let delivered = answer(&sink, status, &call_id).await;
                        Dispatched::Rejected { status, delivered }
                    })
                }
            },
            SipMethod::Ack => {
                debug!(call_id = %call_id, "Ignoring ACK");
                self.policy.spawn_guarded("dispatch", async { Dispatched::Ignored })
            }
            SipMethod::Bye => {
                debug!(call_id = %call_id, "Tearing down recording");
                let handler = self.supervisor.handler();
                self.policy.spawn_guarded("dispatch", async move {
                    let released = match handler.terminate(&request).await {
                        Ok(()) => true,
                        Err(e) => {
                            warn!(
                                call_id = %call_id,
                                backend = handler.name(),
                                error = %format!("{:#}", e),
                                "Failed to release recording"
                            );
                            false
                        }
                    };
                    let delivered = answer(&sink, OK_STATUS, &call_id).await;
                    Dispatched::TornDown { released, delivered }
                })
            }
            method => {
                debug!(call_id = %call_id, method = %method, "No handler for method");
                self.policy.spawn_guarded("dispatch", async move {
                    let delivered = answer(&sink, NOT_IMPLEMENTED_STATUS, &call_id).await;
                    Dispatched::NotImplemented { delivered }
                })
            }
        }
    }
}

async fn answer(sink: &ResponseSink, status: u16, call_id: &str) -> bool {
    match sink.send(status).await {
        Ok(()) => true,
        Err(e) => {
            warn!(call_id = %call_id, status, error = %e, "Failed to send response");
            false
        }
    }
}
