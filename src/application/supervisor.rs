//! Supervision boundary around the bound call handler
//!
//! Every admitted INVITE is handed to the bound [`CallHandler`] here. Whatever
//! the handler does, the boundary guarantees that at most one outcome is
//! visible to the signaling peer: the handler's own final response, a single
//! 500 for an internal fault, or silence when the protocol layer already
//! concluded the transaction. Nothing escapes the boundary.

use super::handler::CallHandler;
use crate::domain::{ClassifiedFault, Supervision};
use crate::infrastructure::protocols::control::ResponseSink;
use crate::infrastructure::protocols::sip::SipRequest;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// 500 Internal Server Error
pub const INTERNAL_ERROR_STATUS: u16 = 500;

tokio::task_local! {
    static SUPERVISED: ();
}

/// Whether the caller is running inside a supervision scope
pub fn in_supervision() -> bool {
    SUPERVISED.try_with(|_| ()).is_ok()
}

/// Human-readable text of a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

pub struct Supervisor {
    handler: Arc<dyn CallHandler>,
}

impl Supervisor {
    pub fn new(handler: Arc<dyn CallHandler>) -> Self {
        Self { handler }
    }

    pub fn handler_name(&self) -> &'static str {
        self.handler.name()
    }

    pub fn handler(&self) -> Arc<dyn CallHandler> {
        self.handler.clone()
    }

    /// Run the handler for one admitted request and contain its outcome
    pub async fn supervise(&self, request: SipRequest, sink: ResponseSink) -> Supervision {
        let call_id = sink.call_id();
        let handler = self.handler.clone();
        let handler_sink = sink.clone();

        // The handler call itself happens inside the unwind scope, so a panic
        // before its first suspension point is captured the same way as one
        // after it.
        let invocation =
            AssertUnwindSafe(async move { handler.handle(request, handler_sink).await })
                .catch_unwind();

        let fault = match SUPERVISED.scope((), invocation).await {
            Ok(Ok(())) => {
                debug!(call_id = %call_id, "Call handler succeeded");
                return Supervision::Succeeded;
            }
            Ok(Err(fault)) => fault.normalized(),
            Err(payload) => ClassifiedFault::Internal {
                cause: format!("call handler panicked: {}", panic_message(payload.as_ref())),
            },
        };

        match fault {
            ClassifiedFault::Protocol { status, reason } => {
                warn!(
                    call_id = %call_id,
                    status,
                    reason = %reason,
                    "Call ended with protocol fault"
                );
                Supervision::ProtocolFaulted { status }
            }
            ClassifiedFault::Internal { cause } => {
                error!(
                    call_id = %call_id,
                    backend = self.handler.name(),
                    cause = %cause,
                    "Internal fault in call handler"
                );
                match sink.send(INTERNAL_ERROR_STATUS).await {
                    Ok(()) => Supervision::Sent,
                    Err(e) => {
                        warn!(
                            call_id = %call_id,
                            error = %e,
                            "Could not send 500 after internal fault"
                        );
                        Supervision::SendFailed
                    }
                }
            }
        }
    }
}
