//! Per-transaction response sink

use super::frame::Frame;
use crate::domain::SinkError;
use crate::infrastructure::protocols::sip::{ResponseBuilder, SipRequest};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Final status not yet sent
const OPEN: u16 = 0;

/// Write-once capability to answer one inbound request.
///
/// Provisional responses may be sent any number of times until the first
/// final response; after that every send fails with
/// [`SinkError::AlreadyFinalized`]. Clones share the same transaction.
#[derive(Clone)]
pub struct ResponseSink {
    inner: Arc<SinkInner>,
}

struct SinkInner {
    request: SipRequest,
    outbound: mpsc::Sender<Frame>,
    final_status: AtomicU16,
}

impl ResponseSink {
    pub fn new(request: SipRequest, outbound: mpsc::Sender<Frame>) -> Self {
        Self {
            inner: Arc::new(SinkInner {
                request,
                outbound,
                final_status: AtomicU16::new(OPEN),
            }),
        }
    }

    /// A sink with its own outbound queue, for driving handlers outside a
    /// live connection.
    pub fn detached(request: SipRequest) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(16);
        (Self::new(request, tx), rx)
    }

    pub fn request(&self) -> &SipRequest {
        &self.inner.request
    }

    pub fn call_id(&self) -> String {
        self.inner.request.call_id().unwrap_or_default()
    }

    /// Status of the final response, if one was sent
    pub fn final_status(&self) -> Option<u16> {
        match self.inner.final_status.load(Ordering::Acquire) {
            OPEN => None,
            status => Some(status),
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.final_status().is_some()
    }

    /// Send a bodiless response with `status`
    pub async fn send(&self, status: u16) -> Result<(), SinkError> {
        self.send_response(ResponseBuilder::new(status)).await
    }

    pub async fn send_response(&self, builder: ResponseBuilder) -> Result<(), SinkError> {
        let status = builder.status_code();
        let response = builder
            .build_for_request(&self.inner.request)
            .map_err(|e| SinkError::Build(e.to_string()))?;

        if status >= 200 {
            self.inner
                .final_status
                .compare_exchange(OPEN, status, Ordering::AcqRel, Ordering::Acquire)
                .map_err(SinkError::AlreadyFinalized)?;
        } else if let Some(previous) = self.final_status() {
            return Err(SinkError::AlreadyFinalized(previous));
        }

        debug!(call_id = %self.call_id(), status, "Sending response");
        self.inner
            .outbound
            .send(Frame::Sip(response.to_bytes()))
            .await
            .map_err(|_| SinkError::TransactionClosed)
    }
}

impl std::fmt::Debug for ResponseSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseSink")
            .field("call_id", &self.call_id())
            .field("final_status", &self.final_status())
            .finish()
    }
}
