//! Shared fixtures for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use recgate::application::{CallHandler, FaultPolicy};
use recgate::domain::{ClassifiedFault, Outcome};
use recgate::infrastructure::protocols::control::{Frame, ResponseSink};
use recgate::infrastructure::protocols::sip::{SipRequest, SipResponse};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const SIPREC_CONTENT_TYPE: &str = "multipart/mixed;boundary=x";

pub fn invite_text(content_type: Option<&str>, call_id: &str) -> String {
    let ctype = content_type
        .map(|ct| format!("Content-Type: {}\r\n", ct))
        .unwrap_or_default();
    format!(
        "INVITE sip:srs@recorder.example.com SIP/2.0\r\n\
         Via: SIP/2.0/UDP 192.168.1.100:5060;branch=z9hG4bK776asdhds\r\n\
         From: <sip:src@example.com>;tag=1928301774\r\n\
         To: <sip:srs@recorder.example.com>\r\n\
         Call-ID: {}\r\n\
         CSeq: 1 INVITE\r\n\
         {}Content-Length: 0\r\n\r\n",
        call_id, ctype
    )
}

pub fn invite(content_type: Option<&str>, call_id: &str) -> SipRequest {
    SipRequest::parse(invite_text(content_type, call_id).as_bytes()).unwrap()
}

pub fn request(method: &str, call_id: &str) -> SipRequest {
    let raw = format!(
        "{method} sip:srs@recorder.example.com SIP/2.0\r\n\
         Via: SIP/2.0/UDP 192.168.1.100:5060;branch=z9hG4bK776asdhds\r\n\
         From: <sip:src@example.com>;tag=1928301774\r\n\
         To: <sip:srs@recorder.example.com>\r\n\
         Call-ID: {call_id}\r\n\
         CSeq: 2 {method}\r\n\
         Content-Length: 0\r\n\r\n"
    );
    SipRequest::parse(raw.as_bytes()).unwrap()
}

pub fn status_of(frame: Frame) -> u16 {
    match frame {
        Frame::Sip(raw) => SipResponse::parse(&raw).unwrap().status_code(),
        other => panic!("unexpected frame {:?}", other),
    }
}

/// Every status written to the sink's queue so far
pub fn statuses(rx: &mut mpsc::Receiver<Frame>) -> Vec<u16> {
    let mut out = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        out.push(status_of(frame));
    }
    out
}

/// Policy whose exit function records the status instead of exiting
pub fn recording_policy() -> (FaultPolicy, Arc<Mutex<Vec<i32>>>) {
    let exits = Arc::new(Mutex::new(Vec::new()));
    let recorded = exits.clone();
    let policy = FaultPolicy::new(Arc::new(move |code| recorded.lock().unwrap().push(code)));
    (policy, exits)
}

/// What the scripted handler does when invoked
#[derive(Clone)]
pub enum Behavior {
    Answer(u16),
    Panic,
    PanicAfterAwait,
    Fault(ClassifiedFault),
    Error(&'static str),
    /// Sends a final response, then reports an internal fault anyway
    AnswerThenFail(u16),
}

/// Handler that records every request it receives
pub struct ScriptedHandler {
    behavior: Behavior,
    calls: AtomicUsize,
    seen: Mutex<Vec<SipRequest>>,
    terminated: Mutex<Vec<String>>,
}

impl ScriptedHandler {
    pub fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            terminated: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<SipRequest> {
        self.seen.lock().unwrap().clone()
    }

    /// Call-IDs of every dialog torn down
    pub fn terminated(&self) -> Vec<String> {
        self.terminated.lock().unwrap().clone()
    }
}

#[async_trait]
impl CallHandler for ScriptedHandler {
    async fn handle(&self, request: SipRequest, sink: ResponseSink) -> Outcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(request);

        match self.behavior.clone() {
            Behavior::Answer(status) => {
                sink.send(status).await.unwrap();
                Ok(())
            }
            Behavior::Panic => panic!("handler blew up"),
            Behavior::PanicAfterAwait => {
                tokio::time::sleep(Duration::from_millis(5)).await;
                panic!("handler blew up later")
            }
            Behavior::Fault(fault) => Err(fault),
            Behavior::Error(message) => Err(anyhow::anyhow!(message).into()),
            Behavior::AnswerThenFail(status) => {
                sink.send(status).await.unwrap();
                Err(ClassifiedFault::internal("cleanup failed after answering"))
            }
        }
    }

    async fn terminate(&self, request: &SipRequest) -> anyhow::Result<()> {
        self.terminated
            .lock()
            .unwrap()
            .push(request.call_id().unwrap_or_default());
        match self.behavior {
            Behavior::Error(message) => Err(anyhow::anyhow!(message)),
            _ => Ok(()),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Handler that fails internally and whose name cannot be read, so the
/// boundary's own error logging panics outside the handler scope
pub struct UnnamedHandler;

#[async_trait]
impl CallHandler for UnnamedHandler {
    async fn handle(&self, _request: SipRequest, _sink: ResponseSink) -> Outcome {
        Err(ClassifiedFault::internal("media relay unreachable"))
    }

    fn name(&self) -> &'static str {
        panic!("handler name unavailable")
    }
}
