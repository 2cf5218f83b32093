//! Fault containment at the supervision boundary

mod common;

use common::{invite, recording_policy, statuses, Behavior, ScriptedHandler, SIPREC_CONTENT_TYPE};
use recgate::application::{AdmissionPolicy, Dispatched, Dispatcher, Supervisor};
use recgate::domain::{ClassifiedFault, Supervision};
use recgate::infrastructure::protocols::control::ResponseSink;
use tracing_test::traced_test;

async fn supervise(behavior: Behavior, call_id: &str) -> (Supervision, Vec<u16>) {
    let supervisor = Supervisor::new(ScriptedHandler::new(behavior));
    let request = invite(Some(SIPREC_CONTENT_TYPE), call_id);
    let (sink, mut rx) = ResponseSink::detached(request.clone());

    let outcome = supervisor.supervise(request, sink).await;
    (outcome, statuses(&mut rx))
}

#[tokio::test]
async fn test_panicking_handler_gets_exactly_one_500() {
    let (outcome, sent) = supervise(Behavior::Panic, "panic-now").await;
    assert_eq!(outcome, Supervision::Sent);
    assert_eq!(sent, vec![500]);

    let (outcome, sent) = supervise(Behavior::PanicAfterAwait, "panic-later").await;
    assert_eq!(outcome, Supervision::Sent);
    assert_eq!(sent, vec![500]);
}

#[tokio::test]
async fn test_panic_inside_spawned_dispatch_does_not_escape() {
    let handler = ScriptedHandler::new(Behavior::Panic);
    let (policy, exits) = recording_policy();
    let dispatcher = Dispatcher::new(AdmissionPolicy::SiprecOnly, Supervisor::new(handler), policy);

    let request = invite(Some(SIPREC_CONTENT_TYPE), "panic-dispatch");
    let (sink, mut rx) = ResponseSink::detached(request.clone());

    // The join handle resolves normally rather than with a panic
    let outcome = dispatcher.dispatch(request, sink).await.unwrap();
    assert_eq!(outcome, Dispatched::Supervised(Supervision::Sent));
    assert_eq!(statuses(&mut rx), vec![500]);
    assert!(exits.lock().unwrap().is_empty());
}

#[tokio::test]
#[traced_test]
async fn test_protocol_fault_is_logged_and_not_answered() {
    let fault = ClassifiedFault::protocol(487, "Request Terminated");
    let (outcome, sent) = supervise(Behavior::Fault(fault), "cancelled-call").await;

    assert_eq!(outcome, Supervision::ProtocolFaulted { status: 487 });
    assert!(sent.is_empty());
    assert!(logs_contain("protocol fault"));
    assert!(logs_contain("cancelled-call"));
}

#[tokio::test]
async fn test_fault_without_status_is_internal() {
    let (outcome, sent) = supervise(Behavior::Error("rtpengine unreachable"), "no-status").await;
    assert_eq!(outcome, Supervision::Sent);
    assert_eq!(sent, vec![500]);

    let fault = ClassifiedFault::internal("lost media session");
    let (outcome, sent) = supervise(Behavior::Fault(fault), "internal").await;
    assert_eq!(outcome, Supervision::Sent);
    assert_eq!(sent, vec![500]);
}

#[tokio::test]
async fn test_non_failure_status_is_treated_as_internal() {
    let fault = ClassifiedFault::protocol(183, "Session Progress");
    let (outcome, sent) = supervise(Behavior::Fault(fault), "odd-status").await;

    assert_eq!(outcome, Supervision::Sent);
    assert_eq!(sent, vec![500]);
}

#[tokio::test]
#[traced_test]
async fn test_failed_500_is_logged_not_rethrown() {
    // The handler answered first, so the 500 is refused by the sink
    let (outcome, sent) = supervise(Behavior::AnswerThenFail(200), "answered").await;
    assert_eq!(outcome, Supervision::SendFailed);
    assert_eq!(sent, vec![200]);
    assert!(logs_contain("Could not send 500"));

    // Transaction gone before the 500 could be written
    let supervisor = Supervisor::new(ScriptedHandler::new(Behavior::Error("boom")));
    let request = invite(Some(SIPREC_CONTENT_TYPE), "closed");
    let (sink, rx) = ResponseSink::detached(request.clone());
    drop(rx);

    assert_eq!(supervisor.supervise(request, sink).await, Supervision::SendFailed);
}

#[tokio::test]
async fn test_success_sends_nothing_extra() {
    let (outcome, sent) = supervise(Behavior::Answer(200), "ok").await;
    assert_eq!(outcome, Supervision::Succeeded);
    assert_eq!(sent, vec![200]);
}
