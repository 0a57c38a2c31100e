use serde_json::json;
use switchboard_core::{CallMode, Notification};

use crate::integration::{create_test_hub, init_tracing};
use crate::utils::*;

#[tokio::test]
async fn test_rejected_call_creates_nothing() {
    init_tracing();
    let t = create_test_hub(CallMode::OneToOne);
    let alice = t.join("alice").await.unwrap();
    let bob = t.join("bob").await.unwrap();
    t.signaling.script_calls(
        &bob,
        CallScript::Respond(json!({ "response": "REJECTED", "message": "busy" })),
    );

    let result = t
        .request(&alice, "call", json!({ "to": "bob" }))
        .await
        .unwrap();

    assert_eq!(result, json!({ "response": "REJECTED", "message": "busy" }));
    assert_eq!(
        t.engine.count(|c| matches!(c, EngineCall::CreatePipeline(_))),
        0
    );
}

#[tokio::test]
async fn test_unknown_callee_fails() {
    init_tracing();
    let t = create_test_hub(CallMode::OneToOne);
    let alice = t.join("alice").await.unwrap();

    let result = t
        .request(&alice, "call", json!({ "to": "nobody" }))
        .await
        .unwrap();

    assert_eq!(result["response"], "FAILED");
    assert_eq!(result["message"], "user nobody is not registered");
}

#[tokio::test]
async fn test_calling_yourself_fails() {
    init_tracing();
    let t = create_test_hub(CallMode::OneToOne);
    let alice = t.join("alice").await.unwrap();

    let result = t
        .request(&alice, "call", json!({ "to": "alice" }))
        .await
        .unwrap();

    assert_eq!(result["response"], "FAILED");
    assert!(t.signaling.requests_for(&alice).is_empty());
}

#[tokio::test]
async fn test_unreachable_and_silent_callees_fail() {
    init_tracing();
    let t = create_test_hub(CallMode::OneToOne);
    let alice = t.join("alice").await.unwrap();
    let bob = t.join("bob").await.unwrap();
    let carol = t.join("carol").await.unwrap();
    t.signaling.script_calls(&bob, CallScript::Unreachable);
    t.signaling.script_calls(&carol, CallScript::Silent);

    let result = t
        .request(&alice, "call", json!({ "to": "bob" }))
        .await
        .unwrap();
    assert_eq!(result["response"], "FAILED");
    assert_eq!(result["message"], "user bob is unreachable");

    let result = t
        .request(&alice, "call", json!({ "to": "carol" }))
        .await
        .unwrap();
    assert_eq!(result["response"], "FAILED");

    assert_eq!(t.engine.live_pipelines(), 0);
}

#[tokio::test]
async fn test_garbled_answer_counts_as_failed() {
    init_tracing();
    let t = create_test_hub(CallMode::OneToOne);
    let alice = t.join("alice").await.unwrap();
    let bob = t.join("bob").await.unwrap();
    t.signaling
        .script_calls(&bob, CallScript::Respond(json!({ "response": "MAYBE" })));

    let result = t
        .request(&alice, "call", json!({ "to": "bob" }))
        .await
        .unwrap();

    assert_eq!(result["response"], "FAILED");
    assert_eq!(t.engine.live_pipelines(), 0);
}

#[tokio::test]
async fn test_busy_callee_is_reported() {
    init_tracing();
    let t = create_test_hub(CallMode::OneToOne);
    let alice = t.join("alice").await.unwrap();
    let bob = t.join("bob").await.unwrap();
    let carol = t.join("carol").await.unwrap();
    t.request(&alice, "call", json!({ "to": "bob" })).await.unwrap();

    let err = t
        .request(&carol, "call", json!({ "to": "bob" }))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "PeerBusyError");
    assert!(err.client_message().contains("bob"));
    assert_eq!(t.engine.live_pipelines(), 1);
    assert!(t.signaling.notifications_for(&bob).is_empty());
}

#[tokio::test]
async fn test_endpoint_failure_rolls_back_the_call() {
    init_tracing();
    let mut t = create_test_hub(CallMode::OneToOne);
    let alice = t.join("alice").await.unwrap();
    let bob = t.join("bob").await.unwrap();
    t.engine.fail(FailPoint::CreateEndpoint);

    let err = t
        .request(&alice, "call", json!({ "to": "bob" }))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "engine");
    assert_eq!(err.code(), "EngineSetupError");
    assert_eq!(t.engine.live_pipelines(), 0);
    wait_for_notification(&mut t.signal_rx, &bob, is_stop("callFailed"))
        .await
        .unwrap();

    // The pair is free again.
    t.engine.heal(FailPoint::CreateEndpoint);
    let result = t
        .request(&alice, "call", json!({ "to": "bob" }))
        .await
        .unwrap();
    assert_eq!(result["response"], "ACCEPTED");
}

#[tokio::test]
async fn test_rejected_sdp_ends_the_call() {
    init_tracing();
    let mut t = create_test_hub(CallMode::OneToOne);
    let alice = t.join("alice").await.unwrap();
    let bob = t.join("bob").await.unwrap();
    t.request(&alice, "call", json!({ "to": "bob" })).await.unwrap();

    let err = t
        .request(&alice, "negotiateWebRtc", json!({ "sdpOffer": "garbage" }))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "EngineNegotiationError");
    wait_for_notification(&mut t.signal_rx, &bob, is_stop("negotiationFailed"))
        .await
        .unwrap();
    assert_eq!(t.engine.live_pipelines(), 0);
    assert!(
        !t.signaling
            .notifications_for(&alice)
            .iter()
            .any(|n| matches!(n, Notification::StopMediaSession { .. }))
    );
}

#[tokio::test]
async fn test_negotiating_outside_a_call_is_rejected() {
    init_tracing();
    let t = create_test_hub(CallMode::OneToOne);
    let alice = t.join("alice").await.unwrap();

    let err = t.negotiate_offer(&alice, "alice").await.unwrap_err();
    let err = err.downcast::<switchboard_server::SignalingError>().unwrap();

    assert_eq!(err.code(), "NotInCallError");
}
