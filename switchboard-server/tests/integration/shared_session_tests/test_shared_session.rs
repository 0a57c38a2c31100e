use serde_json::json;
use switchboard_core::{CallMode, Notification};
use switchboard_server::engine::EndpointKind;

use crate::integration::{create_test_hub, init_tracing};
use crate::utils::*;

fn shared_endpoints(t: &crate::integration::TestHub) -> usize {
    t.engine.count(|c| matches!(c, EngineCall::CreateEndpoint(_, EndpointKind::Shared)))
}

#[tokio::test]
async fn test_members_share_one_endpoint() {
    init_tracing();
    let t = create_test_hub(CallMode::SharedSession);
    let alice = t.join("alice").await.unwrap();
    t.join("bob").await.unwrap();
    t.join("carol").await.unwrap();

    assert_eq!(t.engine.live_pipelines(), 1);
    assert_eq!(t.engine.live_endpoints(), 1);
    assert_eq!(shared_endpoints(&t), 1);
    // Sub-sessions are created on first negotiation.
    assert_eq!(t.engine.live_sub_sessions(), 0);

    t.negotiate_offer(&alice, "alice").await.unwrap();
    assert_eq!(t.engine.live_sub_sessions(), 1);
    let master = t.engine.created_sub_sessions()[0];
    assert_eq!(
        t.engine.count(|c| matches!(
            c,
            EngineCall::SetMaster(_, sub) if Some(*sub) == master.sub_session
        )),
        1
    );
}

#[tokio::test]
async fn test_viewer_stream_gets_an_offer_once_the_presenter_publishes() {
    init_tracing();
    let t = create_test_hub(CallMode::SharedSession);
    let alice = t.join("alice").await.unwrap();
    let bob = t.join("bob").await.unwrap();
    t.negotiate_offer(&alice, "alice").await.unwrap();

    let offer = t
        .request(&bob, "negotiateWebRtc", json!({ "userId": "alice" }))
        .await
        .unwrap();
    assert!(offer["sdpOffer"].is_string());

    t.request(
        &bob,
        "processAnswer",
        json!({ "sdpAnswer": client_offer("bob"), "userId": "alice" }),
    )
    .await
    .unwrap();

    assert_eq!(t.engine.live_sub_sessions(), 2);
    assert_eq!(t.engine.count(|c| matches!(c, EngineCall::SetMaster(..))), 1);
    let bob_stream = t.engine.created_sub_sessions()[1];
    assert_eq!(
        t.engine.count(|c| *c == EngineCall::ProcessAnswer(bob_stream)),
        1
    );
}

#[tokio::test]
async fn test_viewer_offer_is_rejected() {
    init_tracing();
    let t = create_test_hub(CallMode::SharedSession);
    t.join("alice").await.unwrap();
    let bob = t.join("bob").await.unwrap();

    let err = t.negotiate_offer(&bob, "bob").await.unwrap_err();
    let err = err.downcast::<switchboard_server::SignalingError>().unwrap();

    assert_eq!(err.code(), "NotPresenterError");
    assert_eq!(t.engine.live_sub_sessions(), 0);
}

#[tokio::test]
async fn test_stream_candidates_carry_the_stream_name() {
    init_tracing();
    let mut t = create_test_hub(CallMode::SharedSession);
    let alice = t.join("alice").await.unwrap();
    let bob = t.join("bob").await.unwrap();
    t.negotiate_offer(&alice, "alice").await.unwrap();
    t.request(&bob, "negotiateWebRtc", json!({ "userId": "cam2" }))
        .await
        .unwrap();
    let cam2 = t.engine.created_sub_sessions()[1];

    assert!(t.engine.emit_candidate(cam2, candidate(3)).await);

    let notification = wait_for_notification(&mut t.signal_rx, &bob, |n| {
        matches!(n, Notification::IceCandidate { .. })
    })
    .await
    .unwrap();
    assert_eq!(
        notification,
        Notification::IceCandidate {
            candidate: candidate(3),
            user_id: Some("cam2".to_string()),
        }
    );
}

#[tokio::test]
async fn test_candidates_buffered_per_stream() {
    init_tracing();
    let t = create_test_hub(CallMode::SharedSession);
    let alice = t.join("alice").await.unwrap();
    let bob = t.join("bob").await.unwrap();
    t.negotiate_offer(&alice, "alice").await.unwrap();

    t.request(
        &bob,
        "iceCandidate",
        json!({ "candidate": candidate(1), "userId": "cam2" }),
    )
    .await
    .unwrap();
    t.request(&bob, "negotiateWebRtc", json!({ "userId": "cam2" }))
        .await
        .unwrap();

    let cam2 = t.engine.created_sub_sessions()[1];
    assert_eq!(t.engine.candidates_for(&cam2), vec![candidate(1)]);
    let presenter = t.engine.created_sub_sessions()[0];
    assert!(t.engine.candidates_for(&presenter).is_empty());
}

#[tokio::test]
async fn test_presenter_leaving_stops_every_viewer() {
    init_tracing();
    let mut t = create_test_hub(CallMode::SharedSession);
    let alice = t.join("alice").await.unwrap();
    let bob = t.join("bob").await.unwrap();
    let carol = t.join("carol").await.unwrap();
    t.negotiate_offer(&alice, "alice").await.unwrap();
    t.request(&bob, "negotiateWebRtc", json!({ "userId": "alice" }))
        .await
        .unwrap();

    t.disconnect(&alice).await;

    for viewer in [&bob, &carol] {
        wait_for_notification(&mut t.signal_rx, viewer, is_stop("presenterLeft"))
            .await
            .unwrap();
    }
    assert_eq!(shared_endpoints(&t), 2);
    assert_eq!(t.engine.live_endpoints(), 1);
    assert_eq!(t.engine.live_sub_sessions(), 0);

    // Bob was promoted and may publish into the new endpoint.
    t.negotiate_offer(&bob, "bob").await.unwrap();
    let master = *t.engine.created_sub_sessions().last().unwrap();
    assert_ne!(master.endpoint, t.engine.created_endpoints()[0]);
    assert_eq!(t.engine.count(|c| matches!(c, EngineCall::SetMaster(..))), 2);
}
