use serde_json::json;
use switchboard_core::CallMode;

use crate::integration::{TestHub, create_test_hub, init_tracing};
use crate::utils::*;

/// Presenter publishing, bob watching on stream `alice`.
async fn watching_session() -> (TestHub, switchboard_core::ConnectionId) {
    let t = create_test_hub(CallMode::SharedSession);
    let alice = t.join("alice").await.unwrap();
    let bob = t.join("bob").await.unwrap();
    t.negotiate_offer(&alice, "alice").await.unwrap();
    t.request(&bob, "negotiateWebRtc", json!({ "userId": "alice" }))
        .await
        .unwrap();
    (t, bob)
}

#[tokio::test]
async fn test_switch_quality_alternates_tiers() {
    init_tracing();
    let (t, bob) = watching_session().await;
    let stream = t.engine.created_sub_sessions()[1];
    let sub_session = stream.sub_session.unwrap();

    let result = t
        .request(&bob, "switchQuality", json!({ "userId": "alice" }))
        .await
        .unwrap();
    assert_eq!(result, json!({ "quality": "low", "bitrate": 240_000 }));

    let result = t
        .request(&bob, "switchQuality", json!({ "userId": "alice" }))
        .await
        .unwrap();
    assert_eq!(result, json!({ "quality": "high", "bitrate": 2_000_000 }));

    assert_eq!(t.engine.bitrates(&sub_session), vec![240_000, 2_000_000]);
}

#[tokio::test]
async fn test_switch_quality_on_unknown_stream() {
    init_tracing();
    let (t, bob) = watching_session().await;

    let err = t
        .request(&bob, "switchQuality", json!({ "userId": "nobody" }))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "UnknownStreamError");
}

#[tokio::test]
async fn test_stop_user_session_releases_one_stream() {
    init_tracing();
    let (t, bob) = watching_session().await;
    t.request(&bob, "negotiateWebRtc", json!({ "userId": "cam2" }))
        .await
        .unwrap();
    assert_eq!(t.engine.live_sub_sessions(), 3);

    t.request(&bob, "stopUserSession", json!({ "userId": "cam2" }))
        .await
        .unwrap();
    assert_eq!(t.engine.live_sub_sessions(), 2);

    let err = t
        .request(&bob, "stopUserSession", json!({ "userId": "cam2" }))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "UnknownStreamError");

    // The other stream is untouched.
    t.request(&bob, "switchQuality", json!({ "userId": "alice" }))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_stream_methods_need_a_shared_session() {
    init_tracing();
    let t = create_test_hub(CallMode::Presenter);
    t.join("alice").await.unwrap();
    let bob = t.join("bob").await.unwrap();

    let err = t
        .request(&bob, "switchQuality", json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "UnsupportedInModeError");

    let err = t
        .request(&bob, "stopUserSession", json!({ "userId": "alice" }))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "UnsupportedInModeError");
}

#[tokio::test]
async fn test_viewer_leaving_releases_its_sub_sessions() {
    init_tracing();
    let (t, bob) = watching_session().await;
    t.request(&bob, "negotiateWebRtc", json!({ "userId": "cam2" }))
        .await
        .unwrap();

    t.disconnect(&bob).await;

    assert_eq!(t.engine.live_sub_sessions(), 1);
    assert_eq!(t.engine.live_endpoints(), 1);
}

#[tokio::test]
async fn test_failed_stream_negotiation_leaves_no_sub_session() {
    init_tracing();
    let (t, bob) = watching_session().await;
    t.engine.fail(FailPoint::GenerateOffer);

    let err = t
        .request(&bob, "negotiateWebRtc", json!({ "userId": "cam2" }))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "EngineNegotiationError");
    assert_eq!(t.engine.live_sub_sessions(), 2);
}
