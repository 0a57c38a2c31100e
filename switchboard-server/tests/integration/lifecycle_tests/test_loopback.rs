use serde_json::json;
use switchboard_core::CallMode;

use crate::integration::{create_test_hub, init_tracing};
use crate::utils::*;

#[tokio::test]
async fn test_endpoint_is_connected_to_itself() {
    init_tracing();
    let t = create_test_hub(CallMode::Loopback);
    let alice = t.join("alice").await.unwrap();

    let endpoint = t.engine.created_endpoints()[0];
    assert_eq!(t.engine.connections(), vec![(endpoint, endpoint)]);

    let answer = t.negotiate_offer(&alice, "alice").await.unwrap();
    assert!(answer["sdpAnswer"].is_string());
}

#[tokio::test]
async fn test_each_connection_gets_its_own_room() {
    init_tracing();
    let t = create_test_hub(CallMode::Loopback);

    // The room name is ignored.
    t.join_room("alice", Some("shared")).await.unwrap();
    t.join_room("bob", Some("shared")).await.unwrap();

    assert_eq!(t.hub.rooms().room_count(), 2);
    assert_eq!(t.engine.live_pipelines(), 2);
    assert_eq!(t.engine.connections().len(), 2);
}

#[tokio::test]
async fn test_stop_tears_the_room_down() {
    init_tracing();
    let t = create_test_hub(CallMode::Loopback);
    let alice = t.join("alice").await.unwrap();

    t.request(&alice, "stop", json!({})).await.unwrap();

    assert_eq!(t.engine.live_pipelines(), 0);
    assert_eq!(t.engine.live_endpoints(), 0);
    assert!(eventually(|| t.hub.rooms().room_count() == 0).await);
}
