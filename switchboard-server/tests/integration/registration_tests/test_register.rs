use serde_json::json;
use switchboard_core::{CallMode, ConnectionId};

use crate::integration::{create_test_hub, init_tracing};

#[tokio::test]
async fn test_first_joiner_presents_and_later_joiners_view() {
    init_tracing();
    let t = create_test_hub(CallMode::Presenter);

    let alice = ConnectionId::new();
    let result = t
        .request(&alice, "register", json!({ "name": "alice" }))
        .await
        .unwrap();
    assert_eq!(result, json!({ "response": "accepted", "type": "presenter" }));

    let bob = ConnectionId::new();
    let result = t
        .request(&bob, "register", json!({ "name": "bob" }))
        .await
        .unwrap();
    assert_eq!(result, json!({ "response": "accepted", "type": "viewer" }));

    assert_eq!(t.hub.registry().len(), 2);
    assert_eq!(t.engine.live_endpoints(), 2);
}

#[tokio::test]
async fn test_duplicate_name_is_rejected_without_side_effects() {
    init_tracing();
    let t = create_test_hub(CallMode::Presenter);
    t.join("alice").await.unwrap();

    let err = t
        .request(&ConnectionId::new(), "register", json!({ "name": "alice" }))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "validation");
    assert_eq!(err.code(), "DuplicateNameError");
    assert_eq!(t.hub.registry().len(), 1);
    assert_eq!(t.engine.live_endpoints(), 1);
}

#[tokio::test]
async fn test_names_are_case_sensitive() {
    init_tracing();
    let t = create_test_hub(CallMode::Mesh);
    t.join("alice").await.unwrap();
    t.join("Alice").await.unwrap();

    assert_eq!(t.hub.registry().len(), 2);
}

#[tokio::test]
async fn test_connection_registers_only_once() {
    init_tracing();
    let t = create_test_hub(CallMode::Mesh);
    let alice = t.join("alice").await.unwrap();

    let err = t
        .request(&alice, "register", json!({ "name": "alice2" }))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "AlreadyRegisteredError");
    assert!(t.hub.registry().lookup_by_name("alice2").is_none());
}

#[tokio::test]
async fn test_concurrent_registrations_never_share_a_name() {
    init_tracing();
    let t = create_test_hub(CallMode::Presenter);

    let attempts: Vec<_> = (0..8)
        .map(|_| {
            let hub = t.hub.clone();
            tokio::spawn(async move {
                hub.on_event(&ConnectionId::new(), "register", json!({ "name": "contested" }))
                    .await
                    .is_ok()
            })
        })
        .collect();

    let mut winners = 0;
    for attempt in attempts {
        if attempt.await.unwrap() {
            winners += 1;
        }
    }

    assert_eq!(winners, 1);
    assert_eq!(t.hub.registry().len(), 1);
    assert_eq!(t.engine.live_endpoints(), 1);
}

#[tokio::test]
async fn test_name_is_free_again_after_disconnect() {
    init_tracing();
    let t = create_test_hub(CallMode::Presenter);
    let alice = t.join("alice").await.unwrap();

    t.disconnect(&alice).await;

    let again = t.join("alice").await.unwrap();
    assert_eq!(
        t.hub.registry().lookup_by_name("alice").unwrap().connection_id,
        again
    );
}

#[tokio::test]
async fn test_rooms_are_independent() {
    init_tracing();
    let t = create_test_hub(CallMode::Presenter);

    let red = ConnectionId::new();
    let result = t
        .request(&red, "register", json!({ "name": "red", "room": "one" }))
        .await
        .unwrap();
    assert_eq!(result["type"], "presenter");

    let blue = ConnectionId::new();
    let result = t
        .request(&blue, "register", json!({ "name": "blue", "room": "two" }))
        .await
        .unwrap();
    assert_eq!(result["type"], "presenter");

    assert_eq!(t.hub.rooms().room_count(), 2);
    assert_eq!(t.engine.live_pipelines(), 2);
    assert!(t.engine.connections().is_empty());
}
