use serde_json::json;
use switchboard_core::{CallMode, ConnectionId};

use crate::integration::{create_test_hub, init_tracing};
use crate::utils::*;

fn endpoint_releases(t: &crate::integration::TestHub) -> usize {
    t.engine.count(|c| matches!(c, EngineCall::ReleaseEndpoint(_)))
}

#[tokio::test]
async fn test_stop_then_disconnect_releases_once() {
    init_tracing();
    let t = create_test_hub(CallMode::Mesh);
    let alice = t.join("alice").await.unwrap();
    t.join("bob").await.unwrap();

    t.request(&alice, "stop", json!({})).await.unwrap();
    t.disconnect(&alice).await;

    assert_eq!(endpoint_releases(&t), 1);
    assert_eq!(t.engine.live_endpoints(), 1);
}

#[tokio::test]
async fn test_disconnect_then_stop_releases_once() {
    init_tracing();
    let t = create_test_hub(CallMode::Mesh);
    let alice = t.join("alice").await.unwrap();
    t.join("bob").await.unwrap();

    t.disconnect(&alice).await;
    t.request(&alice, "stop", json!({})).await.unwrap();
    t.disconnect(&alice).await;

    assert_eq!(endpoint_releases(&t), 1);
}

#[tokio::test]
async fn test_concurrent_stop_and_disconnect() {
    init_tracing();
    let t = create_test_hub(CallMode::Presenter);
    let alice = t.join("alice").await.unwrap();
    t.join("bob").await.unwrap();

    let hub = t.hub.clone();
    let id = alice.clone();
    let stop = tokio::spawn(async move { hub.on_event(&id, "stop", json!({})).await });
    t.disconnect(&alice).await;
    stop.await.unwrap().unwrap();

    assert_eq!(endpoint_releases(&t), 1);
    assert!(t.hub.registry().lookup_by_connection(&alice).is_none());
}

#[tokio::test]
async fn test_closing_unknown_connection_is_harmless() {
    init_tracing();
    let t = create_test_hub(CallMode::Presenter);
    t.join("alice").await.unwrap();

    t.disconnect(&ConnectionId::new()).await;

    assert_eq!(t.hub.registry().len(), 1);
    assert!(t.engine.calls().iter().all(|c| !matches!(
        c,
        EngineCall::ReleaseEndpoint(_) | EngineCall::ReleasePipeline(_)
    )));
}
