use serde_json::json;
use std::sync::Arc;
use switchboard_core::{CallMode, ConnectionId};
use switchboard_server::engine::{EndpointKind, EngineConfig, MediaEngine, MediaTarget};
use switchboard_server::{SignalingHub, WebRtcEngine};

use crate::integration::{init_tracing, test_config};
use crate::utils::*;

fn offline_engine() -> WebRtcEngine {
    WebRtcEngine::new(EngineConfig {
        ice_servers: vec![],
    })
    .unwrap()
}

#[tokio::test]
async fn test_client_offer_gets_an_applicable_answer() {
    init_tracing();
    let engine = offline_engine();
    let pipeline = engine.create_pipeline().await.unwrap();
    let endpoint = engine
        .create_endpoint(&pipeline, EndpointKind::WebRtc)
        .await
        .unwrap();
    let client = TestClient::new(ClientMedia::SendVideo).await.unwrap();

    let offer = client.create_offer().await.unwrap();
    let answer = engine
        .process_offer(&MediaTarget::endpoint(endpoint), &offer)
        .await
        .unwrap();

    client.apply_answer(answer).await.unwrap();
    client.close().await.unwrap();
    engine.release_pipeline(&pipeline).await.unwrap();
}

#[tokio::test]
async fn test_server_offer_round_trip() {
    init_tracing();
    let engine = offline_engine();
    let pipeline = engine.create_pipeline().await.unwrap();
    let endpoint = engine
        .create_endpoint(&pipeline, EndpointKind::WebRtc)
        .await
        .unwrap();
    let target = MediaTarget::endpoint(endpoint);
    let client = TestClient::new(ClientMedia::ReceiveVideo).await.unwrap();

    // First cycle is client-offered, the second one server-offered.
    let offer = client.create_offer().await.unwrap();
    let answer = engine.process_offer(&target, &offer).await.unwrap();
    client.apply_answer(answer).await.unwrap();

    let server_offer = engine.generate_offer(&target).await.unwrap();
    let client_answer = client.answer_offer(server_offer).await.unwrap();
    engine.process_answer(&target, &client_answer).await.unwrap();

    assert!(!engine.is_negotiation_needed(&target).await.unwrap());
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_sub_session_negotiates_like_an_endpoint() {
    init_tracing();
    let engine = offline_engine();
    let pipeline = engine.create_pipeline().await.unwrap();
    let shared = engine
        .create_endpoint(&pipeline, EndpointKind::Shared)
        .await
        .unwrap();
    let sub_session = engine.create_sub_session(&shared).await.unwrap();
    engine
        .set_master_sub_session(&shared, &sub_session)
        .await
        .unwrap();
    let client = TestClient::new(ClientMedia::SendVideo).await.unwrap();

    let offer = client.create_offer().await.unwrap();
    let answer = engine
        .process_offer(&MediaTarget::sub_session(shared, sub_session), &offer)
        .await
        .unwrap();
    client.apply_answer(answer).await.unwrap();

    engine.release_endpoint(&shared).await.unwrap();
    assert!(
        engine
            .set_target_bitrate(&shared, &sub_session, 240_000)
            .await
            .is_err()
    );
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_loopback_hub_over_real_engine() {
    init_tracing();
    let (signaling, _signal_rx) = MockSignalingOutput::new();
    let hub = SignalingHub::new(
        CallMode::Loopback,
        Arc::new(offline_engine()),
        Arc::new(signaling),
        &test_config(),
    );
    let alice = ConnectionId::new();
    hub.on_event(&alice, "register", json!({ "name": "alice" }))
        .await
        .unwrap();
    let client = TestClient::new(ClientMedia::SendVideo).await.unwrap();

    let offer = client.create_offer().await.unwrap();
    let result = hub
        .on_event(&alice, "negotiateWebRtc", json!({ "sdpOffer": offer }))
        .await
        .unwrap();
    client
        .apply_answer(result["sdpAnswer"].as_str().unwrap().to_string())
        .await
        .unwrap();

    hub.on_event(&alice, "stop", json!({})).await.unwrap();
    assert!(eventually(|| hub.rooms().room_count() == 0).await);
    client.close().await.unwrap();
}
