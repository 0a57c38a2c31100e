pub mod registration_tests;

use anyhow::{Context, Result};
use serde_json::{Value, json};
use std::sync::Arc;
use switchboard_core::{CallMode, ConnectionId};
use switchboard_server::{Config, SignalingError, SignalingHub};
use tokio::sync::mpsc;
use tracing::Level;

use crate::utils::{MockMediaEngine, MockSignalingOutput, SignalMessage};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn test_config() -> Config {
    Config {
        call_timeout_ms: 200,
        ..Config::default()
    }
}

/// One hub wired to a mock engine and a capturing transport.
pub struct TestHub {
    pub hub: Arc<SignalingHub>,
    pub engine: MockMediaEngine,
    pub signaling: MockSignalingOutput,
    pub signal_rx: mpsc::UnboundedReceiver<SignalMessage>,
}

pub fn create_test_hub(mode: CallMode) -> TestHub {
    let engine = MockMediaEngine::new();
    let (signaling, signal_rx) = MockSignalingOutput::new();
    let hub = SignalingHub::new(
        mode,
        Arc::new(engine.clone()),
        Arc::new(signaling.clone()),
        &test_config(),
    );

    TestHub {
        hub: Arc::new(hub),
        engine,
        signaling,
        signal_rx,
    }
}

impl TestHub {
    pub async fn request(
        &self,
        connection_id: &ConnectionId,
        method: &str,
        params: Value,
    ) -> Result<Value, SignalingError> {
        self.hub.on_event(connection_id, method, params).await
    }

    /// Opens a connection and registers it under `name`.
    pub async fn join(&self, name: &str) -> Result<ConnectionId> {
        self.join_room(name, None).await
    }

    pub async fn join_room(&self, name: &str, room: Option<&str>) -> Result<ConnectionId> {
        let id = ConnectionId::new();
        self.hub.on_connection_opened(&id);
        self.request(&id, "register", json!({ "name": name, "room": room }))
            .await
            .with_context(|| format!("Failed to register {name}"))?;
        Ok(id)
    }

    pub async fn negotiate_offer(&self, id: &ConnectionId, label: &str) -> Result<Value> {
        let offer = crate::utils::client_offer(label);
        self.request(id, "negotiateWebRtc", json!({ "sdpOffer": offer }))
            .await
            .with_context(|| format!("Negotiation of {label} failed"))
    }

    pub async fn disconnect(&self, id: &ConnectionId) {
        self.hub.on_connection_closed(id).await;
    }
}
