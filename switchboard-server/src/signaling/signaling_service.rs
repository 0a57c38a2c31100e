use crate::error::DeliveryError;
use crate::signaling::SignalingOutput;
use async_trait::async_trait;
use axum::extract::ws::Message;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use switchboard_core::{
    ConnectionId, IceServerConfig, Notification, PeerRequest, ResponseBody, ServerMessage,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

struct PendingRequest {
    connection_id: ConnectionId,
    respond_to: oneshot::Sender<ResponseBody>,
}

struct SignalingInner {
    peers: DashMap<ConnectionId, mpsc::UnboundedSender<Message>>,
    pending: DashMap<u64, PendingRequest>,
    next_request_id: AtomicU64,
    ice_servers: Vec<IceServerConfig>,
}

/// Open WebSocket connections and the server requests awaiting an answer.
///
/// Each connection is written by a single task draining its queue, so
/// messages to one connection never interleave.
#[derive(Clone)]
pub struct SignalingService {
    inner: Arc<SignalingInner>,
}

impl SignalingService {
    pub fn new(ice_servers: Vec<IceServerConfig>) -> Self {
        Self {
            inner: Arc::new(SignalingInner {
                peers: DashMap::new(),
                pending: DashMap::new(),
                next_request_id: AtomicU64::new(1),
                ice_servers,
            }),
        }
    }

    pub fn ice_servers(&self) -> Vec<IceServerConfig> {
        self.inner.ice_servers.clone()
    }

    pub fn add_peer(&self, connection_id: ConnectionId, tx: mpsc::UnboundedSender<Message>) {
        self.inner.peers.insert(connection_id, tx);
    }

    /// Forgets the connection and fails its outstanding requests.
    pub fn remove_peer(&self, connection_id: &ConnectionId) {
        self.inner.peers.remove(connection_id);
        self.inner
            .pending
            .retain(|_, pending| &pending.connection_id != connection_id);
    }

    pub fn peer_count(&self) -> usize {
        self.inner.peers.len()
    }

    pub fn send(
        &self,
        connection_id: &ConnectionId,
        message: &ServerMessage,
    ) -> Result<(), DeliveryError> {
        let Some(peer) = self.inner.peers.get(connection_id) else {
            return Err(DeliveryError::ConnectionClosed);
        };
        let json = serde_json::to_string(message).map_err(|e| {
            error!("Failed to serialize server message: {}", e);
            DeliveryError::Serialization(e.to_string())
        })?;
        peer.send(Message::Text(json.into()))
            .map_err(|_| DeliveryError::ConnectionClosed)
    }

    pub fn send_response(&self, connection_id: &ConnectionId, response: ResponseBody) {
        if let Err(e) = self.send(connection_id, &ServerMessage::Response(response)) {
            warn!("Response to {} not delivered: {}", connection_id, e);
        }
    }

    /// Hands a client response to the request waiting for it. Responses for
    /// unknown ids, or sent by another connection, are dropped.
    pub fn resolve_response(&self, connection_id: &ConnectionId, response: ResponseBody) -> bool {
        let Some((_, pending)) = self
            .inner
            .pending
            .remove_if(&response.id, |_, p| &p.connection_id == connection_id)
        else {
            warn!(
                "Unexpected response {} from {}",
                response.id, connection_id
            );
            return false;
        };
        pending.respond_to.send(response).is_ok()
    }
}

#[async_trait]
impl SignalingOutput for SignalingService {
    async fn notify(
        &self,
        connection_id: &ConnectionId,
        notification: Notification,
    ) -> Result<(), DeliveryError> {
        self.send(connection_id, &ServerMessage::Notification(notification))
    }

    async fn request(
        &self,
        connection_id: &ConnectionId,
        request: PeerRequest,
        timeout: Duration,
    ) -> Result<Value, DeliveryError> {
        let id = self.inner.next_request_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.inner.pending.insert(
            id,
            PendingRequest {
                connection_id: connection_id.clone(),
                respond_to: tx,
            },
        );

        if let Err(e) = self.send(connection_id, &ServerMessage::Request { id, request }) {
            self.inner.pending.remove(&id);
            return Err(e);
        }
        debug!("Request {} sent to {}", id, connection_id);

        let response = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(DeliveryError::ConnectionClosed),
            Err(_) => {
                self.inner.pending.remove(&id);
                return Err(DeliveryError::Timeout(timeout.as_millis() as u64));
            }
        };

        match (response.result, response.error) {
            (Some(result), None) => Ok(result),
            (_, Some(error)) => Err(DeliveryError::MalformedResponse(format!(
                "{}: {}",
                error.code, error.message
            ))),
            (None, None) => Err(DeliveryError::MalformedResponse(
                "response without result".to_string(),
            )),
        }
    }
}
