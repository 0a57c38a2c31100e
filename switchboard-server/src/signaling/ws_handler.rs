use crate::config::Config;
use crate::engine::MediaEngine;
use crate::signaling::{SignalingHub, SignalingService};
use axum::routing::get;
use axum::{Json, Router};
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use switchboard_core::{CallMode, ClientMessage, ConnectionId, RequestBody, ResponseBody};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub service: SignalingService,
    pub hubs: Arc<HashMap<CallMode, Arc<SignalingHub>>>,
}

impl AppState {
    pub fn new(service: SignalingService, hubs: impl IntoIterator<Item = SignalingHub>) -> Self {
        let hubs = hubs
            .into_iter()
            .map(|hub| (hub.mode(), Arc::new(hub)))
            .collect();
        Self {
            service,
            hubs: Arc::new(hubs),
        }
    }

    /// One hub per call mode, all sharing the engine and the connections.
    pub fn for_all_modes(config: &Config, engine: Arc<dyn MediaEngine>) -> Self {
        let service = SignalingService::new(config.ice_server_config());
        let output = Arc::new(service.clone());
        let hubs: Vec<SignalingHub> = CallMode::ALL
            .into_iter()
            .map(|mode| SignalingHub::new(mode, engine.clone(), output.clone(), config))
            .collect();
        Self::new(service, hubs)
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws/{mode}", get(ws_handler))
        .route("/ice-servers", get(ice_servers_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// `GET /ws/{mode}`
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(mode): Path<String>,
    State(state): State<AppState>,
) -> Response {
    let hub = mode
        .parse::<CallMode>()
        .ok()
        .and_then(|mode| state.hubs.get(&mode).cloned());
    let Some(hub) = hub else {
        warn!("Rejected WebSocket for unknown mode '{}'", mode);
        return (StatusCode::NOT_FOUND, format!("unknown call mode '{mode}'")).into_response();
    };

    ws.on_upgrade(move |socket| handle_socket(socket, hub, state.service))
}

/// `GET /ice-servers`
pub async fn ice_servers_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.service.ice_servers())
}

/// Splits one connection's inbound frames: answers to server requests
/// resolve at once, client requests run one at a time in arrival order.
pub struct InboundRouter {
    connection_id: ConnectionId,
    service: SignalingService,
    requests: mpsc::UnboundedSender<RequestBody>,
}

impl InboundRouter {
    pub fn spawn(
        hub: Arc<SignalingHub>,
        service: SignalingService,
        connection_id: ConnectionId,
    ) -> (Self, JoinHandle<()>) {
        let (requests, mut queue) = mpsc::unbounded_channel::<RequestBody>();

        let worker = tokio::spawn({
            let service = service.clone();
            let connection_id = connection_id.clone();
            async move {
                while let Some(request) = queue.recv().await {
                    let response = handle_request(&hub, &connection_id, request).await;
                    service.send_response(&connection_id, response);
                }
            }
        });

        let router = Self {
            connection_id,
            service,
            requests,
        };
        (router, worker)
    }

    pub fn route(&self, text: &str) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(ClientMessage::Request(request)) => {
                if self.requests.send(request).is_err() {
                    warn!("Request worker of {} is gone", self.connection_id);
                }
            }
            Ok(ClientMessage::Response(response)) => {
                self.service.resolve_response(&self.connection_id, response);
            }
            Err(e) => warn!("Invalid message from {}: {}", self.connection_id, e),
        }
    }
}

async fn handle_request(
    hub: &SignalingHub,
    connection_id: &ConnectionId,
    request: RequestBody,
) -> ResponseBody {
    match hub.on_event(connection_id, &request.method, request.params).await {
        Ok(result) => ResponseBody::ok(request.id, result),
        Err(e) => {
            match e.kind() {
                "engine" | "internal" => {
                    error!("{} from {} failed: {}", request.method, connection_id, e)
                }
                _ => debug!("{} from {} rejected: {}", request.method, connection_id, e),
            }
            ResponseBody::err(request.id, e.to_error_body())
        }
    }
}

async fn handle_socket(socket: WebSocket, hub: Arc<SignalingHub>, service: SignalingService) {
    let connection_id = ConnectionId::new();
    info!("New {} WebSocket connection: {}", hub.mode(), connection_id);

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    service.add_peer(connection_id.clone(), tx);
    hub.on_connection_opened(&connection_id);

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    let (router, worker) = InboundRouter::spawn(hub.clone(), service.clone(), connection_id.clone());
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => router.route(&text),
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    // Queued requests finish before eviction.
    let _ = worker.await;

    service.remove_peer(&connection_id);
    hub.on_connection_closed(&connection_id).await;
    info!("WebSocket disconnected: {}", connection_id);
}
