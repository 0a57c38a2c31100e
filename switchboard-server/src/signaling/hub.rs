use crate::config::Config;
use crate::engine::MediaEngine;
use crate::error::{ProtocolViolation, SignalingError, ValidationError};
use crate::registry::{ClientRegistry, RegisteredClient};
use crate::room::{JoinOptions, RoomHandle, RoomManager};
use crate::signaling::SignalingOutput;
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use switchboard_core::{
    CallMode, CallOutcome, CallResponse, ConnectionId, Notification, PeerRequest,
    RegisterResponse, RoomId, SignalRequest, StreamId, parse_call_response,
};
use tracing::{debug, info, warn};

pub const LOBBY_ROOM: &str = "lobby";

/// Entry point of one call mode: validates inbound methods, owns the
/// mode's registry scope and routes everything else to the caller's room.
pub struct SignalingHub {
    mode: CallMode,
    registry: ClientRegistry,
    rooms: RoomManager,
    signaling: Arc<dyn SignalingOutput>,
    call_timeout: Duration,
    default_room: RoomId,
}

impl SignalingHub {
    pub fn new(
        mode: CallMode,
        engine: Arc<dyn MediaEngine>,
        signaling: Arc<dyn SignalingOutput>,
        config: &Config,
    ) -> Self {
        let rooms = RoomManager::new(mode, engine, signaling.clone())
            .with_channel_capacity(config.room_channel_capacity);

        Self {
            mode,
            registry: ClientRegistry::new(),
            rooms,
            signaling,
            call_timeout: config.call_timeout(),
            default_room: RoomId::from(config.default_room.as_str()),
        }
    }

    pub fn mode(&self) -> CallMode {
        self.mode
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    pub fn rooms(&self) -> &RoomManager {
        &self.rooms
    }

    pub fn on_connection_opened(&self, connection_id: &ConnectionId) {
        debug!("[{}] connection {} opened", self.mode, connection_id);
    }

    /// Unregisters and evicts the connection. Safe to call any number of
    /// times, before or after `stop`.
    pub async fn on_connection_closed(&self, connection_id: &ConnectionId) {
        let Some(client) = self.registry.remove_by_connection(connection_id) else {
            debug!("[{}] {} closed while unregistered", self.mode, connection_id);
            return;
        };
        self.evict(&client).await;
        info!("[{}] {} disconnected", self.mode, client);
    }

    /// Dispatches one inbound method and returns its `result`.
    pub async fn on_event(
        &self,
        connection_id: &ConnectionId,
        method: &str,
        params: Value,
    ) -> Result<Value, SignalingError> {
        if !SignalRequest::is_known_method(method) {
            return Err(ValidationError::UnknownMethod(method.to_string()).into());
        }
        let request = SignalRequest::parse(method, params).map_err(params_error)?;
        debug!("[{}] {} from {}", self.mode, method, connection_id);

        match request {
            SignalRequest::Register {
                name,
                room,
                simulcast,
            } => {
                let options = JoinOptions { name, simulcast };
                to_result(self.register(connection_id, options, room).await?)
            }

            SignalRequest::Call { to } => to_result(self.call(connection_id, &to).await?),

            SignalRequest::NegotiateWebRtc { sdp_offer, user_id } => {
                let response = self
                    .room_of(connection_id)?
                    .negotiate(
                        connection_id.clone(),
                        StreamId::from_user_id(user_id),
                        sdp_offer,
                    )
                    .await?;
                to_result(response)
            }

            SignalRequest::ProcessAnswer {
                sdp_answer,
                user_id,
            } => {
                self.room_of(connection_id)?
                    .process_answer(
                        connection_id.clone(),
                        StreamId::from_user_id(user_id),
                        sdp_answer,
                    )
                    .await?;
                Ok(Value::Null)
            }

            SignalRequest::IceCandidate { candidate, user_id } => {
                self.room_of(connection_id)?
                    .add_ice_candidate(
                        connection_id.clone(),
                        StreamId::from_user_id(user_id),
                        candidate,
                    )
                    .await?;
                Ok(Value::Null)
            }

            SignalRequest::SwitchQuality { user_id } => {
                let tier = self
                    .room_of(connection_id)?
                    .switch_quality(connection_id.clone(), StreamId::from_user_id(user_id))
                    .await?;
                Ok(json!({ "quality": tier, "bitrate": tier.bitrate_bps() }))
            }

            SignalRequest::StopUserSession { user_id } => {
                self.room_of(connection_id)?
                    .stop_stream(connection_id.clone(), StreamId(user_id))
                    .await?;
                Ok(Value::Null)
            }

            SignalRequest::Stop {} => {
                self.stop(connection_id).await;
                Ok(Value::Null)
            }
        }
    }

    /// One-to-one clients are called by name, so only they must give one.
    async fn register(
        &self,
        connection_id: &ConnectionId,
        options: JoinOptions,
        room: Option<String>,
    ) -> Result<RegisterResponse, SignalingError> {
        if self.mode == CallMode::OneToOne && options.name.is_none() {
            return Err(ValidationError::MissingParameter("name".to_string()).into());
        }
        let room_id = self.room_for(connection_id, room);
        let client = self.registry.register(
            connection_id.clone(),
            options.name.as_deref(),
            room_id.clone(),
        )?;

        let role = match self
            .rooms
            .join(&room_id, connection_id.clone(), options)
            .await
        {
            Ok((_, role)) => role,
            Err(e) => {
                self.registry.remove_by_connection(connection_id);
                return Err(e);
            }
        };

        // A disconnect may have raced the join.
        if self.registry.lookup_by_connection(connection_id).is_none() {
            self.evict(&client).await;
            return Err(ProtocolViolation::NotRegistered.into());
        }

        info!(
            "[{}] {} registered in {} as {:?}",
            self.mode, client, room_id, role
        );
        Ok(RegisterResponse::accepted(role))
    }

    /// Asks the callee and, if it accepts, starts the media session.
    /// Unknown or unreachable callees yield `FAILED` without side effects.
    async fn call(
        &self,
        connection_id: &ConnectionId,
        to: &str,
    ) -> Result<CallResponse, SignalingError> {
        self.require_mode(CallMode::OneToOne, "call")?;
        let caller = self
            .registry
            .lookup_by_connection(connection_id)
            .ok_or(ProtocolViolation::NotRegistered)?;

        let Some(callee) = self.registry.lookup_by_name(to) else {
            return Ok(CallResponse::failed(format!("user {to} is not registered")));
        };
        if callee.connection_id == caller.connection_id {
            return Ok(CallResponse::failed("cannot call yourself"));
        }

        let request = PeerRequest::IncomingCall {
            caller: caller.name.clone().unwrap_or_else(|| caller.connection_id.to_string()),
        };
        let reply = match self
            .signaling
            .request(&callee.connection_id, request, self.call_timeout)
            .await
        {
            Ok(value) => parse_call_response(value).unwrap_or_else(|e| {
                warn!("[{}] invalid incomingCall answer from '{}': {}", self.mode, to, e);
                CallResponse::failed(format!("user {to} sent an invalid answer"))
            }),
            Err(e) => {
                warn!("[{}] '{}' unreachable: {}", self.mode, to, e);
                CallResponse::failed(format!("user {to} is unreachable"))
            }
        };

        if reply.response != CallOutcome::Accepted {
            info!(
                "[{}] call {} -> '{}' ended with {:?}",
                self.mode, caller, to, reply.response
            );
            return Ok(reply);
        }

        let room = self.room_handle(&caller)?;
        if let Err(e) = room
            .start_call(caller.connection_id.clone(), callee.connection_id.clone())
            .await
        {
            // A busy pair was never set up, so there is nothing to stop.
            if !matches!(e, SignalingError::Engine(_)) {
                return Err(e);
            }
            let stop = Notification::StopMediaSession {
                reason: "callFailed".to_string(),
            };
            if let Err(delivery) = self.signaling.notify(&callee.connection_id, stop).await {
                warn!("[{}] '{}' not told about failed call: {}", self.mode, to, delivery);
            }
            return Err(e);
        }
        Ok(reply)
    }

    /// Hangs up any active call, then evicts and unregisters the caller.
    async fn stop(&self, connection_id: &ConnectionId) {
        if self.mode == CallMode::OneToOne {
            if let Ok(room) = self.room_of(connection_id) {
                if let Err(e) = room.hang_up(connection_id.clone()).await {
                    warn!("[{}] hang-up of {} failed: {}", self.mode, connection_id, e);
                }
            }
        }
        self.on_connection_closed(connection_id).await;
    }

    async fn evict(&self, client: &RegisteredClient) {
        let Some(room) = self.rooms.get(&client.room) else {
            return;
        };
        if let Err(e) = room.leave(client.connection_id.clone()).await {
            warn!(
                "[{}] eviction of {} from {} failed: {}",
                self.mode, client, client.room, e
            );
        }
    }

    fn room_for(&self, connection_id: &ConnectionId, requested: Option<String>) -> RoomId {
        match self.mode {
            CallMode::OneToOne => RoomId::from(LOBBY_ROOM),
            CallMode::Loopback => RoomId::for_connection(connection_id),
            CallMode::Presenter | CallMode::Mesh | CallMode::SharedSession => requested
                .filter(|room| !room.trim().is_empty())
                .map(RoomId::from)
                .unwrap_or_else(|| self.default_room.clone()),
        }
    }

    fn room_of(&self, connection_id: &ConnectionId) -> Result<RoomHandle, SignalingError> {
        let client = self
            .registry
            .lookup_by_connection(connection_id)
            .ok_or(ProtocolViolation::NotRegistered)?;
        self.room_handle(&client)
    }

    fn room_handle(&self, client: &RegisteredClient) -> Result<RoomHandle, SignalingError> {
        self.rooms.get(&client.room).ok_or_else(|| {
            SignalingError::Internal(format!(
                "{} is registered in {} but the room is gone",
                client, client.room
            ))
        })
    }

    fn require_mode(&self, mode: CallMode, method: &str) -> Result<(), SignalingError> {
        if self.mode != mode {
            return Err(ProtocolViolation::UnsupportedInMode {
                method: method.to_string(),
                mode: self.mode,
            }
            .into());
        }
        Ok(())
    }
}

fn to_result<T: Serialize>(value: T) -> Result<Value, SignalingError> {
    serde_json::to_value(value).map_err(|e| SignalingError::Internal(e.to_string()))
}

fn params_error(e: serde_json::Error) -> SignalingError {
    let message = e.to_string();
    let missing = message
        .strip_prefix("missing field `")
        .and_then(|rest| rest.split('`').next());
    match missing {
        Some(field) => ValidationError::MissingParameter(field.to_string()).into(),
        None => ValidationError::InvalidParams(message).into(),
    }
}
