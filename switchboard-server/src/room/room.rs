use crate::engine::{
    EndpointId, EndpointKind, EngineEvent, MediaEngine, MediaTarget, PipelineId,
};
use crate::error::{ProtocolViolation, SignalingError};
use crate::participant::{Attachment, ParticipantSession};
use crate::room::outbox::Outbox;
use crate::room::room_command::{JoinOptions, RoomCommand};
use crate::room::topology::{CallTopology, Edge, LeaveOutcome};
use crate::signaling::SignalingOutput;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use switchboard_core::{
    CallMode, ConnectionId, IceCandidate, NegotiationResponse, Notification, QualityTier, Role,
    RoomId, StreamId,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

const ENGINE_EVENT_CAPACITY: usize = 256;

/// Work scheduled by a command and run after its reply was sent.
#[derive(Debug, Clone, PartialEq, Eq)]
enum FollowUp {
    Renegotiate(ConnectionId),
}

/// One call scope. Owns every participant, the topology and the engine
/// resources of the call; commands and engine events are handled strictly
/// one at a time on the room's task.
pub struct Room {
    room_id: RoomId,
    mode: CallMode,
    engine: Arc<dyn MediaEngine>,
    topology: CallTopology,
    participants: HashMap<ConnectionId, ParticipantSession>,
    pipeline: Option<PipelineId>,
    /// One-to-one calls get a pipeline per pair, keyed by both members.
    call_pipelines: HashMap<ConnectionId, PipelineId>,
    shared_endpoint: Option<EndpointId>,
    endpoint_index: HashMap<MediaTarget, (ConnectionId, StreamId)>,
    follow_ups: VecDeque<FollowUp>,
    outbox: Outbox,
    command_rx: mpsc::Receiver<RoomCommand>,
    engine_rx: mpsc::Receiver<EngineEvent>,
    engine_tx: mpsc::Sender<EngineEvent>,
    closing: bool,
}

impl Room {
    pub fn new(
        room_id: RoomId,
        mode: CallMode,
        command_rx: mpsc::Receiver<RoomCommand>,
        engine: Arc<dyn MediaEngine>,
        signaling: Arc<dyn SignalingOutput>,
    ) -> Self {
        let (engine_tx, engine_rx) = mpsc::channel(ENGINE_EVENT_CAPACITY);
        let outbox = Outbox::spawn(room_id.clone(), signaling);

        Self {
            room_id,
            mode,
            engine,
            topology: CallTopology::new(mode),
            participants: HashMap::new(),
            pipeline: None,
            call_pipelines: HashMap::new(),
            shared_endpoint: None,
            endpoint_index: HashMap::new(),
            follow_ups: VecDeque::new(),
            outbox,
            command_rx,
            engine_rx,
            engine_tx,
            closing: false,
        }
    }

    pub async fn run(mut self) {
        info!("Room {} ({}) event loop started", self.room_id, self.mode);

        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(c) => self.handle_command(c).await,
                        None => {
                            info!("Command channel closed. Shutting down room {}", self.room_id);
                            break;
                        }
                    }
                }

                Some(evt) = self.engine_rx.recv() => self.handle_engine_event(evt),
            }

            self.run_follow_ups().await;
        }

        self.shutdown().await;
        info!("Room {} event loop finished", self.room_id);
    }

    async fn handle_command(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Join {
                connection_id,
                options,
                respond_to,
            } => {
                let _ = respond_to.send(self.join(connection_id, options).await);
            }

            RoomCommand::StartCall {
                caller,
                callee,
                respond_to,
            } => {
                let _ = respond_to.send(self.start_call(&caller, &callee).await);
            }

            RoomCommand::Negotiate {
                connection_id,
                stream,
                sdp_offer,
                respond_to,
            } => {
                let result = self.negotiate(&connection_id, stream, sdp_offer).await;
                let _ = respond_to.send(result);
            }

            RoomCommand::ProcessAnswer {
                connection_id,
                stream,
                sdp_answer,
                respond_to,
            } => {
                let result = self
                    .process_answer(&connection_id, stream, &sdp_answer)
                    .await;
                let _ = respond_to.send(result);
            }

            RoomCommand::IceCandidate {
                connection_id,
                stream,
                candidate,
                respond_to,
            } => {
                let result = self.add_candidate(&connection_id, stream, candidate).await;
                let _ = respond_to.send(result);
            }

            RoomCommand::SwitchQuality {
                connection_id,
                stream,
                respond_to,
            } => {
                let _ = respond_to.send(self.switch_quality(&connection_id, stream).await);
            }

            RoomCommand::StopStream {
                connection_id,
                stream,
                respond_to,
            } => {
                let _ = respond_to.send(self.stop_stream(&connection_id, stream).await);
            }

            RoomCommand::HangUp {
                connection_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.hang_up(&connection_id).await);
            }

            RoomCommand::Leave {
                connection_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.leave(&connection_id).await);
            }
        }
    }

    fn handle_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::IceCandidateDiscovered { target, candidate } => {
                let Some((connection_id, stream)) = self.endpoint_index.get(&target) else {
                    debug!("[{}] candidate for released {} dropped", self.room_id, target);
                    return;
                };
                let user_id = match self.mode {
                    CallMode::SharedSession => stream.as_user_id(),
                    _ => None,
                };
                self.outbox.push(
                    connection_id.clone(),
                    Notification::IceCandidate { candidate, user_id },
                );
            }
        }
    }

    // ---- join / leave ----

    async fn join(
        &mut self,
        connection_id: ConnectionId,
        options: JoinOptions,
    ) -> Result<Role, SignalingError> {
        if self.closing {
            return Err(SignalingError::RoomClosed);
        }
        if self.participants.contains_key(&connection_id) {
            return Err(ProtocolViolation::AlreadyRegistered.into());
        }

        let joined = self.topology.join(connection_id.clone())?;
        let participant = ParticipantSession::new(
            connection_id.clone(),
            options.name,
            options.simulcast,
            self.mode,
            self.engine.clone(),
            self.engine_tx.clone(),
        );
        self.participants.insert(connection_id.clone(), participant);

        if let Err(e) = self.set_up_joiner(&connection_id, &joined.connect).await {
            error!(
                "[{}] join of {} failed, rolling back: {}",
                self.room_id, connection_id, e
            );
            let outcome = self.topology.leave(&connection_id);
            self.remove_participant(&connection_id).await;
            self.hand_over(&outcome).await;
            self.release_if_empty().await;
            return Err(e);
        }

        if let Some(participant) = self.participants.get_mut(&connection_id) {
            participant.register(joined.role);
        }
        for edge in &joined.connect {
            if edge.source != edge.sink {
                self.queue_renegotiation(edge.sink.clone());
            }
        }

        info!(
            "[{}] {} joined as {:?} ({} participants)",
            self.room_id,
            connection_id,
            joined.role,
            self.participants.len()
        );
        Ok(joined.role)
    }

    async fn set_up_joiner(
        &mut self,
        connection_id: &ConnectionId,
        connect: &[Edge],
    ) -> Result<(), SignalingError> {
        match self.mode {
            // Endpoints come with the call.
            CallMode::OneToOne => Ok(()),

            CallMode::SharedSession => {
                let attachment = self.shared_attachment().await?;
                self.participant_mut(connection_id)?
                    .attach_endpoint(attachment)
                    .await
            }

            CallMode::Loopback | CallMode::Presenter | CallMode::Mesh => {
                let pipeline = self.ensure_pipeline().await?;
                let endpoint = self
                    .engine
                    .create_endpoint(&pipeline, EndpointKind::WebRtc)
                    .await?;
                self.attach_dedicated(connection_id, endpoint).await?;
                self.connect_edges(connect).await
            }
        }
    }

    /// The room's shared endpoint, created for (and owned by) the first
    /// participant to need it.
    async fn shared_attachment(&mut self) -> Result<Attachment, SignalingError> {
        if let Some(endpoint) = self.shared_endpoint {
            return Ok(Attachment::Shared {
                endpoint,
                owned: false,
            });
        }

        let pipeline = self.ensure_pipeline().await?;
        let endpoint = self
            .engine
            .create_endpoint(&pipeline, EndpointKind::Shared)
            .await?;
        self.shared_endpoint = Some(endpoint);
        info!("[{}] shared endpoint {} created", self.room_id, endpoint);
        Ok(Attachment::Shared {
            endpoint,
            owned: true,
        })
    }

    async fn attach_dedicated(
        &mut self,
        connection_id: &ConnectionId,
        endpoint: EndpointId,
    ) -> Result<(), SignalingError> {
        let participant = match self.participants.get_mut(connection_id) {
            Some(p) => p,
            None => {
                if let Err(e) = self.engine.release_endpoint(&endpoint).await {
                    warn!("Failed to release orphaned {}: {}", endpoint, e);
                }
                return Err(ProtocolViolation::NotRegistered.into());
            }
        };
        participant
            .attach_endpoint(Attachment::Dedicated(endpoint))
            .await?;
        self.endpoint_index.insert(
            MediaTarget::endpoint(endpoint),
            (connection_id.clone(), StreamId::primary()),
        );
        Ok(())
    }

    async fn leave(&mut self, connection_id: &ConnectionId) -> Result<bool, SignalingError> {
        if !self.participants.contains_key(connection_id) {
            return Ok(false);
        }

        self.end_call(connection_id, "peerDisconnected").await;
        let outcome = self.topology.leave(connection_id);
        self.remove_participant(connection_id).await;
        self.hand_over(&outcome).await;
        self.release_if_empty().await;

        info!(
            "[{}] {} left ({} participants)",
            self.room_id,
            connection_id,
            self.participants.len()
        );
        Ok(true)
    }

    /// Releases the participant. If it owned the shared endpoint, every
    /// other member loses its sub-sessions and is told the session stopped.
    async fn remove_participant(&mut self, connection_id: &ConnectionId) {
        let Some(mut participant) = self.participants.remove(connection_id) else {
            return;
        };
        let owned_shared = matches!(
            participant.attachment(),
            Some(Attachment::Shared { owned: true, .. })
        );

        let released = participant.release().await;
        self.forget_targets(&released);

        if owned_shared {
            self.shared_endpoint = None;
            let mut orphaned = Vec::new();
            for (id, other) in self.participants.iter_mut() {
                orphaned.extend(other.drop_shared());
                self.outbox.push(
                    id.clone(),
                    Notification::StopMediaSession {
                        reason: "presenterLeft".to_string(),
                    },
                );
            }
            self.forget_targets(&orphaned);
        }
    }

    /// Gives the presenter role to whoever the topology promoted.
    async fn hand_over(&mut self, outcome: &LeaveOutcome) {
        let Some(promoted) = &outcome.promoted else {
            return;
        };
        if let Some(participant) = self.participants.get_mut(promoted) {
            participant.promote(Role::Presenter);
        }
        info!("[{}] {} promoted to presenter", self.room_id, promoted);

        let result = match self.mode {
            CallMode::Presenter => self.connect_edges(&outcome.connect).await,
            CallMode::SharedSession => self.reattach_shared(promoted).await,
            _ => Ok(()),
        };
        match result {
            Ok(()) => {
                for edge in &outcome.connect {
                    self.queue_renegotiation(edge.sink.clone());
                }
            }
            Err(e) => error!(
                "[{}] hand-over to {} failed: {}",
                self.room_id, promoted, e
            ),
        }
    }

    async fn reattach_shared(&mut self, presenter: &ConnectionId) -> Result<(), SignalingError> {
        let owner = self.shared_attachment().await?;
        self.participant_mut(presenter)?.attach_endpoint(owner).await?;

        let viewer_attachment = Attachment::Shared {
            endpoint: owner.endpoint(),
            owned: false,
        };
        let viewers: Vec<ConnectionId> = self
            .participants
            .keys()
            .filter(|id| *id != presenter)
            .cloned()
            .collect();
        for viewer in viewers {
            self.participant_mut(&viewer)?
                .attach_endpoint(viewer_attachment)
                .await?;
        }
        Ok(())
    }

    // ---- one-to-one calls ----

    async fn start_call(
        &mut self,
        caller: &ConnectionId,
        callee: &ConnectionId,
    ) -> Result<(), SignalingError> {
        if !self.participants.contains_key(caller) || !self.participants.contains_key(callee) {
            return Err(ProtocolViolation::NotRegistered.into());
        }
        for id in [caller, callee] {
            if self.topology.peer_of(id).is_some() {
                let name = self
                    .participants
                    .get(id)
                    .and_then(|p| p.name())
                    .map(str::to_string)
                    .unwrap_or_else(|| id.to_string());
                return Err(ProtocolViolation::PeerBusy(name).into());
            }
        }

        let edges = self.topology.pair(caller, callee)?;
        if let Err(e) = self.set_up_call(caller, callee, &edges).await {
            error!(
                "[{}] call {} -> {} failed, rolling back: {}",
                self.room_id, caller, callee, e
            );
            self.topology.hang_up(caller);
            self.tear_down_call(caller, callee).await;
            return Err(e);
        }

        info!("[{}] call {} <-> {} started", self.room_id, caller, callee);
        Ok(())
    }

    async fn set_up_call(
        &mut self,
        caller: &ConnectionId,
        callee: &ConnectionId,
        edges: &[Edge],
    ) -> Result<(), SignalingError> {
        let pipeline = self.engine.create_pipeline().await?;
        info!("[{}] call pipeline {} created", self.room_id, pipeline);
        self.call_pipelines.insert(caller.clone(), pipeline);
        self.call_pipelines.insert(callee.clone(), pipeline);

        for id in [caller, callee] {
            let endpoint = self
                .engine
                .create_endpoint(&pipeline, EndpointKind::WebRtc)
                .await?;
            self.attach_dedicated(id, endpoint).await?;
        }
        self.connect_edges(edges).await
    }

    /// Releases both endpoints and the pair's pipeline. Both stay registered.
    async fn tear_down_call(&mut self, a: &ConnectionId, b: &ConnectionId) {
        for id in [a, b] {
            if let Some(participant) = self.participants.get_mut(id) {
                let released = participant.detach().await;
                self.forget_targets(&released);
            }
        }

        let first = self.call_pipelines.remove(a);
        let second = self.call_pipelines.remove(b);
        if let Some(pipeline) = first.or(second) {
            match self.engine.release_pipeline(&pipeline).await {
                Ok(()) => info!("[{}] call pipeline {} released", self.room_id, pipeline),
                Err(e) => warn!("Failed to release {}: {}", pipeline, e),
            }
        }
    }

    /// Ends the call `connection_id` is in and notifies the other side.
    async fn end_call(&mut self, connection_id: &ConnectionId, reason: &str) -> bool {
        let Some(peer) = self.topology.hang_up(connection_id) else {
            return false;
        };
        self.tear_down_call(connection_id, &peer).await;
        self.outbox.push(
            peer.clone(),
            Notification::StopMediaSession {
                reason: reason.to_string(),
            },
        );
        info!(
            "[{}] call {} <-> {} ended ({})",
            self.room_id, connection_id, peer, reason
        );
        true
    }

    async fn hang_up(&mut self, connection_id: &ConnectionId) -> Result<bool, SignalingError> {
        if !self.participants.contains_key(connection_id) {
            return Ok(false);
        }
        Ok(self.end_call(connection_id, "hangup").await)
    }

    // ---- negotiation ----

    async fn negotiate(
        &mut self,
        connection_id: &ConnectionId,
        stream: StreamId,
        sdp_offer: Option<String>,
    ) -> Result<NegotiationResponse, SignalingError> {
        let stream = self.normalize(stream);
        self.topology
            .authorize_offer(connection_id, sdp_offer.is_some())?;
        self.require_call(connection_id)?;

        let created = match self.mode {
            CallMode::SharedSession => self.ensure_sub_session(connection_id, &stream).await?,
            _ => None,
        };

        let participant = self.participant_mut(connection_id)?;
        let result = match &sdp_offer {
            Some(offer) => participant
                .process_offer(&stream, offer)
                .await
                .map(NegotiationResponse::answer),
            None => participant
                .generate_offer(&stream)
                .await
                .map(NegotiationResponse::offer),
        };

        match result {
            Ok(response) => {
                if sdp_offer.is_some() {
                    for other in self.topology.renegotiation_candidates(connection_id) {
                        self.queue_renegotiation(other);
                    }
                }
                Ok(response)
            }
            Err(e) => {
                error!(
                    "[{}] negotiation of {} stream '{}' failed: {}",
                    self.room_id, connection_id, stream, e
                );
                if created.is_some() {
                    self.drop_stream(connection_id, &stream).await;
                }
                if matches!(e, SignalingError::Engine(_)) {
                    self.end_call(connection_id, "negotiationFailed").await;
                }
                Err(e)
            }
        }
    }

    async fn process_answer(
        &mut self,
        connection_id: &ConnectionId,
        stream: StreamId,
        sdp_answer: &str,
    ) -> Result<(), SignalingError> {
        let stream = self.normalize(stream);
        self.require_call(connection_id)?;
        self.participant_mut(connection_id)?
            .process_answer(&stream, sdp_answer)
            .await
    }

    async fn add_candidate(
        &mut self,
        connection_id: &ConnectionId,
        stream: StreamId,
        candidate: IceCandidate,
    ) -> Result<(), SignalingError> {
        let stream = self.normalize(stream);
        let forwarded = self
            .participant_mut(connection_id)?
            .add_candidate(stream.clone(), candidate)
            .await?;
        if !forwarded {
            debug!(
                "[{}] candidate from {} on '{}' buffered",
                self.room_id, connection_id, stream
            );
        }
        Ok(())
    }

    /// Binds `stream` to a new sub-session unless it already has one.
    /// Returns the target if one was created.
    async fn ensure_sub_session(
        &mut self,
        connection_id: &ConnectionId,
        stream: &StreamId,
    ) -> Result<Option<MediaTarget>, SignalingError> {
        let participant = self
            .participants
            .get(connection_id)
            .ok_or(ProtocolViolation::NotRegistered)?;
        if participant.target(stream).is_some() {
            return Ok(None);
        }
        let shared = self.shared_endpoint.ok_or(ProtocolViolation::NoEndpoint)?;

        let sub_session = self.engine.create_sub_session(&shared).await?;
        let target = match self
            .participant_mut(connection_id)?
            .attach_sub_session(stream.clone(), sub_session)
            .await
        {
            Ok(target) => target,
            Err(e) => {
                if let Err(release) = self.engine.release_sub_session(&shared, &sub_session).await
                {
                    warn!("Failed to release {}: {}", sub_session, release);
                }
                return Err(e);
            }
        };
        self.endpoint_index
            .insert(target, (connection_id.clone(), stream.clone()));

        let is_master = self.topology.presenter() == Some(connection_id)
            && stream.is_master_candidate();
        if is_master {
            if let Err(e) = self.engine.set_master_sub_session(&shared, &sub_session).await {
                self.drop_stream(connection_id, stream).await;
                return Err(e.into());
            }
            info!("[{}] {} is the master sub-session", self.room_id, sub_session);
        }
        Ok(Some(target))
    }

    async fn switch_quality(
        &mut self,
        connection_id: &ConnectionId,
        stream: StreamId,
    ) -> Result<QualityTier, SignalingError> {
        self.require_mode(CallMode::SharedSession, "switchQuality")?;
        self.participant_mut(connection_id)?
            .switch_quality(&stream)
            .await
    }

    async fn stop_stream(
        &mut self,
        connection_id: &ConnectionId,
        stream: StreamId,
    ) -> Result<(), SignalingError> {
        self.require_mode(CallMode::SharedSession, "stopUserSession")?;
        let released = self
            .participant_mut(connection_id)?
            .release_stream(&stream)
            .await?;
        match released {
            Some(target) => {
                self.endpoint_index.remove(&target);
                info!(
                    "[{}] {} stream '{}' released",
                    self.room_id, connection_id, stream
                );
                Ok(())
            }
            None => Err(ProtocolViolation::UnknownStream(stream.to_string()).into()),
        }
    }

    async fn drop_stream(&mut self, connection_id: &ConnectionId, stream: &StreamId) {
        let Some(participant) = self.participants.get_mut(connection_id) else {
            return;
        };
        match participant.release_stream(stream).await {
            Ok(Some(target)) => {
                self.endpoint_index.remove(&target);
            }
            Ok(None) => {}
            Err(e) => warn!("Failed to release stream '{}': {}", stream, e),
        }
    }

    // ---- follow-ups ----

    fn queue_renegotiation(&mut self, connection_id: ConnectionId) {
        let follow_up = FollowUp::Renegotiate(connection_id);
        if !self.follow_ups.contains(&follow_up) {
            self.follow_ups.push_back(follow_up);
        }
    }

    async fn run_follow_ups(&mut self) {
        while let Some(follow_up) = self.follow_ups.pop_front() {
            match follow_up {
                FollowUp::Renegotiate(connection_id) => self.renegotiate(&connection_id).await,
            }
        }
    }

    /// Sends a fresh offer on every stream the engine flags as needing one.
    async fn renegotiate(&mut self, connection_id: &ConnectionId) {
        let Some(participant) = self.participants.get_mut(connection_id) else {
            return;
        };

        for (stream, target) in participant.targets() {
            match participant.is_negotiation_needed(&stream).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!("[{}] {} needs no renegotiation", self.room_id, target);
                    continue;
                }
                Err(e) => {
                    warn!("[{}] negotiation check on {} failed: {}", self.room_id, target, e);
                    continue;
                }
            }

            match participant.generate_offer(&stream).await {
                Ok(sdp_offer) => {
                    debug!("[{}] renegotiating {} on {}", self.room_id, connection_id, target);
                    self.outbox.push(
                        connection_id.clone(),
                        Notification::ViewerNegotiation {
                            sdp_offer,
                            user_id: stream.as_user_id(),
                        },
                    );
                }
                Err(e) => warn!("[{}] renegotiation offer on {} failed: {}", self.room_id, target, e),
            }
        }
    }

    // ---- resources ----

    async fn ensure_pipeline(&mut self) -> Result<PipelineId, SignalingError> {
        if let Some(pipeline) = self.pipeline {
            return Ok(pipeline);
        }
        let pipeline = self.engine.create_pipeline().await?;
        self.pipeline = Some(pipeline);
        info!("[{}] pipeline {} created", self.room_id, pipeline);
        Ok(pipeline)
    }

    async fn connect_edges(&self, edges: &[Edge]) -> Result<(), SignalingError> {
        for edge in edges {
            // Loopback self-connects on attach.
            if edge.source == edge.sink {
                continue;
            }
            let source = self.endpoint_of(&edge.source)?;
            let sink = self.endpoint_of(&edge.sink)?;
            self.engine.connect(&source, &sink).await?;
            debug!("[{}] connected {} -> {}", self.room_id, source, sink);
        }
        Ok(())
    }

    fn endpoint_of(&self, connection_id: &ConnectionId) -> Result<EndpointId, SignalingError> {
        self.participants
            .get(connection_id)
            .and_then(|p| p.endpoint())
            .ok_or_else(|| {
                SignalingError::Internal(format!(
                    "{} is in the connection set without an endpoint",
                    connection_id
                ))
            })
    }

    /// Releases the pipeline and stops accepting commands once the room is
    /// empty. Commands already queued are still answered.
    async fn release_if_empty(&mut self) {
        if !self.participants.is_empty() {
            return;
        }
        self.release_all().await;
        if !self.closing {
            self.closing = true;
            self.command_rx.close();
            info!("[{}] room is empty, closing", self.room_id);
        }
    }

    async fn release_all(&mut self) {
        let ids: Vec<ConnectionId> = self.participants.keys().cloned().collect();
        for id in ids {
            self.remove_participant(&id).await;
        }

        let mut pipelines: Vec<PipelineId> = self.call_pipelines.drain().map(|(_, p)| p).collect();
        pipelines.sort();
        pipelines.dedup();
        pipelines.extend(self.pipeline.take());

        for pipeline in pipelines {
            match self.engine.release_pipeline(&pipeline).await {
                Ok(()) => info!("[{}] pipeline {} released", self.room_id, pipeline),
                Err(e) => warn!("Failed to release {}: {}", pipeline, e),
            }
        }
        self.shared_endpoint = None;
        self.endpoint_index.clear();
    }

    async fn shutdown(&mut self) {
        if !self.participants.is_empty() || self.pipeline.is_some() {
            warn!(
                "[{}] shutting down with {} participants",
                self.room_id,
                self.participants.len()
            );
        }
        self.release_all().await;
    }

    fn forget_targets(&mut self, targets: &[MediaTarget]) {
        for target in targets {
            self.endpoint_index.remove(target);
        }
    }

    // ---- helpers ----

    /// Streams are only addressable in shared-session mode.
    fn normalize(&self, stream: StreamId) -> StreamId {
        match self.mode {
            CallMode::SharedSession => stream,
            _ => StreamId::primary(),
        }
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

    /// One-to-one members only negotiate while paired.
    fn require_call(&self, connection_id: &ConnectionId) -> Result<(), SignalingError> {
        if self.mode == CallMode::OneToOne && self.topology.peer_of(connection_id).is_none() {
            return Err(ProtocolViolation::NotInCall.into());
        }
        Ok(())
    }

    fn participant_mut(
        &mut self,
        connection_id: &ConnectionId,
    ) -> Result<&mut ParticipantSession, SignalingError> {
        self.participants
            .get_mut(connection_id)
            .ok_or_else(|| ProtocolViolation::NotRegistered.into())
    }
}
