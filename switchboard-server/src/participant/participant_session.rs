use crate::engine::{EndpointId, EngineError, EngineEvent, MediaEngine, MediaTarget, SubSessionId};
use crate::error::{ProtocolViolation, SignalingError};
use crate::participant::{CandidateBuffer, CandidateDisposition};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use switchboard_core::{CallMode, ConnectionId, IceCandidate, QualityTier, Role, StreamId};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantState {
    Unregistered,
    Registered,
    /// A client offer is being processed.
    NegotiatingOffer,
    /// A server offer was sent; waiting for the client's answer.
    NegotiatingAnswer,
    Active,
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attachment {
    /// Endpoint exclusively owned by this participant.
    Dedicated(EndpointId),
    /// Shared-session endpoint. Streams negotiate through sub-sessions and
    /// only the owner releases the endpoint itself.
    Shared { endpoint: EndpointId, owned: bool },
}

impl Attachment {
    pub fn endpoint(&self) -> EndpointId {
        match self {
            Attachment::Dedicated(endpoint) => *endpoint,
            Attachment::Shared { endpoint, .. } => *endpoint,
        }
    }

    fn owns_endpoint(&self) -> bool {
        match self {
            Attachment::Dedicated(_) => true,
            Attachment::Shared { owned, .. } => *owned,
        }
    }
}

#[derive(Debug, Default)]
struct StreamSlot {
    target: Option<MediaTarget>,
    candidates: CandidateBuffer,
    tier: QualityTier,
}

/// One client's negotiation state and engine endpoint.
///
/// Identity is the connection id: two sessions for the same connection are
/// equal regardless of their state.
pub struct ParticipantSession {
    connection_id: ConnectionId,
    name: Option<String>,
    simulcast: bool,
    mode: CallMode,
    role: Option<Role>,
    state: ParticipantState,
    engine: Arc<dyn MediaEngine>,
    events: mpsc::Sender<EngineEvent>,
    attachment: Option<Attachment>,
    streams: BTreeMap<StreamId, StreamSlot>,
}

impl ParticipantSession {
    pub fn new(
        connection_id: ConnectionId,
        name: Option<String>,
        simulcast: bool,
        mode: CallMode,
        engine: Arc<dyn MediaEngine>,
        events: mpsc::Sender<EngineEvent>,
    ) -> Self {
        Self {
            connection_id,
            name,
            simulcast,
            mode,
            role: None,
            state: ParticipantState::Unregistered,
            engine,
            events,
            attachment: None,
            streams: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn attachment(&self) -> Option<Attachment> {
        self.attachment
    }

    pub fn endpoint(&self) -> Option<EndpointId> {
        self.attachment.map(|a| a.endpoint())
    }

    pub fn register(&mut self, role: Role) {
        self.role = Some(role);
        if self.state == ParticipantState::Unregistered {
            self.state = ParticipantState::Registered;
        }
    }

    pub fn promote(&mut self, role: Role) {
        self.role = Some(role);
    }

    /// Attaches an endpoint, releasing any previous one first.
    ///
    /// Owned endpoints are subscribed to the room's event channel. A
    /// dedicated endpoint becomes the primary stream's target and receives
    /// the buffered candidates in arrival order; in loopback mode it is
    /// connected to itself.
    pub async fn attach_endpoint(&mut self, attachment: Attachment) -> Result<(), SignalingError> {
        if self.state == ParticipantState::Released {
            return Err(SignalingError::Internal(format!(
                "attach on released participant {}",
                self.connection_id
            )));
        }
        if let Some(previous) = self.attachment.take() {
            self.release_attachment(previous).await;
        }

        self.attachment = Some(attachment);
        let endpoint = attachment.endpoint();
        if attachment.owns_endpoint() {
            self.engine.subscribe(&endpoint, self.events.clone()).await?;
        }

        if let Attachment::Dedicated(endpoint) = attachment {
            self.bind_stream(StreamId::primary(), MediaTarget::endpoint(endpoint))
                .await?;

            if self.mode == CallMode::Loopback {
                self.engine.connect(&endpoint, &endpoint).await?;
            }
        }

        info!(
            "Attached {} to {} ({:?})",
            endpoint, self.connection_id, attachment
        );
        Ok(())
    }

    /// Binds a stream to a fresh sub-session of the shared endpoint.
    ///
    /// A stream holds one sub-session at a time; the previous one is released.
    pub async fn attach_sub_session(
        &mut self,
        stream: StreamId,
        sub_session: SubSessionId,
    ) -> Result<MediaTarget, SignalingError> {
        let Some(Attachment::Shared { endpoint, .. }) = self.attachment else {
            return Err(ProtocolViolation::NoEndpoint.into());
        };

        let previous = self.streams.get(&stream).and_then(|slot| slot.target);
        if let Some(MediaTarget {
            sub_session: Some(old),
            ..
        }) = previous
        {
            if let Err(e) = self.engine.release_sub_session(&endpoint, &old).await {
                warn!("Failed to release {} of {}: {}", old, self.connection_id, e);
            }
        }

        let target = MediaTarget::sub_session(endpoint, sub_session);
        self.bind_stream(stream, target).await?;
        Ok(target)
    }

    async fn bind_stream(
        &mut self,
        stream: StreamId,
        target: MediaTarget,
    ) -> Result<(), SignalingError> {
        if self.simulcast {
            self.engine.set_simulcast(&target, true).await?;
        }

        let slot = self.streams.entry(stream).or_default();
        slot.target = Some(target);
        slot.tier = QualityTier::default();
        let pending = slot.candidates.flush_on_attach();

        if !pending.is_empty() {
            debug!(
                "Flushing {} buffered candidates to {}",
                pending.len(),
                target
            );
        }
        for candidate in pending {
            if let Err(e) = self.engine.add_ice_candidate(&target, candidate).await {
                warn!("Buffered candidate rejected by {}: {}", target, e);
            }
        }
        Ok(())
    }

    pub fn target(&self, stream: &StreamId) -> Option<MediaTarget> {
        self.streams.get(stream).and_then(|slot| slot.target)
    }

    /// Every stream that currently has an engine target.
    pub fn targets(&self) -> Vec<(StreamId, MediaTarget)> {
        self.streams
            .iter()
            .filter_map(|(stream, slot)| slot.target.map(|t| (stream.clone(), t)))
            .collect()
    }

    fn require_target(&self, stream: &StreamId) -> Result<MediaTarget, SignalingError> {
        match (self.attachment, self.target(stream)) {
            (_, Some(target)) => Ok(target),
            (None, None) => Err(ProtocolViolation::NoEndpoint.into()),
            (Some(Attachment::Dedicated(_)), None) => Err(ProtocolViolation::NoEndpoint.into()),
            (Some(Attachment::Shared { .. }), None) => {
                Err(ProtocolViolation::UnknownStream(stream.to_string()).into())
            }
        }
    }

    pub async fn generate_offer(&mut self, stream: &StreamId) -> Result<String, SignalingError> {
        let target = self.require_target(stream)?;
        let offer = self.engine.generate_offer(&target).await?;
        self.state = ParticipantState::NegotiatingAnswer;
        debug!("Generated offer for {} on {}", self.connection_id, target);
        Ok(offer)
    }

    pub async fn process_offer(
        &mut self,
        stream: &StreamId,
        sdp_offer: &str,
    ) -> Result<String, SignalingError> {
        let target = self.require_target(stream)?;
        let previous = self.state;
        self.state = ParticipantState::NegotiatingOffer;

        let answer = match self.engine.process_offer(&target, sdp_offer).await {
            Ok(answer) => answer,
            Err(e) => {
                self.state = previous;
                return Err(e.into());
            }
        };
        self.start_gathering(&target).await;
        self.state = ParticipantState::Active;
        Ok(answer)
    }

    pub async fn process_answer(
        &mut self,
        stream: &StreamId,
        sdp_answer: &str,
    ) -> Result<(), SignalingError> {
        let target = self.require_target(stream)?;
        self.engine.process_answer(&target, sdp_answer).await?;
        self.start_gathering(&target).await;
        self.state = ParticipantState::Active;
        Ok(())
    }

    async fn start_gathering(&self, target: &MediaTarget) {
        if let Err(e) = self.engine.gather_candidates(target).await {
            warn!("Candidate gathering failed on {}: {}", target, e);
        }
    }

    /// Forwards the candidate if the stream has a target, buffers it otherwise.
    pub async fn add_candidate(
        &mut self,
        stream: StreamId,
        candidate: IceCandidate,
    ) -> Result<bool, SignalingError> {
        let slot = self.streams.entry(stream).or_default();
        let target = slot.target;

        match slot.candidates.add_or_buffer(target.is_some(), candidate) {
            CandidateDisposition::Forward(candidate) => {
                let Some(target) = target else {
                    return Err(SignalingError::Internal(
                        "candidate forwarded without a target".to_string(),
                    ));
                };
                self.engine.add_ice_candidate(&target, candidate).await?;
                Ok(true)
            }
            CandidateDisposition::Buffered => Ok(false),
        }
    }

    pub async fn is_negotiation_needed(&self, stream: &StreamId) -> Result<bool, SignalingError> {
        let target = self.require_target(stream)?;
        Ok(self.engine.is_negotiation_needed(&target).await?)
    }

    /// Alternates the stream's receive bitrate between the high and low tier.
    pub async fn switch_quality(&mut self, stream: &StreamId) -> Result<QualityTier, SignalingError> {
        let target = self.require_target(stream)?;
        let Some(sub_session) = target.sub_session else {
            return Err(ProtocolViolation::UnsupportedInMode {
                method: "switchQuality".to_string(),
                mode: self.mode,
            }
            .into());
        };

        let current = self
            .streams
            .get(stream)
            .map(|slot| slot.tier)
            .unwrap_or_default();
        let next = current.toggled();
        self.engine
            .set_target_bitrate(&target.endpoint, &sub_session, next.bitrate_bps())
            .await?;

        if let Some(slot) = self.streams.get_mut(stream) {
            slot.tier = next;
        }
        debug!(
            "{} stream '{}' now receiving {:?} quality",
            self.connection_id, stream, next
        );
        Ok(next)
    }

    /// Releases one stream's sub-session and forgets the stream.
    pub async fn release_stream(
        &mut self,
        stream: &StreamId,
    ) -> Result<Option<MediaTarget>, SignalingError> {
        let Some(slot) = self.streams.remove(stream) else {
            return Ok(None);
        };
        let Some(target) = slot.target else {
            return Ok(None);
        };
        if let Some(sub_session) = target.sub_session {
            self.engine
                .release_sub_session(&target.endpoint, &sub_session)
                .await?;
        }
        Ok(Some(target))
    }

    /// Releases the endpoint but keeps the participant registered.
    /// Returns the targets that were bound.
    pub async fn detach(&mut self) -> Vec<MediaTarget> {
        let targets = self.clear_streams();
        if let Some(attachment) = self.attachment.take() {
            self.release_attachment_with(attachment, &targets).await;
        }
        if self.state != ParticipantState::Released {
            self.state = ParticipantState::Registered;
        }
        targets
    }

    /// Forgets a shared endpoint that its owner already released.
    pub fn drop_shared(&mut self) -> Vec<MediaTarget> {
        let targets = self.clear_streams();
        self.attachment = None;
        if self.state != ParticipantState::Released {
            self.state = ParticipantState::Registered;
        }
        targets
    }

    /// Releases everything this participant holds. Idempotent.
    pub async fn release(&mut self) -> Vec<MediaTarget> {
        if self.state == ParticipantState::Released {
            return Vec::new();
        }
        let targets = self.detach().await;
        self.state = ParticipantState::Released;
        info!("Released participant {}", self.connection_id);
        targets
    }

    fn clear_streams(&mut self) -> Vec<MediaTarget> {
        let targets = self
            .streams
            .values()
            .filter_map(|slot| slot.target)
            .collect();
        self.streams.clear();
        targets
    }

    async fn release_attachment(&mut self, attachment: Attachment) {
        let targets = self.clear_streams();
        self.release_attachment_with(attachment, &targets).await;
    }

    async fn release_attachment_with(&self, attachment: Attachment, targets: &[MediaTarget]) {
        match attachment {
            Attachment::Dedicated(endpoint) => {
                if let Err(e) = self.engine.release_endpoint(&endpoint).await {
                    warn!("Failed to release {}: {}", endpoint, e);
                }
            }
            Attachment::Shared { endpoint, owned } => {
                if owned {
                    if let Err(e) = self.engine.release_endpoint(&endpoint).await {
                        warn!("Failed to release shared {}: {}", endpoint, e);
                    }
                    return;
                }
                for sub_session in targets.iter().filter_map(|t| t.sub_session) {
                    match self.engine.release_sub_session(&endpoint, &sub_session).await {
                        Ok(()) => {}
                        Err(EngineError::UnknownEndpoint(_)) => {}
                        Err(e) => warn!("Failed to release {}: {}", sub_session, e),
                    }
                }
            }
        }
    }
}

impl PartialEq for ParticipantSession {
    fn eq(&self, other: &Self) -> bool {
        self.connection_id == other.connection_id
    }
}

impl Eq for ParticipantSession {}

impl Hash for ParticipantSession {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.connection_id.hash(state);
    }
}

impl fmt::Debug for ParticipantSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParticipantSession")
            .field("connection_id", &self.connection_id)
            .field("name", &self.name)
            .field("simulcast", &self.simulcast)
            .field("role", &self.role)
            .field("state", &self.state)
            .field("attachment", &self.attachment)
            .field("streams", &self.streams.len())
            .finish()
    }
}
