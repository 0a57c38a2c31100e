mod webrtc_engine;

pub use webrtc_engine::*;

use async_trait::async_trait;
use std::fmt;
use switchboard_core::IceCandidate;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct PipelineId(pub Uuid);

impl PipelineId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PipelineId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PipelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pipeline-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct EndpointId(pub Uuid);

impl EndpointId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EndpointId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "endpoint-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct SubSessionId(pub Uuid);

impl SubSessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubSessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-session-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    /// One negotiated peer connection.
    WebRtc,
    /// A session shared by many negotiations, addressed through sub-sessions.
    Shared,
}

/// What an SDP, candidate or bitrate operation is applied to: a plain
/// endpoint, or one sub-session inside a shared endpoint.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct MediaTarget {
    pub endpoint: EndpointId,
    pub sub_session: Option<SubSessionId>,
}

impl MediaTarget {
    pub fn endpoint(endpoint: EndpointId) -> Self {
        Self {
            endpoint,
            sub_session: None,
        }
    }

    pub fn sub_session(endpoint: EndpointId, sub_session: SubSessionId) -> Self {
        Self {
            endpoint,
            sub_session: Some(sub_session),
        }
    }
}

impl fmt::Display for MediaTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sub_session {
            Some(sub) => write!(f, "{}/{}", self.endpoint, sub),
            None => write!(f, "{}", self.endpoint),
        }
    }
}

/// Asynchronous notifications raised by the engine on its own tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    IceCandidateDiscovered {
        target: MediaTarget,
        candidate: IceCandidate,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("failed to create pipeline: {0}")]
    PipelineCreation(String),

    #[error("failed to create endpoint: {0}")]
    EndpointCreation(String),

    #[error("negotiation failed: {0}")]
    Negotiation(String),

    #[error("failed to apply candidate: {0}")]
    Candidate(String),

    #[error("unknown pipeline {0}")]
    UnknownPipeline(PipelineId),

    #[error("unknown endpoint {0}")]
    UnknownEndpoint(EndpointId),

    #[error("unknown sub-session {0}")]
    UnknownSubSession(SubSessionId),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("{0}")]
    Other(String),
}

/// Capabilities the orchestration core consumes from a media server.
///
/// Handles are plain ids. Events for an endpoint are delivered on the
/// channel passed to [`subscribe`](MediaEngine::subscribe); the engine never
/// calls back into the core directly.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    async fn create_pipeline(&self) -> Result<PipelineId, EngineError>;

    async fn release_pipeline(&self, pipeline: &PipelineId) -> Result<(), EngineError>;

    async fn create_endpoint(
        &self,
        pipeline: &PipelineId,
        kind: EndpointKind,
    ) -> Result<EndpointId, EngineError>;

    async fn release_endpoint(&self, endpoint: &EndpointId) -> Result<(), EngineError>;

    /// Routes the endpoint's asynchronous events (including those of its
    /// sub-sessions) to `events`.
    async fn subscribe(
        &self,
        endpoint: &EndpointId,
        events: mpsc::Sender<EngineEvent>,
    ) -> Result<(), EngineError>;

    /// Makes `sink` receive the tracks published by `source`. One direction only.
    async fn connect(&self, source: &EndpointId, sink: &EndpointId) -> Result<(), EngineError>;

    async fn generate_offer(&self, target: &MediaTarget) -> Result<String, EngineError>;

    async fn process_offer(&self, target: &MediaTarget, sdp_offer: &str)
    -> Result<String, EngineError>;

    async fn process_answer(&self, target: &MediaTarget, sdp_answer: &str)
    -> Result<(), EngineError>;

    async fn add_ice_candidate(
        &self,
        target: &MediaTarget,
        candidate: IceCandidate,
    ) -> Result<(), EngineError>;

    async fn gather_candidates(&self, target: &MediaTarget) -> Result<(), EngineError>;

    async fn is_negotiation_needed(&self, target: &MediaTarget) -> Result<bool, EngineError>;

    /// Lets `target` publish several encodings of each track. Only one of
    /// them is forwarded to sinks.
    async fn set_simulcast(&self, target: &MediaTarget, enabled: bool) -> Result<(), EngineError>;

    async fn create_sub_session(&self, shared: &EndpointId) -> Result<SubSessionId, EngineError>;

    async fn release_sub_session(
        &self,
        shared: &EndpointId,
        sub_session: &SubSessionId,
    ) -> Result<(), EngineError>;

    async fn set_master_sub_session(
        &self,
        shared: &EndpointId,
        sub_session: &SubSessionId,
    ) -> Result<(), EngineError>;

    async fn set_target_bitrate(
        &self,
        shared: &EndpointId,
        sub_session: &SubSessionId,
        bitrate_bps: u32,
    ) -> Result<(), EngineError>;
}
