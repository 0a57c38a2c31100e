use crate::error::SignalingError;
use switchboard_core::{
    ConnectionId, IceCandidate, NegotiationResponse, QualityTier, Role, RoomId, StreamId,
};
use tokio::sync::{mpsc, oneshot};

pub type Reply<T> = oneshot::Sender<Result<T, SignalingError>>;

/// What a joining client asked for at registration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinOptions {
    pub name: Option<String>,
    pub simulcast: bool,
}

/// Commands a room executes one at a time, each answered on `respond_to`.
#[derive(Debug)]
pub enum RoomCommand {
    Join {
        connection_id: ConnectionId,
        options: JoinOptions,
        respond_to: Reply<Role>,
    },

    /// One-to-one only: both parties accepted, build the media session.
    StartCall {
        caller: ConnectionId,
        callee: ConnectionId,
        respond_to: Reply<()>,
    },

    /// With `sdp_offer` the answer is returned, without it a server offer.
    Negotiate {
        connection_id: ConnectionId,
        stream: StreamId,
        sdp_offer: Option<String>,
        respond_to: Reply<NegotiationResponse>,
    },

    ProcessAnswer {
        connection_id: ConnectionId,
        stream: StreamId,
        sdp_answer: String,
        respond_to: Reply<()>,
    },

    IceCandidate {
        connection_id: ConnectionId,
        stream: StreamId,
        candidate: IceCandidate,
        respond_to: Reply<()>,
    },

    SwitchQuality {
        connection_id: ConnectionId,
        stream: StreamId,
        respond_to: Reply<QualityTier>,
    },

    StopStream {
        connection_id: ConnectionId,
        stream: StreamId,
        respond_to: Reply<()>,
    },

    /// Ends the caller's one-to-one call but keeps it registered.
    HangUp {
        connection_id: ConnectionId,
        respond_to: Reply<bool>,
    },

    /// Removes the participant. `false` if it was not in the room.
    Leave {
        connection_id: ConnectionId,
        respond_to: Reply<bool>,
    },
}

/// Cloneable sender side of a room.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    room_id: RoomId,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub fn new(room_id: RoomId, sender: mpsc::Sender<RoomCommand>) -> Self {
        Self { room_id, sender }
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// The room stopped accepting commands.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    pub fn same_channel(&self, other: &RoomHandle) -> bool {
        self.sender.same_channel(&other.sender)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> RoomCommand,
    ) -> Result<T, SignalingError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| SignalingError::RoomClosed)?;
        rx.await.map_err(|_| {
            SignalingError::Internal(format!("room {} dropped a reply", self.room_id))
        })?
    }

    pub async fn join(
        &self,
        connection_id: ConnectionId,
        options: JoinOptions,
    ) -> Result<Role, SignalingError> {
        self.request(|respond_to| RoomCommand::Join {
            connection_id,
            options,
            respond_to,
        })
        .await
    }

    pub async fn start_call(
        &self,
        caller: ConnectionId,
        callee: ConnectionId,
    ) -> Result<(), SignalingError> {
        self.request(|respond_to| RoomCommand::StartCall {
            caller,
            callee,
            respond_to,
        })
        .await
    }

    pub async fn negotiate(
        &self,
        connection_id: ConnectionId,
        stream: StreamId,
        sdp_offer: Option<String>,
    ) -> Result<NegotiationResponse, SignalingError> {
        self.request(|respond_to| RoomCommand::Negotiate {
            connection_id,
            stream,
            sdp_offer,
            respond_to,
        })
        .await
    }

    pub async fn process_answer(
        &self,
        connection_id: ConnectionId,
        stream: StreamId,
        sdp_answer: String,
    ) -> Result<(), SignalingError> {
        self.request(|respond_to| RoomCommand::ProcessAnswer {
            connection_id,
            stream,
            sdp_answer,
            respond_to,
        })
        .await
    }

    pub async fn add_ice_candidate(
        &self,
        connection_id: ConnectionId,
        stream: StreamId,
        candidate: IceCandidate,
    ) -> Result<(), SignalingError> {
        self.request(|respond_to| RoomCommand::IceCandidate {
            connection_id,
            stream,
            candidate,
            respond_to,
        })
        .await
    }

    pub async fn switch_quality(
        &self,
        connection_id: ConnectionId,
        stream: StreamId,
    ) -> Result<QualityTier, SignalingError> {
        self.request(|respond_to| RoomCommand::SwitchQuality {
            connection_id,
            stream,
            respond_to,
        })
        .await
    }

    pub async fn stop_stream(
        &self,
        connection_id: ConnectionId,
        stream: StreamId,
    ) -> Result<(), SignalingError> {
        self.request(|respond_to| RoomCommand::StopStream {
            connection_id,
            stream,
            respond_to,
        })
        .await
    }

    pub async fn hang_up(&self, connection_id: ConnectionId) -> Result<bool, SignalingError> {
        self.request(|respond_to| RoomCommand::HangUp {
            connection_id,
            respond_to,
        })
        .await
    }

    pub async fn leave(&self, connection_id: ConnectionId) -> Result<bool, SignalingError> {
        self.request(|respond_to| RoomCommand::Leave {
            connection_id,
            respond_to,
        })
        .await
    }
}
