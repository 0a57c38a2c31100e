//! Signaling error taxonomy.
//!
//! Every failure that reaches a client is a [`SignalingError`]. Its
//! [`kind`](SignalingError::kind), [`code`](SignalingError::code) and
//! [`client_message`](SignalingError::client_message) build the wire
//! `ErrorBody`. Engine internals are logged server-side and never echoed.

use crate::engine::EngineError;
use switchboard_core::{CallMode, ErrorBody};
use thiserror::Error;

/// Bad or missing request parameters. Rejected before any state changes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("name '{0}' is already registered")]
    DuplicateName(String),

    #[error("missing parameter '{0}'")]
    MissingParameter(String),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("unknown method '{0}'")]
    UnknownMethod(String),
}

/// A well-formed request that is not allowed in the caller's current state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    #[error("connection is not registered")]
    NotRegistered,

    #[error("connection is already registered")]
    AlreadyRegistered,

    #[error("only the presenter may send an offer")]
    NotPresenter,

    #[error("no media endpoint attached")]
    NoEndpoint,

    #[error("connection is not in a call")]
    NotInCall,

    #[error("'{0}' is already in a call")]
    PeerBusy(String),

    #[error("unknown stream '{0}'")]
    UnknownStream(String),

    #[error("'{method}' is not supported in {mode} mode")]
    UnsupportedInMode { method: String, mode: CallMode },
}

/// Outbound message could not be delivered to a connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("connection closed")]
    ConnectionClosed,

    #[error("no response within {0} ms")]
    Timeout(u64),

    #[error("failed to serialize message: {0}")]
    Serialization(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Error)]
pub enum SignalingError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// The room stopped accepting commands. Callers may retry on a new room.
    #[error("room closed")]
    RoomClosed,

    /// Broken invariant or dead actor.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SignalingError {
    pub fn kind(&self) -> &'static str {
        match self {
            SignalingError::Validation(_) => "validation",
            SignalingError::Protocol(_) => "protocolViolation",
            SignalingError::Engine(_) => "engine",
            SignalingError::Delivery(_) => "delivery",
            SignalingError::RoomClosed | SignalingError::Internal(_) => "internal",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            SignalingError::Validation(e) => match e {
                ValidationError::EmptyName => "EmptyNameError",
                ValidationError::DuplicateName(_) => "DuplicateNameError",
                ValidationError::MissingParameter(_) => "MissingParameterError",
                ValidationError::InvalidParams(_) => "InvalidParamsError",
                ValidationError::UnknownMethod(_) => "UnknownMethodError",
            },
            SignalingError::Protocol(e) => match e {
                ProtocolViolation::NotRegistered => "NotRegisteredError",
                ProtocolViolation::AlreadyRegistered => "AlreadyRegisteredError",
                ProtocolViolation::NotPresenter => "NotPresenterError",
                ProtocolViolation::NoEndpoint => "NoEndpointError",
                ProtocolViolation::NotInCall => "NotInCallError",
                ProtocolViolation::PeerBusy(_) => "PeerBusyError",
                ProtocolViolation::UnknownStream(_) => "UnknownStreamError",
                ProtocolViolation::UnsupportedInMode { .. } => "UnsupportedInModeError",
            },
            SignalingError::Engine(e) => match e {
                EngineError::Negotiation(_) => "EngineNegotiationError",
                EngineError::PipelineCreation(_) | EngineError::EndpointCreation(_) => {
                    "EngineSetupError"
                }
                _ => "EngineError",
            },
            SignalingError::Delivery(_) => "DeliveryError",
            SignalingError::RoomClosed => "RoomClosedError",
            SignalingError::Internal(_) => "InternalError",
        }
    }

    /// Client-safe message.
    pub fn client_message(&self) -> String {
        match self {
            SignalingError::Validation(e) => e.to_string(),
            SignalingError::Protocol(e) => e.to_string(),
            SignalingError::Engine(EngineError::Negotiation(_)) => {
                "The media server rejected the session description".to_string()
            }
            SignalingError::Engine(_) => "The media server failed to set up the session".to_string(),
            SignalingError::Delivery(_) => "The peer could not be reached".to_string(),
            SignalingError::RoomClosed => "The call is closing, please retry".to_string(),
            SignalingError::Internal(_) => "An internal error occurred".to_string(),
        }
    }

    pub fn to_error_body(&self) -> ErrorBody {
        ErrorBody {
            kind: self.kind().to_string(),
            code: self.code().to_string(),
            message: self.client_message(),
        }
    }
}
