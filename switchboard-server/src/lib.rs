pub mod config;
pub mod engine;
pub mod error;
pub mod participant;
pub mod registry;
pub mod room;
pub mod signaling;

pub use config::{Config, ConfigError};
pub use engine::{EngineConfig, EngineError, MediaEngine, WebRtcEngine};
pub use error::{DeliveryError, ProtocolViolation, SignalingError, ValidationError};
pub use participant::ParticipantSession;
pub use registry::ClientRegistry;
pub use room::{Room, RoomCommand, RoomHandle, RoomManager};
pub use signaling::{AppState, InboundRouter, SignalingHub, SignalingOutput, SignalingService, router, ws_handler};
