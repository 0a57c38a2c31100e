mod call;
mod candidate;
mod connection;
mod room;
mod signaling;

pub use call::{CallMode, CallOutcome, CallResponse, QualityTier, Role, StreamId};
pub use candidate::IceCandidate;
pub use connection::ConnectionId;
pub use room::RoomId;
pub use signaling::{
    ClientMessage, ErrorBody, IceServerConfig, NegotiationResponse, Notification, PeerRequest,
    RegisterResponse, RequestBody, ResponseBody, ServerMessage, SignalRequest, parse_call_response,
};
