use crate::model::connection::ConnectionId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of a call scope (room). Rooms are created on first join and closed
/// when the last participant leaves.
#[derive(Debug, Serialize, Deserialize, Clone, Hash, Eq, PartialEq)]
pub struct RoomId(pub String);

impl RoomId {
    /// Loopback calls get a private room per connection.
    pub fn for_connection(connection_id: &ConnectionId) -> Self {
        Self(format!("loopback-{connection_id}"))
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for RoomId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
