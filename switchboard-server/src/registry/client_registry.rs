use crate::error::{ProtocolViolation, SignalingError, ValidationError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use switchboard_core::{ConnectionId, RoomId};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredClient {
    pub connection_id: ConnectionId,
    /// Anonymous clients are only reachable by connection.
    pub name: Option<String>,
    pub room: RoomId,
}

impl fmt::Display for RegisteredClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "'{}'", name),
            None => write!(f, "{}", self.connection_id),
        }
    }
}

#[derive(Default)]
struct RegistryInner {
    by_name: HashMap<String, ConnectionId>,
    by_connection: HashMap<ConnectionId, RegisteredClient>,
}

/// Name and connection index of every registered client in one signaling
/// scope. Both maps change together under a single lock.
#[derive(Default)]
pub struct ClientRegistry {
    inner: Mutex<RegistryInner>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails on a blank name, a taken name (exact, case-sensitive match) or a
    /// connection that already registered. Without a name the client is
    /// indexed by connection only.
    pub fn register(
        &self,
        connection_id: ConnectionId,
        name: Option<&str>,
        room: RoomId,
    ) -> Result<RegisteredClient, SignalingError> {
        if name.is_some_and(|name| name.trim().is_empty()) {
            return Err(ValidationError::EmptyName.into());
        }

        let mut inner = self.inner.lock();
        if inner.by_connection.contains_key(&connection_id) {
            return Err(ProtocolViolation::AlreadyRegistered.into());
        }
        if let Some(name) = name {
            if inner.by_name.contains_key(name) {
                return Err(ValidationError::DuplicateName(name.to_string()).into());
            }
        }

        let client = RegisteredClient {
            connection_id: connection_id.clone(),
            name: name.map(str::to_string),
            room,
        };
        if let Some(name) = &client.name {
            inner.by_name.insert(name.clone(), connection_id.clone());
        }
        inner.by_connection.insert(connection_id, client.clone());
        debug!("Registered {} as {}", client, client.connection_id);
        Ok(client)
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<RegisteredClient> {
        let inner = self.inner.lock();
        inner
            .by_name
            .get(name)
            .and_then(|id| inner.by_connection.get(id))
            .cloned()
    }

    pub fn lookup_by_connection(&self, connection_id: &ConnectionId) -> Option<RegisteredClient> {
        self.inner.lock().by_connection.get(connection_id).cloned()
    }

    /// Removing an unknown connection is a no-op.
    pub fn remove_by_connection(&self, connection_id: &ConnectionId) -> Option<RegisteredClient> {
        let mut inner = self.inner.lock();
        let client = inner.by_connection.remove(connection_id)?;
        if let Some(name) = &client.name {
            inner.by_name.remove(name);
        }
        debug!("Unregistered {}", client);
        Some(client)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().by_connection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
