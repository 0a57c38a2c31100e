use crate::config::DEFAULT_ROOM_CHANNEL_CAPACITY;
use crate::engine::MediaEngine;
use crate::error::SignalingError;
use crate::room::{JoinOptions, Room, RoomHandle};
use crate::signaling::SignalingOutput;
use dashmap::DashMap;
use std::sync::Arc;
use switchboard_core::{CallMode, ConnectionId, Role, RoomId};
use tokio::sync::mpsc;
use tracing::{debug, info};

pub const MAX_JOIN_ATTEMPTS: u32 = 5;

/// Creates rooms on first use and forgets them once they close.
#[derive(Clone)]
pub struct RoomManager {
    mode: CallMode,
    rooms: Arc<DashMap<RoomId, RoomHandle>>,
    engine: Arc<dyn MediaEngine>,
    signaling: Arc<dyn SignalingOutput>,
    channel_capacity: usize,
}

impl RoomManager {
    pub fn new(
        mode: CallMode,
        engine: Arc<dyn MediaEngine>,
        signaling: Arc<dyn SignalingOutput>,
    ) -> Self {
        Self {
            mode,
            rooms: Arc::new(DashMap::new()),
            engine,
            signaling,
            channel_capacity: DEFAULT_ROOM_CHANNEL_CAPACITY,
        }
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    pub fn mode(&self) -> CallMode {
        self.mode
    }

    /// The live room, if any. Closed rooms are never returned.
    pub fn get(&self, room_id: &RoomId) -> Option<RoomHandle> {
        self.rooms
            .get(room_id)
            .map(|entry| entry.value().clone())
            .filter(|handle| !handle.is_closed())
    }

    /// Returns the live room or spawns a new one, replacing a closed entry.
    pub fn get_or_create(&self, room_id: &RoomId) -> RoomHandle {
        let mut entry = self.rooms.entry(room_id.clone()).or_insert_with(|| {
            self.spawn_room(room_id)
        });
        if entry.is_closed() {
            *entry = self.spawn_room(room_id);
        }
        entry.value().clone()
    }

    /// Joins `room_id`. A room that closed while the request was queued is
    /// replaced and the join retried, up to [`MAX_JOIN_ATTEMPTS`] times.
    pub async fn join(
        &self,
        room_id: &RoomId,
        connection_id: ConnectionId,
        options: JoinOptions,
    ) -> Result<(RoomHandle, Role), SignalingError> {
        let mut attempt = 1;
        loop {
            let handle = self.get_or_create(room_id);
            match handle.join(connection_id.clone(), options.clone()).await {
                Err(SignalingError::RoomClosed) if attempt < MAX_JOIN_ATTEMPTS => {
                    debug!("Room {} closed during join, retrying", room_id);
                    attempt += 1;
                }
                result => return result.map(|role| (handle, role)),
            }
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms
            .iter()
            .filter(|entry| !entry.value().is_closed())
            .count()
    }

    fn spawn_room(&self, room_id: &RoomId) -> RoomHandle {
        info!("Creating new {} room: {}", self.mode, room_id);
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let handle = RoomHandle::new(room_id.clone(), tx);

        let room = Room::new(
            room_id.clone(),
            self.mode,
            rx,
            self.engine.clone(),
            self.signaling.clone(),
        );
        let rooms = self.rooms.clone();
        let finished = handle.clone();
        tokio::spawn(async move {
            room.run().await;
            rooms.remove_if(finished.room_id(), |_, current| current.same_channel(&finished));
        });

        handle
    }
}
