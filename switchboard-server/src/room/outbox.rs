use crate::signaling::SignalingOutput;
use std::sync::Arc;
use switchboard_core::{ConnectionId, Notification, RoomId};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Ordered, best-effort notification delivery off the room's event loop.
///
/// The room only enqueues; a dedicated task performs the sends, so a slow
/// or dead connection never blocks room mutations. Failures are logged and
/// not retried.
pub struct Outbox {
    tx: mpsc::UnboundedSender<(ConnectionId, Notification)>,
}

impl Outbox {
    pub fn spawn(room_id: RoomId, signaling: Arc<dyn SignalingOutput>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(deliver(room_id, rx, signaling));
        Self { tx }
    }

    pub fn push(&self, to: ConnectionId, notification: Notification) {
        if self.tx.send((to, notification)).is_err() {
            warn!("Outbox delivery task is gone, dropping notification");
        }
    }
}

async fn deliver(
    room_id: RoomId,
    mut rx: mpsc::UnboundedReceiver<(ConnectionId, Notification)>,
    signaling: Arc<dyn SignalingOutput>,
) {
    while let Some((to, notification)) = rx.recv().await {
        let method = notification_name(&notification);
        match signaling.notify(&to, notification).await {
            Ok(()) => debug!("[{}] {} delivered to {}", room_id, method, to),
            Err(e) => warn!("[{}] {} to {} not delivered: {}", room_id, method, to, e),
        }
    }
    debug!("[{}] outbox closed", room_id);
}

fn notification_name(notification: &Notification) -> &'static str {
    match notification {
        Notification::IceCandidate { .. } => "iceCandidate",
        Notification::ViewerNegotiation { .. } => "viewerNegotiation",
        Notification::StopMediaSession { .. } => "stopMediaSession",
    }
}
