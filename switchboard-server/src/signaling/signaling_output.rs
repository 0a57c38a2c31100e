use crate::error::DeliveryError;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use switchboard_core::{ConnectionId, Notification, PeerRequest};

/// Outbound half of the transport, as seen by rooms and hubs.
///
/// Implementations must serialize writes per connection.
#[async_trait]
pub trait SignalingOutput: Send + Sync {
    /// Fire-and-forget message to one connection.
    async fn notify(
        &self,
        connection_id: &ConnectionId,
        notification: Notification,
    ) -> Result<(), DeliveryError>;

    /// Sends a request and waits up to `timeout` for the client's `result`.
    async fn request(
        &self,
        connection_id: &ConnectionId,
        request: PeerRequest,
        timeout: Duration,
    ) -> Result<Value, DeliveryError>;
}
