use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Connection graph a signaling scope builds between its participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CallMode {
    /// Two named clients, paired by an accepted `call`.
    OneToOne,
    /// A single participant whose media is sent back to itself.
    Loopback,
    /// First joiner presents, every later joiner views.
    Presenter,
    /// Every participant receives every other participant.
    Mesh,
    /// One shared engine endpoint, one sub-session per viewer stream.
    SharedSession,
}

impl CallMode {
    pub const ALL: [CallMode; 5] = [
        CallMode::OneToOne,
        CallMode::Loopback,
        CallMode::Presenter,
        CallMode::Mesh,
        CallMode::SharedSession,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CallMode::OneToOne => "oneToOne",
            CallMode::Loopback => "loopback",
            CallMode::Presenter => "presenter",
            CallMode::Mesh => "mesh",
            CallMode::SharedSession => "sharedSession",
        }
    }
}

impl fmt::Display for CallMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CallMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| format!("unknown call mode '{s}'"))
    }
}

/// Topology role assigned on join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Presenter,
    Viewer,
    Peer,
}

/// Receive-bitrate tier of a shared-session stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    #[default]
    High,
    Low,
}

impl QualityTier {
    pub const HIGH_BITRATE_BPS: u32 = 2_000_000;
    pub const LOW_BITRATE_BPS: u32 = 240_000;

    pub fn bitrate_bps(&self) -> u32 {
        match self {
            QualityTier::High => Self::HIGH_BITRATE_BPS,
            QualityTier::Low => Self::LOW_BITRATE_BPS,
        }
    }

    pub fn toggled(&self) -> Self {
        match self {
            QualityTier::High => QualityTier::Low,
            QualityTier::Low => QualityTier::High,
        }
    }
}

/// Callee's answer to an `incomingCall` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallOutcome {
    Accepted,
    Rejected,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallResponse {
    pub response: CallOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CallResponse {
    pub fn accepted() -> Self {
        Self {
            response: CallOutcome::Accepted,
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            response: CallOutcome::Failed,
            message: Some(message.into()),
        }
    }
}

/// Client-chosen name of one negotiated stream inside a shared session.
///
/// Requests without a `userId` address the connection's primary stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamId(pub String);

impl StreamId {
    pub const PRIMARY: &'static str = "self";
    pub const PRESENTER_ALIAS: &'static str = "presenter";

    pub fn primary() -> Self {
        Self(Self::PRIMARY.to_owned())
    }

    pub fn from_user_id(user_id: Option<String>) -> Self {
        user_id.map(Self).unwrap_or_else(Self::primary)
    }

    pub fn is_primary(&self) -> bool {
        self.0 == Self::PRIMARY
    }

    /// Streams the presenter may publish on.
    pub fn is_master_candidate(&self) -> bool {
        self.is_primary() || self.0 == Self::PRESENTER_ALIAS
    }

    /// Value echoed back to clients in `userId` fields.
    pub fn as_user_id(&self) -> Option<String> {
        (!self.is_primary()).then(|| self.0.clone())
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
