use crate::model::call::{CallResponse, Role};
use crate::model::candidate::IceCandidate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

/// Typed inbound signaling method.
///
/// Parsed from the `method`/`params` pair of a [`RequestBody`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "camelCase")]
pub enum SignalRequest {
    #[serde(rename_all = "camelCase")]
    Register {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        room: Option<String>,
        /// Ask the engine to accept several encodings of each published track.
        #[serde(default)]
        simulcast: bool,
    },
    Call {
        to: String,
    },
    #[serde(rename_all = "camelCase")]
    NegotiateWebRtc {
        #[serde(default)]
        sdp_offer: Option<String>,
        #[serde(default)]
        user_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    ProcessAnswer {
        sdp_answer: String,
        #[serde(default)]
        user_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    IceCandidate {
        candidate: IceCandidate,
        #[serde(default)]
        user_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    SwitchQuality {
        #[serde(default)]
        user_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    StopUserSession {
        user_id: String,
    },
    Stop {},
}

impl SignalRequest {
    pub const METHODS: [&'static str; 8] = [
        "register",
        "call",
        "negotiateWebRtc",
        "processAnswer",
        "iceCandidate",
        "switchQuality",
        "stopUserSession",
        "stop",
    ];

    /// Builds a request from a method name and its raw params.
    ///
    /// Missing params are treated as an empty object so parameterless
    /// methods such as `stop` can be sent without them.
    pub fn parse(method: &str, params: Value) -> Result<Self, serde_json::Error> {
        let params = match params {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        serde_json::from_value(serde_json::json!({ "method": method, "params": params }))
    }

    pub fn is_known_method(method: &str) -> bool {
        Self::METHODS.contains(&method)
    }

    pub fn method(&self) -> &'static str {
        match self {
            SignalRequest::Register { .. } => "register",
            SignalRequest::Call { .. } => "call",
            SignalRequest::NegotiateWebRtc { .. } => "negotiateWebRtc",
            SignalRequest::ProcessAnswer { .. } => "processAnswer",
            SignalRequest::IceCandidate { .. } => "iceCandidate",
            SignalRequest::SwitchQuality { .. } => "switchQuality",
            SignalRequest::StopUserSession { .. } => "stopUserSession",
            SignalRequest::Stop {} => "stop",
        }
    }
}

/// Server to client, fire-and-forget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "camelCase")]
pub enum Notification {
    #[serde(rename_all = "camelCase")]
    IceCandidate {
        candidate: IceCandidate,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    ViewerNegotiation {
        sdp_offer: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
    },
    StopMediaSession {
        reason: String,
    },
}

/// Server to client, expects a [`ResponseBody`] back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "camelCase")]
pub enum PeerRequest {
    IncomingCall { caller: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestBody {
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseBody {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl ResponseBody {
    pub fn ok(id: u64, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: u64, error: ErrorBody) -> Self {
        Self {
            id,
            result: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "d", rename_all = "camelCase")]
pub enum ClientMessage {
    Request(RequestBody),
    Response(ResponseBody),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "d", rename_all = "camelCase")]
pub enum ServerMessage {
    Response(ResponseBody),
    Notification(Notification),
    Request {
        id: u64,
        #[serde(flatten)]
        request: PeerRequest,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub response: String,
    #[serde(rename = "type")]
    pub role: Role,
}

impl RegisterResponse {
    pub fn accepted(role: Role) -> Self {
        Self {
            response: "accepted".to_owned(),
            role,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiationResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_offer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_answer: Option<String>,
}

impl NegotiationResponse {
    pub fn offer(sdp: String) -> Self {
        Self {
            sdp_offer: Some(sdp),
            sdp_answer: None,
        }
    }

    pub fn answer(sdp: String) -> Self {
        Self {
            sdp_offer: None,
            sdp_answer: Some(sdp),
        }
    }
}

/// Parses the `result` of an `incomingCall` response.
pub fn parse_call_response(value: Value) -> Result<CallResponse, serde_json::Error> {
    serde_json::from_value(value)
}
