use serde::{Deserialize, Serialize};

// Control message names routed by the stream manager
pub const START_STREAM: &str = "StartStream";
pub const STOP_STREAM: &str = "StopStream";
pub const STREAM_KEEP_ALIVE: &str = "StreamKeepAlive";
pub const GET_OAUTH2_URL: &str = "GetOAuth2Url";

/// Inbound control envelope: routing header plus optional request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEnvelope {
    pub core: EnvelopeCore,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeCore {
    pub header: EnvelopeHeader,
    #[serde(default)]
    pub body: EnvelopeBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeHeader {
    pub meeting_id: String,
    /// Only present on user-scoped requests
    #[serde(default)]
    pub user_id: String,
    /// Message name the dispatch routes on
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnvelopeBody {
    pub stream_url: Option<String>,
    pub stream_type: Option<String>,
    pub confname: Option<String>,
}

/// Stream lifecycle event broadcast to viewers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamEventMessage {
    pub meeting_id: String,
    #[serde(rename = "type")]
    pub kind: StreamEventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_type: Option<String>,
    pub timestamp: String, // RFC3339 timestamp
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamEventKind {
    Started,
    Stopped,
}

/// Authorization URL handed to the requesting user
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUrlMessage {
    pub meeting_id: String,
    pub user_id: String,
    pub url: String,
    pub timestamp: String,
}

/// Outcome of the token-for-key exchange, success or failure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthDataMessage {
    pub meeting_id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: String,
}

/// Failure notice published on the error subject
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorNotice {
    pub meeting_id: String,
    pub code: String,
    pub details: String,
    pub timestamp: String,
}
