use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::auth::AuthIdentity;
use crate::nats::messages::InboundEnvelope;
use crate::session::{SessionError, SessionEvent, StreamSession};

/// Everything the manager reacts to, inbound and internal.
///
/// Spawned work never touches the registry directly; it re-enters through
/// one of these so the manager task stays the single owner.
pub enum ManagerCommand {
    /// One control message from the bus
    Inbound(InboundEnvelope),
    /// A meeting was torn down out-of-band
    Terminate { meeting_id: String },
    /// A spawned session start finished
    StartCompleted {
        meeting_id: String,
        instance: Uuid,
        session: Arc<dyn StreamSession>,
        result: Result<mpsc::Receiver<SessionEvent>, SessionError>,
    },
    /// A running session reported it is live
    SessionLive { meeting_id: String, instance: Uuid },
    /// A running session reported it stopped
    SessionClosed {
        meeting_id: String,
        instance: Uuid,
        reason: Option<String>,
    },
    /// An authorization flow ran to completion
    AuthFlowFinished { identity: AuthIdentity, flow: Uuid },
    /// Snapshot request from the status surface
    Status {
        respond_to: oneshot::Sender<ManagerStatus>,
    },
    /// Graceful teardown of every active session
    Shutdown { respond_to: oneshot::Sender<()> },
}

/// Outbound lifecycle and error events, one variant per published message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    StreamStarted {
        meeting_id: String,
        stream_url: Option<String>,
        stream_type: Option<String>,
    },
    StreamStopped {
        meeting_id: String,
    },
    AuthUrl {
        meeting_id: String,
        user_id: String,
        url: String,
    },
    AuthData {
        meeting_id: String,
        user_id: String,
        key: Option<String>,
        video_id: Option<String>,
        error: Option<String>,
    },
    ErrorNotice {
        meeting_id: String,
        code: String,
        details: String,
    },
}

impl OutboundEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundEvent::StreamStarted { .. } => "StreamStarted",
            OutboundEvent::StreamStopped { .. } => "StreamStopped",
            OutboundEvent::AuthUrl { .. } => "AuthUrl",
            OutboundEvent::AuthData { .. } => "AuthData",
            OutboundEvent::ErrorNotice { .. } => "ErrorNotice",
        }
    }

    pub fn meeting_id(&self) -> &str {
        match self {
            OutboundEvent::StreamStarted { meeting_id, .. }
            | OutboundEvent::StreamStopped { meeting_id }
            | OutboundEvent::AuthUrl { meeting_id, .. }
            | OutboundEvent::AuthData { meeting_id, .. }
            | OutboundEvent::ErrorNotice { meeting_id, .. } => meeting_id,
        }
    }
}

/// How one inbound control message was disposed of.
///
/// Names the lifecycle policies explicitly so callers and tests can assert
/// on them instead of inferring from side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// A new session was registered and its start launched
    StartLaunched,
    /// A session was already active, the duplicate start was ignored
    DuplicateStartIgnored,
    /// Stop processed; `was_active` is false for the best-effort stop of
    /// a meeting with no session
    Stopped { was_active: bool },
    /// Keep-alive forwarded to the session
    Pinged,
    /// Keep-alive for a meeting with no session, logged only
    PingIgnored,
    /// Authorization flow launched, aborting any pending flow for the
    /// same identity
    AuthLaunched { replaced_pending: bool },
    /// Unrecognized message name, error notice published
    Rejected,
}

/// Snapshot served over the status surface.
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStatus {
    pub active_meetings: Vec<String>,
    pub pending_auth_flows: usize,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: f64,
}
