//! Streaming session abstraction
//!
//! This module defines what a session is to the rest of the service:
//! - `StreamSession`: one live relay bound to a single meeting
//! - `SessionFactory`: constructs sessions so backends stay swappable
//! - `SessionEvent`: lifecycle notifications a running session reports
//! - `RelaySession`: the production backend supervising a relay process

mod relay;

pub use relay::{RelayFactory, RelaySession};

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Lifecycle notifications emitted by a running session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session is live and relaying media
    Started,
    /// The session ended, on request or on its own
    Stopped { reason: Option<String> },
}

/// Errors reported by session backends.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The relay could not be launched at all
    #[error("failed to launch relay: {0}")]
    Launch(String),

    /// The session is not running
    #[error("session is not running")]
    NotRunning,

    /// Backend-specific failure
    #[error("{0}")]
    Backend(String),
}

/// Everything needed to construct a session for one meeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionBinding {
    pub meeting_id: String,
    /// Conference source the relay pulls from
    pub conference: Option<String>,
    /// Ingest URL the relay pushes to
    pub stream_url: Option<String>,
}

/// One active streaming session bound to a single meeting.
///
/// `start` performs the asynchronous launch and, on success, hands back the
/// channel on which the session reports its lifecycle. `stop` and `ping` are
/// quick signals; implementations keep their own interior state so the
/// caller can hold the session behind an `Arc`.
#[async_trait]
pub trait StreamSession: Send + Sync {
    async fn start(&self) -> Result<mpsc::Receiver<SessionEvent>, SessionError>;

    async fn stop(&self) -> Result<(), SessionError>;

    /// Liveness check driven by keep-alive messages
    async fn ping(&self) -> Result<(), SessionError>;
}

/// Builds sessions; the manager never constructs one directly.
pub trait SessionFactory: Send + Sync {
    fn create(&self, binding: SessionBinding) -> Arc<dyn StreamSession>;
}
