use thiserror::Error;

use crate::auth::AuthError;
use crate::session::SessionError;

/// Failure taxonomy of the stream manager.
///
/// Not every variant reaches the bus: invalid requests and failed starts go
/// out as error notices, authorization failures travel inside the auth data
/// message, and session operation failures are only logged.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("unrecognized message name: {name}")]
    InvalidRequest { name: String },

    #[error("a stream is already active for meeting {0}")]
    DuplicateStart(String),

    #[error("stream start failed: {0}")]
    SessionStart(#[source] SessionError),

    #[error("session operation failed: {0}")]
    SessionOperation(#[source] SessionError),

    #[error("authorization exchange failed: {0}")]
    AuthExchange(#[source] AuthError),
}

impl ManagerError {
    /// Stable code carried in error notices on the bus.
    pub fn code(&self) -> &'static str {
        match self {
            ManagerError::InvalidRequest { .. } => "INVALID_REQUEST",
            ManagerError::DuplicateStart(_) => "DUPLICATE_START",
            ManagerError::SessionStart(_) => "STREAM_START_FAILED",
            ManagerError::SessionOperation(_) => "STREAM_OPERATION_FAILED",
            ManagerError::AuthExchange(_) => "AUTH_EXCHANGE_FAILED",
        }
    }
}
