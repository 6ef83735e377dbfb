//! OAuth2 authorization seam
//!
//! Stream keys come from an external authorization service the user has to
//! visit in a browser. This module defines the resolver trait and the data
//! that flows through one authorization round:
//! - `authorization_url`: obtain the URL the user opens to authorize
//! - `wait_for_token`: wait until the service delivers the user's token
//! - `exchange_token`: trade the token for stream key material
//!
//! The production resolver talks NATS request/reply; see `NatsAuthResolver`.

mod nats;

pub use nats::NatsAuthResolver;

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

/// Correlation identity of one authorization flow.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AuthIdentity {
    pub meeting_id: String,
    pub user_id: String,
}

impl AuthIdentity {
    pub fn new(meeting_id: String, user_id: String) -> Self {
        Self {
            meeting_id,
            user_id,
        }
    }

    /// Composite key the authorization service correlates by.
    pub fn composite(&self) -> String {
        format!("{}{}", self.meeting_id, self.user_id)
    }
}

impl fmt::Display for AuthIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.meeting_id, self.user_id)
    }
}

/// An issued authorization URL plus the server-side handle that correlates
/// the eventual token.
#[derive(Debug, Clone)]
pub struct AuthChallenge {
    pub identity: AuthIdentity,
    pub handle: String,
    pub url: String,
}

/// Token delivered once the user has authorized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthToken(pub String);

/// Stream key material returned by the token exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamKey {
    pub key: String,
    pub video_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authorization service unavailable: {0}")]
    Unavailable(String),

    #[error("timed out waiting for the authorization token")]
    TokenTimeout,

    #[error("timed out exchanging the authorization token")]
    ExchangeTimeout,

    #[error("token exchange rejected: {0}")]
    Rejected(String),

    #[error("malformed reply from the authorization service: {0}")]
    BadReply(String),
}

#[async_trait]
pub trait AuthResolver: Send + Sync {
    async fn authorization_url(&self, identity: &AuthIdentity) -> Result<AuthChallenge, AuthError>;

    async fn wait_for_token(&self, challenge: &AuthChallenge) -> Result<AuthToken, AuthError>;

    async fn exchange_token(&self, token: &AuthToken) -> Result<StreamKey, AuthError>;
}
