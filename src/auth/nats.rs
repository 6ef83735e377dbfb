use async_trait::async_trait;
use futures::stream::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{AuthChallenge, AuthError, AuthIdentity, AuthResolver, AuthToken, StreamKey};
use crate::config::AuthConfig;

#[derive(Debug, Serialize)]
struct AuthUrlRequest {
    identity: String,
}

#[derive(Debug, Deserialize)]
struct AuthUrlReply {
    handle: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct TokenMessage {
    token: String,
}

#[derive(Debug, Serialize)]
struct ExchangeRequest {
    token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeReply {
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    video_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Resolver backed by the authorization service on the message bus.
///
/// URLs and token exchanges are request/reply; tokens arrive on a dedicated
/// per-identity subject once the user has authorized in the browser.
pub struct NatsAuthResolver {
    client: async_nats::Client,
    config: AuthConfig,
}

impl NatsAuthResolver {
    pub fn new(client: async_nats::Client, config: AuthConfig) -> Self {
        Self { client, config }
    }

    fn token_subject(&self, identity: &AuthIdentity) -> String {
        format!(
            "{}.{}.{}",
            self.config.token_subject_prefix, identity.meeting_id, identity.user_id
        )
    }
}

#[async_trait]
impl AuthResolver for NatsAuthResolver {
    async fn authorization_url(&self, identity: &AuthIdentity) -> Result<AuthChallenge, AuthError> {
        let request = AuthUrlRequest {
            identity: identity.composite(),
        };
        let payload = serde_json::to_vec(&request)
            .map_err(|e| AuthError::Unavailable(format!("could not encode URL request: {}", e)))?;

        let reply = self
            .client
            .request(self.config.url_subject.clone(), payload.into())
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        let reply: AuthUrlReply = serde_json::from_slice(&reply.payload)
            .map_err(|e| AuthError::BadReply(e.to_string()))?;

        Ok(AuthChallenge {
            identity: identity.clone(),
            handle: reply.handle,
            url: reply.url,
        })
    }

    async fn wait_for_token(&self, challenge: &AuthChallenge) -> Result<AuthToken, AuthError> {
        let subject = self.token_subject(&challenge.identity);
        let mut subscriber = self
            .client
            .subscribe(subject.clone())
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        debug!("Waiting for authorization token on {}", subject);
        while let Some(message) = subscriber.next().await {
            match serde_json::from_slice::<TokenMessage>(&message.payload) {
                Ok(token) => {
                    let _ = subscriber.unsubscribe().await;
                    return Ok(AuthToken(token.token));
                }
                Err(e) => warn!("Ignoring malformed token message on {}: {}", subject, e),
            }
        }

        Err(AuthError::Unavailable(
            "token subscription closed".to_string(),
        ))
    }

    async fn exchange_token(&self, token: &AuthToken) -> Result<StreamKey, AuthError> {
        let request = ExchangeRequest {
            token: token.0.clone(),
        };
        let payload = serde_json::to_vec(&request).map_err(|e| {
            AuthError::Unavailable(format!("could not encode exchange request: {}", e))
        })?;

        let reply = self
            .client
            .request(self.config.exchange_subject.clone(), payload.into())
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        let reply: ExchangeReply = serde_json::from_slice(&reply.payload)
            .map_err(|e| AuthError::BadReply(e.to_string()))?;

        if let Some(error) = reply.error {
            return Err(AuthError::Rejected(error));
        }
        match reply.key {
            Some(key) => Ok(StreamKey {
                key,
                video_id: reply.video_id,
            }),
            None => Err(AuthError::BadReply(
                "reply carried neither key nor error".to_string(),
            )),
        }
    }
}
