use anyhow::Result;
use serde::Deserialize;

use crate::nats::TerminationSchema;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub bus: BusConfig,
    pub auth: AuthConfig,
    pub relay: RelayConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

/// Message bus connection and subject layout.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub url: String,
    /// Subject carrying inbound stream control messages
    pub control_subject: String,
    /// Subject for outbound lifecycle and authorization events
    pub events_subject: String,
    /// Subject for outbound error notices
    pub errors_subject: String,
    /// Subject announcing meeting termination
    pub termination_subject: String,
    /// Wire generation of the termination signal
    pub termination_schema: TerminationSchema,
}

/// External OAuth2 authorization service.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Request/reply subject issuing authorization URLs
    pub url_subject: String,
    /// Request/reply subject exchanging tokens for stream keys
    pub exchange_subject: String,
    /// Tokens arrive on `<prefix>.<meeting_id>.<user_id>`
    pub token_subject_prefix: String,
    /// How long to wait for the user to authorize
    pub token_timeout_secs: u64,
    /// How long to wait for the token exchange reply
    pub exchange_timeout_secs: u64,
}

/// Command line of the relay process launched per stream.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub command: String,
    /// Arguments with `{meeting_id}`, `{conference}` and `{stream_url}`
    /// placeholders filled in per session
    pub args: Vec<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "meetcast".to_string(),
            http: HttpConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8780,
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            control_subject: "stream.control".to_string(),
            events_subject: "stream.events".to_string(),
            errors_subject: "stream.errors".to_string(),
            termination_subject: "meeting.ended".to_string(),
            termination_schema: TerminationSchema::Current,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            url_subject: "auth.url".to_string(),
            exchange_subject: "auth.exchange".to_string(),
            token_subject_prefix: "auth.token".to_string(),
            token_timeout_secs: 120,
            exchange_timeout_secs: 15,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            command: "ffmpeg".to_string(),
            args: vec![
                "-hide_banner".to_string(),
                "-loglevel".to_string(),
                "error".to_string(),
                "-re".to_string(),
                "-i".to_string(),
                "{conference}".to_string(),
                "-c".to_string(),
                "copy".to_string(),
                "-f".to_string(),
                "flv".to_string(),
                "{stream_url}".to_string(),
            ],
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
