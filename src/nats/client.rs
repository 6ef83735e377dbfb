use anyhow::{Context, Result};
use async_nats::Client;
use futures::stream::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::messages::{
    AuthDataMessage, AuthUrlMessage, ErrorNotice, InboundEnvelope, StreamEventKind,
    StreamEventMessage,
};
use crate::config::BusConfig;
use crate::stream::{ManagerCommand, OutboundEvent};

/// Bus-facing side of the service.
///
/// Owns the NATS connection plus subject layout and converts between bus
/// payloads and the manager's channel types: control messages and
/// termination signals flow in as commands, outbound events flow back out
/// as JSON on their subjects.
#[derive(Clone)]
pub struct BusClient {
    client: Client,
    config: BusConfig,
}

impl BusClient {
    /// Connect to the NATS server
    pub async fn connect(config: BusConfig) -> Result<Self> {
        info!("Connecting to NATS at {}", config.url);

        let client = async_nats::connect(&config.url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self { client, config })
    }

    /// Wrap an already-established connection
    pub fn with_client(client: Client, config: BusConfig) -> Self {
        Self { client, config }
    }

    /// Handle to the underlying connection, shared with the auth resolver
    pub fn client(&self) -> Client {
        self.client.clone()
    }

    /// Publish one outbound event on its subject
    pub async fn publish_event(&self, event: &OutboundEvent) -> Result<()> {
        let (subject, payload) = self.encode(event)?;

        self.client
            .publish(subject.clone(), payload.into())
            .await
            .context("Failed to publish outbound event")?;

        debug!("Published {} to {}", event.kind(), subject);

        Ok(())
    }

    fn encode(&self, event: &OutboundEvent) -> Result<(String, Vec<u8>)> {
        let timestamp = chrono::Utc::now().to_rfc3339();
        match event {
            OutboundEvent::StreamStarted {
                meeting_id,
                stream_url,
                stream_type,
            } => {
                let message = StreamEventMessage {
                    meeting_id: meeting_id.clone(),
                    kind: StreamEventKind::Started,
                    stream_url: stream_url.clone(),
                    stream_type: stream_type.clone(),
                    timestamp,
                };
                Ok((self.config.events_subject.clone(), serde_json::to_vec(&message)?))
            }
            OutboundEvent::StreamStopped { meeting_id } => {
                let message = StreamEventMessage {
                    meeting_id: meeting_id.clone(),
                    kind: StreamEventKind::Stopped,
                    stream_url: None,
                    stream_type: None,
                    timestamp,
                };
                Ok((self.config.events_subject.clone(), serde_json::to_vec(&message)?))
            }
            OutboundEvent::AuthUrl {
                meeting_id,
                user_id,
                url,
            } => {
                let message = AuthUrlMessage {
                    meeting_id: meeting_id.clone(),
                    user_id: user_id.clone(),
                    url: url.clone(),
                    timestamp,
                };
                Ok((self.config.events_subject.clone(), serde_json::to_vec(&message)?))
            }
            OutboundEvent::AuthData {
                meeting_id,
                user_id,
                key,
                video_id,
                error,
            } => {
                let message = AuthDataMessage {
                    meeting_id: meeting_id.clone(),
                    user_id: user_id.clone(),
                    key: key.clone(),
                    video_id: video_id.clone(),
                    error: error.clone(),
                    timestamp,
                };
                Ok((self.config.events_subject.clone(), serde_json::to_vec(&message)?))
            }
            OutboundEvent::ErrorNotice {
                meeting_id,
                code,
                details,
            } => {
                let message = ErrorNotice {
                    meeting_id: meeting_id.clone(),
                    code: code.clone(),
                    details: details.clone(),
                    timestamp,
                };
                Ok((self.config.errors_subject.clone(), serde_json::to_vec(&message)?))
            }
        }
    }

    /// Drain the manager's outbound channel onto the bus.
    pub async fn run_publisher(self, mut events: mpsc::Receiver<OutboundEvent>) {
        while let Some(event) = events.recv().await {
            if let Err(e) = self.publish_event(&event).await {
                error!("Failed to publish {}: {}", event.kind(), e);
            }
        }
        debug!("Outbound channel closed, publisher exiting");
    }

    /// Feed control messages into the manager. Malformed payloads are logged
    /// and dropped; they never stop the consumer.
    pub async fn run_control(self, commands: mpsc::Sender<ManagerCommand>) -> Result<()> {
        let mut subscriber = self
            .client
            .subscribe(self.config.control_subject.clone())
            .await
            .context("Failed to subscribe to control subject")?;

        info!(
            "Listening for control messages on {}",
            self.config.control_subject
        );

        while let Some(message) = subscriber.next().await {
            match serde_json::from_slice::<InboundEnvelope>(&message.payload) {
                Ok(envelope) => {
                    if commands
                        .send(ManagerCommand::Inbound(envelope))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(e) => warn!("Dropping malformed control message: {}", e),
            }
        }

        Ok(())
    }

    /// Feed meeting-termination signals into the manager.
    pub async fn run_termination(self, commands: mpsc::Sender<ManagerCommand>) -> Result<()> {
        let schema = self.config.termination_schema;
        let mut subscriber = self
            .client
            .subscribe(self.config.termination_subject.clone())
            .await
            .context("Failed to subscribe to termination subject")?;

        info!(
            "Tracking meeting termination on {} ({:?} schema)",
            self.config.termination_subject, schema
        );

        while let Some(message) = subscriber.next().await {
            match schema.decode(&message.payload) {
                Ok(meeting_id) => {
                    if commands
                        .send(ManagerCommand::Terminate { meeting_id })
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(e) => warn!("Dropping malformed termination signal: {}", e),
            }
        }

        Ok(())
    }
}
