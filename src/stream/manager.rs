use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::events::{Disposition, ManagerCommand, ManagerStatus, OutboundEvent};
use super::registry::{SessionRecord, SessionRegistry};
use crate::auth::{AuthChallenge, AuthError, AuthIdentity, AuthResolver, StreamKey};
use crate::error::ManagerError;
use crate::nats::messages::{self, EnvelopeBody, EnvelopeCore, EnvelopeHeader, InboundEnvelope};
use crate::session::{
    SessionBinding, SessionError, SessionEvent, SessionFactory, StreamSession,
};

const COMMAND_BUFFER: usize = 64;

/// Tunables for the manager's defensive timeouts.
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// How long an authorization flow waits for the user's token
    pub token_timeout: Duration,
    /// How long the token exchange may take
    pub exchange_timeout: Duration,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            token_timeout: Duration::from_secs(120),
            exchange_timeout: Duration::from_secs(15),
        }
    }
}

/// Coordinates every per-meeting streaming session.
///
/// One manager task owns the registry outright; bus consumers, spawned
/// session work, and the status surface all talk to it through the command
/// channel, so no meeting is ever handled from two places at once. Session
/// starts, stops, pings, and authorization flows run in spawned tasks and
/// report back as commands.
pub struct StreamManager {
    registry: SessionRegistry,
    factory: Arc<dyn SessionFactory>,
    resolver: Arc<dyn AuthResolver>,
    outbound: mpsc::Sender<OutboundEvent>,
    commands: mpsc::Sender<ManagerCommand>,
    inbox: mpsc::Receiver<ManagerCommand>,
    pending_auth: HashMap<AuthIdentity, (Uuid, AbortHandle)>,
    options: ManagerOptions,
    started_at: DateTime<Utc>,
}

impl StreamManager {
    pub fn new(
        options: ManagerOptions,
        factory: Arc<dyn SessionFactory>,
        resolver: Arc<dyn AuthResolver>,
        outbound: mpsc::Sender<OutboundEvent>,
    ) -> Self {
        let (commands, inbox) = mpsc::channel(COMMAND_BUFFER);
        Self {
            registry: SessionRegistry::new(),
            factory,
            resolver,
            outbound,
            commands,
            inbox,
            pending_auth: HashMap::new(),
            options,
            started_at: Utc::now(),
        }
    }

    /// Sender feeding this manager, cloned by consumers and spawned work
    pub fn commands(&self) -> mpsc::Sender<ManagerCommand> {
        self.commands.clone()
    }

    /// Run until shutdown is requested or every sender is gone.
    pub async fn run(mut self) {
        info!("Stream manager running");
        while let Some(command) = self.inbox.recv().await {
            match command {
                ManagerCommand::Inbound(envelope) => {
                    self.handle(envelope).await;
                }
                ManagerCommand::Terminate { meeting_id } => self.terminate(&meeting_id).await,
                ManagerCommand::StartCompleted {
                    meeting_id,
                    instance,
                    session,
                    result,
                } => {
                    self.start_completed(meeting_id, instance, session, result)
                        .await
                }
                ManagerCommand::SessionLive {
                    meeting_id,
                    instance,
                } => self.session_live(&meeting_id, instance).await,
                ManagerCommand::SessionClosed {
                    meeting_id,
                    instance,
                    reason,
                } => self.session_closed(&meeting_id, instance, reason).await,
                ManagerCommand::AuthFlowFinished { identity, flow } => {
                    self.auth_flow_finished(&identity, flow)
                }
                ManagerCommand::Status { respond_to } => {
                    let _ = respond_to.send(self.status());
                }
                ManagerCommand::Shutdown { respond_to } => {
                    self.shutdown().await;
                    let _ = respond_to.send(());
                    break;
                }
            }
        }
        info!("Stream manager stopped");
    }

    /// Route one inbound control message by meeting id and name.
    pub async fn handle(&mut self, envelope: InboundEnvelope) -> Disposition {
        let EnvelopeCore { header, body } = envelope.core;
        let EnvelopeHeader {
            meeting_id,
            user_id,
            name,
        } = header;

        debug!("Received [{}] for meeting {}", name, meeting_id);

        match name.as_str() {
            messages::START_STREAM => self.start_stream(meeting_id, body).await,
            messages::STOP_STREAM => self.stop_stream(&meeting_id).await,
            messages::STREAM_KEEP_ALIVE => self.keep_alive(&meeting_id),
            messages::GET_OAUTH2_URL => {
                self.launch_auth_flow(AuthIdentity::new(meeting_id, user_id))
            }
            other => {
                let err = ManagerError::InvalidRequest {
                    name: other.to_string(),
                };
                warn!("{} (meeting {})", err, meeting_id);
                self.publish_error(&meeting_id, &err).await;
                Disposition::Rejected
            }
        }
    }

    /// Register a session and launch its start in the background. A meeting
    /// with a session already registered keeps it untouched; the duplicate
    /// request is dropped.
    async fn start_stream(&mut self, meeting_id: String, body: EnvelopeBody) -> Disposition {
        if self.registry.contains(&meeting_id) {
            warn!("Not starting stream again for meeting {}", meeting_id);
            return Disposition::DuplicateStartIgnored;
        }

        let EnvelopeBody {
            stream_url,
            stream_type,
            confname,
        } = body;

        let session = self.factory.create(SessionBinding {
            meeting_id: meeting_id.clone(),
            conference: confname,
            stream_url: stream_url.clone(),
        });
        let record = SessionRecord::new(meeting_id.clone(), session.clone(), stream_url, stream_type);
        let instance = record.instance;

        if let Err(e) = self.registry.insert(record) {
            // unreachable after the contains check above
            error!("{}", e);
            return Disposition::DuplicateStartIgnored;
        }

        info!("Starting stream for meeting {}", meeting_id);
        let commands = self.commands.clone();
        tokio::spawn(async move {
            let result = session.start().await;
            let _ = commands
                .send(ManagerCommand::StartCompleted {
                    meeting_id,
                    instance,
                    session,
                    result,
                })
                .await;
        });

        Disposition::StartLaunched
    }

    async fn start_completed(
        &mut self,
        meeting_id: String,
        instance: Uuid,
        session: Arc<dyn StreamSession>,
        result: Result<mpsc::Receiver<SessionEvent>, SessionError>,
    ) {
        let still_current = self
            .registry
            .get(&meeting_id)
            .map(|record| record.instance)
            == Some(instance);

        if !still_current {
            // The record was stopped while the start was in flight. If the
            // session came up anyway, stop it so the relay does not outlive
            // its meeting.
            debug!(
                "Discarding stale start completion for meeting {}",
                meeting_id
            );
            if result.is_ok() {
                spawn_best_effort_stop(session, meeting_id);
            }
            return;
        }

        match result {
            Ok(events) => {
                info!("Started stream session for meeting {}", meeting_id);
                let commands = self.commands.clone();
                tokio::spawn(watch_session(meeting_id, instance, events, commands));
            }
            Err(e) => {
                let err = ManagerError::SessionStart(e);
                error!("Could not start stream for meeting {}: {}", meeting_id, err);
                // Drop the record first so the meeting can try a fresh start.
                self.registry.remove(&meeting_id);
                self.publish_error(&meeting_id, &err).await;
            }
        }
    }

    async fn session_live(&mut self, meeting_id: &str, instance: Uuid) {
        match self.registry.get(meeting_id) {
            Some(record) if record.instance == instance => {
                info!("Stream is live for meeting {}", meeting_id);
                let event = OutboundEvent::StreamStarted {
                    meeting_id: record.meeting_id.clone(),
                    stream_url: record.stream_url.clone(),
                    stream_type: record.stream_type.clone(),
                };
                self.publish(event).await;
            }
            _ => debug!(
                "Ignoring live notification from a stale session of meeting {}",
                meeting_id
            ),
        }
    }

    async fn session_closed(&mut self, meeting_id: &str, instance: Uuid, reason: Option<String>) {
        match self.registry.get(meeting_id) {
            Some(record) if record.instance == instance => {
                match &reason {
                    Some(reason) => info!("Stream stopped for meeting {}: {}", meeting_id, reason),
                    None => info!("Stream stopped for meeting {}", meeting_id),
                }
                self.registry.remove(meeting_id);
                self.publish(OutboundEvent::StreamStopped {
                    meeting_id: meeting_id.to_string(),
                })
                .await;
            }
            _ => debug!(
                "Ignoring stop notification from a stale session of meeting {}",
                meeting_id
            ),
        }
    }

    /// Best-effort stop: the session is signalled in the background and its
    /// errors only logged. The stopped event goes out regardless, so a stop
    /// is always acknowledged even when no session exists.
    async fn stop_stream(&mut self, meeting_id: &str) -> Disposition {
        let removed = self.registry.remove(meeting_id);
        let was_active = removed.is_some();

        match removed {
            Some(record) => {
                info!("Stopping stream for meeting {}", meeting_id);
                spawn_best_effort_stop(record.session, record.meeting_id);
            }
            None => warn!("No active stream to stop for meeting {}", meeting_id),
        }

        self.publish(OutboundEvent::StreamStopped {
            meeting_id: meeting_id.to_string(),
        })
        .await;

        Disposition::Stopped { was_active }
    }

    fn keep_alive(&mut self, meeting_id: &str) -> Disposition {
        match self.registry.get(meeting_id) {
            Some(record) => {
                debug!("Forwarding keep-alive for meeting {}", meeting_id);
                let session = record.session.clone();
                let meeting = record.meeting_id.clone();
                tokio::spawn(async move {
                    if let Err(e) = session.ping().await {
                        let err = ManagerError::SessionOperation(e);
                        warn!("Keep-alive failed for meeting {}: {}", meeting, err);
                    }
                });
                Disposition::Pinged
            }
            None => {
                warn!("No session to keep alive for meeting {}", meeting_id);
                Disposition::PingIgnored
            }
        }
    }

    /// Launch the authorization flow for one (meeting, user) identity. A
    /// flow already pending for the same identity is aborted first; the
    /// latest request wins.
    fn launch_auth_flow(&mut self, identity: AuthIdentity) -> Disposition {
        let replaced_pending = match self.pending_auth.remove(&identity) {
            Some((_, handle)) => {
                warn!("Replacing pending authorization flow for {}", identity);
                handle.abort();
                true
            }
            None => false,
        };

        info!("Starting authorization flow for {}", identity);
        let flow = Uuid::new_v4();
        let task = tokio::spawn(run_auth_flow(
            identity.clone(),
            flow,
            self.resolver.clone(),
            self.outbound.clone(),
            self.commands.clone(),
            self.options.clone(),
        ));
        self.pending_auth.insert(identity, (flow, task.abort_handle()));

        Disposition::AuthLaunched { replaced_pending }
    }

    fn auth_flow_finished(&mut self, identity: &AuthIdentity, flow: Uuid) {
        // A finished notification from an aborted flow must not evict its
        // replacement, so the flow id has to match.
        if let Some((pending, _)) = self.pending_auth.get(identity) {
            if *pending == flow {
                self.pending_auth.remove(identity);
            }
        }
    }

    /// Out-of-band teardown when the meeting itself ends. Same effect as a
    /// stop request, except an idle meeting produces no event: nobody asked.
    async fn terminate(&mut self, meeting_id: &str) {
        match self.registry.remove(meeting_id) {
            Some(record) => {
                info!("Meeting {} ended, tearing down its stream", meeting_id);
                spawn_best_effort_stop(record.session, record.meeting_id);
                self.publish(OutboundEvent::StreamStopped {
                    meeting_id: meeting_id.to_string(),
                })
                .await;
            }
            None => debug!("Meeting {} ended with no active stream", meeting_id),
        }
    }

    async fn shutdown(&mut self) {
        info!(
            "Shutting down stream manager with {} active sessions",
            self.registry.len()
        );

        for (_, (_, handle)) in self.pending_auth.drain() {
            handle.abort();
        }

        for record in self.registry.drain() {
            spawn_best_effort_stop(record.session, record.meeting_id.clone());
            self.publish(OutboundEvent::StreamStopped {
                meeting_id: record.meeting_id,
            })
            .await;
        }
    }

    fn status(&self) -> ManagerStatus {
        let uptime = Utc::now().signed_duration_since(self.started_at);
        ManagerStatus {
            active_meetings: self.registry.meeting_ids(),
            pending_auth_flows: self.pending_auth.len(),
            started_at: self.started_at,
            uptime_secs: uptime.num_milliseconds() as f64 / 1000.0,
        }
    }

    async fn publish(&self, event: OutboundEvent) {
        if self.outbound.send(event).await.is_err() {
            error!("Outbound channel closed, dropping event");
        }
    }

    async fn publish_error(&self, meeting_id: &str, err: &ManagerError) {
        self.publish(OutboundEvent::ErrorNotice {
            meeting_id: meeting_id.to_string(),
            code: err.code().to_string(),
            details: err.to_string(),
        })
        .await;
    }
}

fn spawn_best_effort_stop(session: Arc<dyn StreamSession>, meeting_id: String) {
    tokio::spawn(async move {
        if let Err(e) = session.stop().await {
            let err = ManagerError::SessionOperation(e);
            warn!("Error stopping session for meeting {}: {}", meeting_id, err);
        }
    });
}

/// Forward one session's lifecycle events back into the manager. Ends after
/// the stop notification; a session whose event channel just vanishes is
/// reported as stopped without a reason.
async fn watch_session(
    meeting_id: String,
    instance: Uuid,
    mut events: mpsc::Receiver<SessionEvent>,
    commands: mpsc::Sender<ManagerCommand>,
) {
    let mut stop_reason = None;
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Started => {
                let live = ManagerCommand::SessionLive {
                    meeting_id: meeting_id.clone(),
                    instance,
                };
                if commands.send(live).await.is_err() {
                    return;
                }
            }
            SessionEvent::Stopped { reason } => {
                stop_reason = reason;
                break;
            }
        }
    }

    let _ = commands
        .send(ManagerCommand::SessionClosed {
            meeting_id,
            instance,
            reason: stop_reason,
        })
        .await;
}

/// One complete authorization round: obtain the URL, hand it to the user,
/// wait for their token, exchange it for a stream key. The exchange outcome
/// always goes out as auth data, carrying the error inline when the flow
/// failed. Only URL issuance failing produces nothing, since there is no
/// flow to report on.
async fn run_auth_flow(
    identity: AuthIdentity,
    flow: Uuid,
    resolver: Arc<dyn AuthResolver>,
    outbound: mpsc::Sender<OutboundEvent>,
    commands: mpsc::Sender<ManagerCommand>,
    options: ManagerOptions,
) {
    match resolver.authorization_url(&identity).await {
        Err(e) => {
            warn!("Could not obtain authorization URL for {}: {}", identity, e);
        }
        Ok(challenge) => {
            info!("Sharing authorization URL for {}", identity);
            let _ = outbound
                .send(OutboundEvent::AuthUrl {
                    meeting_id: identity.meeting_id.clone(),
                    user_id: identity.user_id.clone(),
                    url: challenge.url.clone(),
                })
                .await;

            let event = match exchange_via_token(resolver.as_ref(), &challenge, &options).await {
                Ok(key) => {
                    info!("Sharing stream key material for {}", identity);
                    OutboundEvent::AuthData {
                        meeting_id: identity.meeting_id.clone(),
                        user_id: identity.user_id.clone(),
                        key: Some(key.key),
                        video_id: key.video_id,
                        error: None,
                    }
                }
                Err(e) => {
                    let err = ManagerError::AuthExchange(e);
                    warn!("Authorization flow failed for {}: {}", identity, err);
                    OutboundEvent::AuthData {
                        meeting_id: identity.meeting_id.clone(),
                        user_id: identity.user_id.clone(),
                        key: None,
                        video_id: None,
                        error: Some(err.to_string()),
                    }
                }
            };
            let _ = outbound.send(event).await;
        }
    }

    let _ = commands
        .send(ManagerCommand::AuthFlowFinished { identity, flow })
        .await;
}

async fn exchange_via_token(
    resolver: &dyn AuthResolver,
    challenge: &AuthChallenge,
    options: &ManagerOptions,
) -> Result<StreamKey, AuthError> {
    let token = timeout(options.token_timeout, resolver.wait_for_token(challenge))
        .await
        .map_err(|_| AuthError::TokenTimeout)??;

    timeout(options.exchange_timeout, resolver.exchange_token(&token))
        .await
        .map_err(|_| AuthError::ExchangeTimeout)?
}
