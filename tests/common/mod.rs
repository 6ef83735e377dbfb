// Shared test doubles: scripted sessions, a scripted authorization
// resolver, and a harness that wires them to a running manager the same
// way the production backends are wired.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use meetcast::auth::{
    AuthChallenge, AuthError, AuthIdentity, AuthResolver, AuthToken, StreamKey,
};
use meetcast::nats::messages::{EnvelopeBody, EnvelopeCore, EnvelopeHeader, InboundEnvelope};
use meetcast::session::{SessionBinding, SessionError, SessionEvent, SessionFactory, StreamSession};
use meetcast::stream::{ManagerCommand, ManagerOptions, ManagerStatus, OutboundEvent, StreamManager};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

// ============================================================================
// Scripted session
// ============================================================================

/// Session the tests steer explicitly. In scripted mode `start` blocks until
/// the test releases it with an outcome; otherwise it succeeds immediately.
pub struct MockSession {
    pub binding: SessionBinding,
    starts: AtomicUsize,
    stops: AtomicUsize,
    pings: AtomicUsize,
    gate: Mutex<Option<oneshot::Receiver<Result<(), SessionError>>>>,
    release: Mutex<Option<oneshot::Sender<Result<(), SessionError>>>>,
    events: Mutex<Option<mpsc::Sender<SessionEvent>>>,
    stop_error: Mutex<Option<String>>,
    ping_error: Mutex<Option<String>>,
}

impl MockSession {
    fn new(binding: SessionBinding, scripted: bool) -> Self {
        let (release, gate) = if scripted {
            let (tx, rx) = oneshot::channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };
        Self {
            binding,
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            pings: AtomicUsize::new(0),
            gate: Mutex::new(gate),
            release: Mutex::new(release),
            events: Mutex::new(None),
            stop_error: Mutex::new(None),
            ping_error: Mutex::new(None),
        }
    }

    /// Let a scripted start finish with the given outcome
    pub fn release_start(&self, result: Result<(), SessionError>) {
        let tx = self
            .release
            .lock()
            .unwrap()
            .take()
            .expect("start already released");
        let _ = tx.send(result);
    }

    /// Report the session live; false when nobody listens anymore
    pub async fn emit_started(&self) -> bool {
        let tx = self.events.lock().unwrap().clone();
        match tx {
            Some(tx) => tx.send(SessionEvent::Started).await.is_ok(),
            None => false,
        }
    }

    /// Report the session stopped on its own
    pub async fn emit_stopped(&self, reason: Option<&str>) -> bool {
        let tx = self.events.lock().unwrap().clone();
        match tx {
            Some(tx) => tx
                .send(SessionEvent::Stopped {
                    reason: reason.map(str::to_string),
                })
                .await
                .is_ok(),
            None => false,
        }
    }

    pub fn set_stop_error(&self, message: &str) {
        *self.stop_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn set_ping_error(&self, message: &str) {
        *self.ping_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn ping_count(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamSession for MockSession {
    async fn start(&self) -> Result<mpsc::Receiver<SessionEvent>, SessionError> {
        self.starts.fetch_add(1, Ordering::SeqCst);

        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            match gate.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(e),
                Err(_) => return Err(SessionError::Backend("start gate dropped".to_string())),
            }
        }

        let (tx, rx) = mpsc::channel(8);
        *self.events.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn stop(&self) -> Result<(), SessionError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        match self.stop_error.lock().unwrap().clone() {
            Some(message) => Err(SessionError::Backend(message)),
            None => Ok(()),
        }
    }

    async fn ping(&self) -> Result<(), SessionError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        match self.ping_error.lock().unwrap().clone() {
            Some(message) => Err(SessionError::Backend(message)),
            None => Ok(()),
        }
    }
}

/// Hands out mock sessions and remembers every one it built.
#[derive(Clone)]
pub struct MockFactory {
    scripted: bool,
    created: Arc<Mutex<Vec<Arc<MockSession>>>>,
}

impl MockFactory {
    /// Sessions whose start succeeds immediately
    pub fn new() -> Self {
        Self {
            scripted: false,
            created: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Sessions whose start blocks until the test releases it
    pub fn scripted() -> Self {
        Self {
            scripted: true,
            created: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn session(&self, index: usize) -> Arc<MockSession> {
        self.created.lock().unwrap()[index].clone()
    }

    pub fn last(&self) -> Arc<MockSession> {
        self.created
            .lock()
            .unwrap()
            .last()
            .expect("no session was created")
            .clone()
    }
}

impl SessionFactory for MockFactory {
    fn create(&self, binding: SessionBinding) -> Arc<dyn StreamSession> {
        let session = Arc::new(MockSession::new(binding, self.scripted));
        self.created.lock().unwrap().push(session.clone());
        session
    }
}

// ============================================================================
// Scripted authorization resolver
// ============================================================================

/// Resolver with immediate URLs, test-delivered tokens, and a configurable
/// exchange outcome.
pub struct MockResolver {
    url: String,
    url_error: Mutex<Option<String>>,
    exchange: Mutex<Result<StreamKey, String>>,
    tokens: Mutex<HashMap<String, String>>,
    url_requests: AtomicUsize,
    handles: AtomicUsize,
}

impl MockResolver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            url: "https://auth.example/authorize".to_string(),
            url_error: Mutex::new(None),
            exchange: Mutex::new(Ok(StreamKey {
                key: "sk-live-123".to_string(),
                video_id: Some("vid-1".to_string()),
            })),
            tokens: Mutex::new(HashMap::new()),
            url_requests: AtomicUsize::new(0),
            handles: AtomicUsize::new(0),
        })
    }

    pub fn set_url_error(&self, message: &str) {
        *self.url_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn set_exchange_error(&self, message: &str) {
        *self.exchange.lock().unwrap() = Err(message.to_string());
    }

    /// Make the user's token available to the flow waiting for it
    pub fn deliver_token(&self, identity: &AuthIdentity, token: &str) {
        self.tokens
            .lock()
            .unwrap()
            .insert(identity.composite(), token.to_string());
    }

    pub fn url_request_count(&self) -> usize {
        self.url_requests.load(Ordering::SeqCst)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl AuthResolver for MockResolver {
    async fn authorization_url(&self, identity: &AuthIdentity) -> Result<AuthChallenge, AuthError> {
        self.url_requests.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.url_error.lock().unwrap().clone() {
            return Err(AuthError::Unavailable(message));
        }
        let handle = self.handles.fetch_add(1, Ordering::SeqCst);
        Ok(AuthChallenge {
            identity: identity.clone(),
            handle: format!("handle-{}", handle),
            url: self.url.clone(),
        })
    }

    async fn wait_for_token(&self, challenge: &AuthChallenge) -> Result<AuthToken, AuthError> {
        // Poll until the test delivers a token; the manager's timeout is the
        // only way out otherwise.
        loop {
            let delivered = self
                .tokens
                .lock()
                .unwrap()
                .remove(&challenge.identity.composite());
            match delivered {
                Some(token) => return Ok(AuthToken(token)),
                None => tokio::time::sleep(Duration::from_millis(5)).await,
            }
        }
    }

    async fn exchange_token(&self, _token: &AuthToken) -> Result<StreamKey, AuthError> {
        match self.exchange.lock().unwrap().clone() {
            Ok(key) => Ok(key),
            Err(message) => Err(AuthError::Rejected(message)),
        }
    }
}

// ============================================================================
// Manager harness
// ============================================================================

/// A running manager plus handles to everything around it.
pub struct Harness {
    pub commands: mpsc::Sender<ManagerCommand>,
    pub outbound: mpsc::Receiver<OutboundEvent>,
    pub factory: MockFactory,
    pub resolver: Arc<MockResolver>,
}

pub fn spawn_manager(options: ManagerOptions) -> Harness {
    spawn_manager_with(MockFactory::new(), options)
}

pub fn spawn_manager_with(factory: MockFactory, options: ManagerOptions) -> Harness {
    let resolver = MockResolver::new();
    let (outbound_tx, outbound) = mpsc::channel(64);
    let manager = StreamManager::new(
        options,
        Arc::new(factory.clone()),
        resolver.clone(),
        outbound_tx,
    );
    let commands = manager.commands();
    tokio::spawn(manager.run());
    Harness {
        commands,
        outbound,
        factory,
        resolver,
    }
}

impl Harness {
    pub async fn send(&self, envelope: InboundEnvelope) {
        self.commands
            .send(ManagerCommand::Inbound(envelope))
            .await
            .unwrap();
    }

    pub async fn recv_event(&mut self) -> OutboundEvent {
        timeout(Duration::from_secs(2), self.outbound.recv())
            .await
            .expect("timed out waiting for an outbound event")
            .expect("outbound channel closed")
    }

    pub async fn expect_no_event(&mut self) {
        if let Ok(Some(event)) = timeout(Duration::from_millis(100), self.outbound.recv()).await {
            panic!("unexpected outbound event: {:?}", event);
        }
    }

    pub async fn status(&self) -> ManagerStatus {
        let (respond_to, response) = oneshot::channel();
        self.commands
            .send(ManagerCommand::Status { respond_to })
            .await
            .unwrap();
        response.await.unwrap()
    }

    /// Most recently created session, waiting for the manager to build one
    pub async fn session(&self) -> Arc<MockSession> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            if self.factory.created_count() > 0 {
                return self.factory.last();
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("no session was created");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    pub async fn wait_for_no_pending_auth(&self) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            if self.status().await.pending_auth_flows == 0 {
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("pending authorization flows never drained");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// Poll until the condition holds or two seconds pass.
pub async fn eventually<F>(what: &str, check: F)
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting until {}", what);
}

// ============================================================================
// Envelope builders
// ============================================================================

pub fn envelope(name: &str, meeting_id: &str) -> InboundEnvelope {
    InboundEnvelope {
        core: EnvelopeCore {
            header: EnvelopeHeader {
                meeting_id: meeting_id.to_string(),
                user_id: String::new(),
                name: name.to_string(),
            },
            body: EnvelopeBody::default(),
        },
    }
}

pub fn start_envelope(
    meeting_id: &str,
    stream_url: &str,
    stream_type: &str,
    confname: &str,
) -> InboundEnvelope {
    let mut envelope = envelope("StartStream", meeting_id);
    envelope.core.body = EnvelopeBody {
        stream_url: Some(stream_url.to_string()),
        stream_type: Some(stream_type.to_string()),
        confname: Some(confname.to_string()),
    };
    envelope
}

pub fn auth_envelope(meeting_id: &str, user_id: &str) -> InboundEnvelope {
    let mut envelope = envelope("GetOAuth2Url", meeting_id);
    envelope.core.header.user_id = user_id.to_string();
    envelope
}
