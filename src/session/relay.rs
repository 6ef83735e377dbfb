use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

use super::{SessionBinding, SessionError, SessionEvent, SessionFactory, StreamSession};
use crate::config::RelayConfig;

const EVENT_BUFFER: usize = 8;

/// Session backed by an external relay process (ffmpeg or compatible).
///
/// The child is spawned on `start` and supervised by a task that reports
/// `Started` once it is running and `Stopped` when it exits. `stop` signals
/// that task to kill the child; `ping` checks the child is still alive.
pub struct RelaySession {
    binding: SessionBinding,
    config: RelayConfig,
    launched: AtomicBool,
    running: Arc<AtomicBool>,
    kill: Mutex<Option<oneshot::Sender<()>>>,
}

impl RelaySession {
    pub fn new(binding: SessionBinding, config: RelayConfig) -> Self {
        Self {
            binding,
            config,
            launched: AtomicBool::new(false),
            running: Arc::new(AtomicBool::new(false)),
            kill: Mutex::new(None),
        }
    }
}

#[async_trait]
impl StreamSession for RelaySession {
    async fn start(&self) -> Result<mpsc::Receiver<SessionEvent>, SessionError> {
        if self.launched.swap(true, Ordering::SeqCst) {
            return Err(SessionError::Backend("session already started".to_string()));
        }

        let stream_url = self
            .binding
            .stream_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| SessionError::Launch("no stream URL provided".to_string()))?;

        let args = render_args(&self.config, &self.binding, stream_url);
        debug!(
            "Launching relay for meeting {}: {} {}",
            self.binding.meeting_id,
            self.config.command,
            args.join(" ")
        );

        let mut child = Command::new(&self.config.command)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SessionError::Launch(e.to_string()))?;

        let (kill_tx, kill_rx) = oneshot::channel();
        *self.kill.lock().await = Some(kill_tx);
        self.running.store(true, Ordering::SeqCst);

        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let meeting_id = self.binding.meeting_id.clone();
        let running = self.running.clone();

        tokio::spawn(async move {
            info!("Relay running for meeting {}", meeting_id);
            let _ = events_tx.send(SessionEvent::Started).await;

            let reason = tokio::select! {
                status = child.wait() => match status {
                    Ok(status) => Some(format!("relay exited ({})", status)),
                    Err(e) => Some(format!("relay wait failed: {}", e)),
                },
                _ = kill_rx => {
                    if let Err(e) = child.start_kill() {
                        warn!("Could not kill relay for meeting {}: {}", meeting_id, e);
                    }
                    let _ = child.wait().await;
                    Some("stopped on request".to_string())
                }
            };

            running.store(false, Ordering::SeqCst);
            debug!(
                "Relay finished for meeting {}: {}",
                meeting_id,
                reason.as_deref().unwrap_or("no reason")
            );
            let _ = events_tx.send(SessionEvent::Stopped { reason }).await;
        });

        Ok(events_rx)
    }

    async fn stop(&self) -> Result<(), SessionError> {
        match self.kill.lock().await.take() {
            Some(tx) => tx.send(()).map_err(|_| SessionError::NotRunning),
            None => Err(SessionError::NotRunning),
        }
    }

    async fn ping(&self) -> Result<(), SessionError> {
        if self.running.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SessionError::NotRunning)
        }
    }
}

fn render_args(config: &RelayConfig, binding: &SessionBinding, stream_url: &str) -> Vec<String> {
    let conference = binding.conference.as_deref().unwrap_or("");
    config
        .args
        .iter()
        .map(|arg| {
            arg.replace("{meeting_id}", &binding.meeting_id)
                .replace("{conference}", conference)
                .replace("{stream_url}", stream_url)
        })
        .collect()
}

/// Builds relay sessions from the configured command line.
pub struct RelayFactory {
    config: RelayConfig,
}

impl RelayFactory {
    pub fn new(config: RelayConfig) -> Self {
        Self { config }
    }
}

impl SessionFactory for RelayFactory {
    fn create(&self, binding: SessionBinding) -> Arc<dyn StreamSession> {
        Arc::new(RelaySession::new(binding, self.config.clone()))
    }
}
