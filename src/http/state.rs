use tokio::sync::mpsc;

use crate::stream::ManagerCommand;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Command channel into the stream manager
    pub commands: mpsc::Sender<ManagerCommand>,
}

impl AppState {
    pub fn new(commands: mpsc::Sender<ManagerCommand>) -> Self {
        Self { commands }
    }
}
