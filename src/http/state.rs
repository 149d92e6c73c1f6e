use crate::session::SessionStats;
use tokio::sync::watch;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Latest statistics published by the session loop
    pub stats: watch::Receiver<SessionStats>,
}

impl AppState {
    pub fn new(stats: watch::Receiver<SessionStats>) -> Self {
        Self { stats }
    }
}
