//! Shared server state injected into every handler.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tracing::info;
use uuid::Uuid;
use verbatim_core::{BackendManager, SessionConfig, TranscriptionPipeline};

/// Live connection registry.
///
/// Sessions insert themselves on upgrade and remove themselves on teardown;
/// the map carries bookkeeping only, never session internals.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<Uuid, Instant>,
}

impl SessionRegistry {
    pub fn insert(&self, id: Uuid) {
        self.sessions.insert(id, Instant::now());
        info!(session = %id, total = self.sessions.len(), "client connected");
    }

    pub fn remove(&self, id: &Uuid) {
        self.sessions.remove(id);
        info!(session = %id, total = self.sessions.len(), "client disconnected");
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }
}

/// Application state shared by the admin routes and the WebSocket endpoint.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<BackendManager>,
    pub pipeline: TranscriptionPipeline,
    pub session_config: SessionConfig,
    pub registry: Arc<SessionRegistry>,
}
