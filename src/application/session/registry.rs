//! Active session registry
//!
//! Single source of truth for "is this session still live". Components hold
//! session ids and re-resolve through the registry at each use; a session
//! removes itself exactly once, during its own terminal transition.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::shared::error::DomainError;
use crate::domain::shared::value_objects::SessionId;

pub struct SessionRegistry<S> {
    sessions: RwLock<HashMap<SessionId, Arc<S>>>,
}

impl<S> SessionRegistry<S> {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a session; at most one active session per id
    pub async fn add(&self, id: SessionId, session: Arc<S>) -> Result<(), DomainError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&id) {
            return Err(DomainError::AlreadyExists(format!("session {}", id)));
        }
        sessions.insert(id, session);
        Ok(())
    }

    /// Resolve a live session
    pub async fn get(&self, id: &SessionId) -> Option<Arc<S>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Remove a session; idempotent, returns whether an entry was removed
    pub async fn remove(&self, id: &SessionId) -> bool {
        let removed = self.sessions.write().await.remove(id).is_some();
        if removed {
            debug!("Session {} removed from registry", id);
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Snapshot of the live sessions
    pub async fn all(&self) -> Vec<Arc<S>> {
        self.sessions.read().await.values().cloned().collect()
    }
}

impl<S> Default for SessionRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}
