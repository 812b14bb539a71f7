//! In-memory session storage.

use std::collections::HashMap;
use synapse_core::message::{Conversation, SessionId};
use tokio::sync::RwLock;
use tracing::debug;

pub const DEFAULT_MAX_SESSIONS: usize = 1_000;

/// Conversations keyed by session id.
///
/// Callers take a snapshot with [`checkout`](Self::checkout), run the agent
/// without holding the lock, then [`save`](Self::save) the result. Two
/// concurrent runs on one session id race and the last save wins.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Conversation>>,
    max_sessions: usize,
}

impl SessionStore {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions: max_sessions.max(1),
        }
    }

    /// A copy of the session's conversation, or a fresh one.
    pub async fn checkout(&self, id: &SessionId) -> Conversation {
        self.sessions
            .read()
            .await
            .get(id.as_str())
            .cloned()
            .unwrap_or_else(|| Conversation::new(id.clone()))
    }

    /// Store a conversation, evicting the oldest session when full.
    pub async fn save(&self, conversation: Conversation) {
        let mut sessions = self.sessions.write().await;
        let key = conversation.id.as_str().to_string();

        if sessions.len() >= self.max_sessions
            && !sessions.contains_key(&key)
            && let Some(oldest) = sessions
                .iter()
                .min_by_key(|(_, c)| c.created_at)
                .map(|(k, _)| k.clone())
        {
            debug!(session_id = %oldest, "Evicting oldest session");
            sessions.remove(&oldest);
        }

        sessions.insert(key, conversation);
    }

    pub async fn get(&self, id: &str) -> Option<Conversation> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SESSIONS)
    }
}
