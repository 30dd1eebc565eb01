//! # Session
//!
//! Per-user persisted conversational state: current graph node, pending
//! capability, authorization flag, and capability-scoped context history.
//! The `SessionManager` owns (de)serialization against the key-value store,
//! TTL refresh, and the per-user locks serializing read-modify-write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::application::graph::ConversationState;
use crate::domain::traits::SessionStore;
use crate::domain::types::{CapabilityId, ChatTurn, Failure};

/// One user's session record, stored under `session:<user_id>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub state: ConversationState,
    #[serde(default)]
    pub pending_command: Option<CapabilityId>,
    #[serde(default)]
    pub authorized: bool,
    /// Bounded history per memory-carrying capability.
    #[serde(default)]
    pub context: HashMap<CapabilityId, Vec<ChatTurn>>,
    /// Last menu message shown to the user; button-triggered transitions
    /// edit it in place instead of stacking new messages.
    #[serde(default)]
    pub menu_message_id: Option<String>,
    /// Bumped on every committed transition; an in-flight invocation only
    /// writes back if the epoch it observed is still current.
    #[serde(default)]
    pub epoch: u64,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            state: ConversationState::default(),
            pending_command: None,
            authorized: false,
            context: HashMap::new(),
            menu_message_id: None,
            epoch: 0,
            updated_at: Utc::now(),
        }
    }
}

impl Session {
    /// Reset to the initial state, keeping authorization and context.
    pub fn reset(&mut self) {
        self.state = ConversationState::Idle;
        self.pending_command = None;
        self.epoch += 1;
    }

    /// Move to a new graph node and/or pending capability.
    pub fn transition(&mut self, state: ConversationState, pending: Option<CapabilityId>) {
        self.state = state;
        self.pending_command = pending;
        self.epoch += 1;
    }

    pub fn history(&self, capability: CapabilityId) -> &[ChatTurn] {
        self.context
            .get(&capability)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Append one exchange to a capability's history, dropping the oldest
    /// turns once over `max_turns`.
    pub fn push_turns(
        &mut self,
        capability: CapabilityId,
        turns: impl IntoIterator<Item = ChatTurn>,
        max_turns: usize,
    ) {
        let history = self.context.entry(capability).or_default();
        history.extend(turns);
        if history.len() > max_turns {
            let excess = history.len() - max_turns;
            history.drain(..excess);
        }
    }
}

/// Typed access to sessions in the external store, plus the per-user locks
/// that serialize each user's read-modify-write sections.
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    ttl: Duration,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn key(user_id: &str) -> String {
        format!("session:{user_id}")
    }

    /// Take the user's lock. Held for the duration of one read-modify-write
    /// section, never across a provider call.
    pub async fn lock_user(&self, user_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Load a user's session, creating a default one if absent.
    pub async fn load(&self, user_id: &str) -> Result<Session, Failure> {
        match self.store.get(&Self::key(user_id)).await? {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(session) => Ok(session),
                Err(e) => {
                    // An undecodable record would lock the user out forever;
                    // start them over instead.
                    tracing::warn!("Discarding undecodable session for {user_id}: {e}");
                    Ok(Session::default())
                }
            },
            None => Ok(Session::default()),
        }
    }

    /// Persist a session, refreshing its TTL.
    pub async fn save(&self, user_id: &str, session: &mut Session) -> Result<(), Failure> {
        session.updated_at = Utc::now();
        let raw = serde_json::to_string(session)
            .map_err(|e| Failure::StoreUnavailable(e.to_string()))?;
        self.store
            .set(&Self::key(user_id), &raw, Some(self.ttl))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::traits::SessionStore as _;
    use crate::infrastructure::store::memory::MemoryStore;

    fn manager() -> SessionManager {
        SessionManager::new(Arc::new(MemoryStore::new()), Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_load_absent_yields_default() {
        let sessions = manager();
        let session = sessions.load("42").await.unwrap();
        assert_eq!(session.state, ConversationState::Idle);
        assert!(!session.authorized);
        assert!(session.pending_command.is_none());
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let sessions = manager();
        let mut session = Session::default();
        session.transition(ConversationState::AwaitingInput, Some(CapabilityId::Chat));
        session.authorized = true;
        session.push_turns(
            CapabilityId::Chat,
            [ChatTurn::user("hello"), ChatTurn::assistant("hi")],
            20,
        );
        sessions.save("42", &mut session).await.unwrap();

        let loaded = sessions.load("42").await.unwrap();
        assert_eq!(loaded.state, ConversationState::AwaitingInput);
        assert_eq!(loaded.pending_command, Some(CapabilityId::Chat));
        assert!(loaded.authorized);
        assert_eq!(loaded.history(CapabilityId::Chat).len(), 2);
        assert_eq!(loaded.epoch, session.epoch);
    }

    #[test]
    fn test_history_is_bounded_oldest_dropped() {
        let mut session = Session::default();
        for i in 0..8 {
            session.push_turns(
                CapabilityId::Chat,
                [
                    ChatTurn::user(&format!("q{i}")),
                    ChatTurn::assistant(&format!("a{i}")),
                ],
                6,
            );
        }
        let history = session.history(CapabilityId::Chat);
        assert_eq!(history.len(), 6);
        // The three most recent exchanges survive, in order.
        assert_eq!(history[0].content, "q5");
        assert_eq!(history[5].content, "a7");
    }

    #[test]
    fn test_reset_keeps_context_and_auth() {
        let mut session = Session::default();
        session.authorized = true;
        session.transition(ConversationState::AwaitingInput, Some(CapabilityId::Image));
        session.push_turns(CapabilityId::Chat, [ChatTurn::user("hi")], 20);
        let epoch_before = session.epoch;

        session.reset();
        assert_eq!(session.state, ConversationState::Idle);
        assert!(session.pending_command.is_none());
        assert!(session.authorized);
        assert_eq!(session.history(CapabilityId::Chat).len(), 1);
        assert_eq!(session.epoch, epoch_before + 1);
    }

    #[tokio::test]
    async fn test_corrupt_record_treated_as_absent() {
        let store = Arc::new(MemoryStore::new());
        store
            .set("session:42", "not json", None)
            .await
            .unwrap();
        let sessions = SessionManager::new(store, Duration::from_secs(60));
        let session = sessions.load("42").await.unwrap();
        assert_eq!(session.state, ConversationState::Idle);
    }
}
