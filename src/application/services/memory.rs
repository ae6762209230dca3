use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::domain::{Conversation, Turn};

pub const DEFAULT_SESSION: &str = "default";

const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub type SessionHandle = Arc<Mutex<Conversation>>;

/// Per-session conversation logs, kept in process memory.
///
/// Each session sits behind its own mutex. Callers that read history and then
/// append a turn must hold that mutex across both steps (see
/// [`ConversationMemory::session`]); `load` and `save` lock independently and
/// are meant for one-off access.
///
/// An entry leaves the map only when the map itself holds the last handle to
/// it, so every request on one session id locks the same mutex.
#[derive(Default)]
pub struct ConversationMemory {
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to the session's log, created empty on first use. Pass it back
    /// to [`ConversationMemory::release`] if the caller ends up adding nothing.
    pub async fn session(&self, session_id: &str) -> SessionHandle {
        if let Some(handle) = self.sessions.read().await.get(session_id) {
            return handle.clone();
        }

        self.sessions
            .write()
            .await
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Conversation::new(session_id))))
            .clone()
    }

    /// Gives back a handle from [`ConversationMemory::session`]. The entry is
    /// dropped when it has no turns and nobody else holds it.
    pub async fn release(&self, session_id: &str, handle: SessionHandle) {
        let mut sessions = self.sessions.write().await;
        let unused = sessions.get(session_id).is_some_and(|current| {
            Arc::ptr_eq(current, &handle)
                && Arc::strong_count(&handle) == 2
                && handle.try_lock().map(|c| c.is_empty()).unwrap_or(false)
        });
        if unused {
            sessions.remove(session_id);
        }
    }

    /// All turns of the session, oldest first. Unknown sessions are empty.
    pub async fn load(&self, session_id: &str) -> Vec<Turn> {
        let handle = self.sessions.read().await.get(session_id).cloned();
        match handle {
            Some(handle) => handle.lock().await.turns().to_vec(),
            None => Vec::new(),
        }
    }

    pub async fn save(&self, session_id: &str, question: &str, answer: &str) {
        let handle = self.session(session_id).await;
        handle.lock().await.push(Turn::new(question, answer));
    }

    pub async fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Drops every turn of the session. A request in flight on the session
    /// finishes first. Returns whether there were turns to drop.
    pub async fn clear(&self, session_id: &str) -> bool {
        let Some(handle) = self.sessions.read().await.get(session_id).cloned() else {
            return false;
        };

        let had_turns = {
            let mut conversation = handle.lock().await;
            let had_turns = !conversation.is_empty();
            conversation.clear();
            had_turns
        };
        self.release(session_id, handle).await;
        had_turns
    }

    /// Removes sessions not updated within `max_idle` that nobody holds.
    /// Returns how many were removed.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let Some(cutoff) = TimeDelta::from_std(max_idle)
            .ok()
            .and_then(|idle| Utc::now().checked_sub_signed(idle))
        else {
            return 0;
        };

        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, handle| {
            Arc::strong_count(handle) > 1
                || match handle.try_lock() {
                    Ok(conversation) => conversation.updated_at > cutoff,
                    Err(_) => true,
                }
        });
        before - sessions.len()
    }

    /// Runs [`ConversationMemory::evict_idle`] periodically until the task is aborted.
    pub fn spawn_idle_sweeper(self: &Arc<Self>, max_idle: Duration) -> JoinHandle<()> {
        let memory = Arc::clone(self);
        let period = max_idle.clamp(Duration::from_secs(1), MAX_SWEEP_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let evicted = memory.evict_idle(max_idle).await;
                if evicted > 0 {
                    tracing::info!(evicted, "dropped idle sessions");
                }
            }
        })
    }
}
