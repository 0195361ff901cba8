//! In-memory session store: one mutex-guarded session per call id.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::session::{CallSession, SessionHandle, SessionStore};

/// Process-local session store.
///
/// The map lock is only held to look up, insert, or remove a handle. Each
/// session carries its own lock, so turns for different calls never contend.
pub struct InMemorySessionStore {
    system_prompt: String,
    max_messages: usize,
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl InMemorySessionStore {
    pub fn new(system_prompt: impl Into<String>, max_messages: usize) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            max_messages,
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

/// Mark a handle as in use so a sweep between lookup and lock keeps it.
/// A handle that is already locked has a turn in flight and is skipped by
/// eviction anyway.
fn claim(handle: &SessionHandle) -> SessionHandle {
    if let Ok(mut session) = handle.try_lock() {
        session.touch();
    }
    handle.clone()
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get_or_create(&self, call_sid: &str) -> SessionHandle {
        if let Some(handle) = self.sessions.read().await.get(call_sid) {
            return claim(handle);
        }

        let mut map = self.sessions.write().await;
        // Another request may have inserted between the read and write lock
        let handle = map.entry(call_sid.to_string()).or_insert_with(|| {
            debug!(call_sid, "Created call session");
            Arc::new(Mutex::new(CallSession::new(
                call_sid,
                &self.system_prompt,
                self.max_messages,
            )))
        });
        claim(handle)
    }

    async fn get(&self, call_sid: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(call_sid).cloned()
    }

    async fn remove(&self, call_sid: &str) -> Option<SessionHandle> {
        let removed = self.sessions.write().await.remove(call_sid);
        if removed.is_some() {
            debug!(call_sid, "Removed call session");
        }
        removed
    }

    async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    async fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut map = self.sessions.write().await;
        let before = map.len();
        map.retain(|call_sid, handle| match handle.try_lock() {
            Ok(session) => {
                let keep = session.idle_for() <= max_idle;
                if !keep {
                    debug!(
                        call_sid = %call_sid,
                        turns = session.turns(),
                        age_secs = session.age().num_seconds(),
                        "Evicting idle call session"
                    );
                }
                keep
            }
            // Locked means a turn is in flight
            Err(_) => true,
        });
        before - map.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Message, Role};

    fn store() -> InMemorySessionStore {
        InMemorySessionStore::new("You are a receptionist.", 12)
    }

    #[tokio::test]
    async fn test_get_or_create_is_lazy_and_stable() {
        let store = store();
        assert_eq!(store.len().await, 0);
        assert!(store.get("CA1").await.is_none());

        let first = store.get_or_create("CA1").await;
        let second = store.get_or_create("CA1").await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.len().await, 1);

        let session = first.lock().await;
        assert_eq!(session.messages()[0].role, Role::System);
        assert_eq!(session.messages()[0].content, "You are a receptionist.");
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let store = store();
        assert!(store.remove("unknown").await.is_none());
        assert_eq!(store.len().await, 0);

        let handle = store.get_or_create("CA1").await;
        let removed = store.remove("CA1").await.unwrap();
        assert!(Arc::ptr_eq(&handle, &removed));
        assert!(store.remove("CA1").await.is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_recreated_session_starts_fresh() {
        let store = store();
        {
            let handle = store.get_or_create("CA1").await;
            handle.lock().await.append(Message::user("hello"));
        }
        store.remove("CA1").await;

        let handle = store.get_or_create("CA1").await;
        assert_eq!(handle.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let store = store();
        store.get_or_create("CA1").await.lock().await.append(Message::user("a"));
        store.get_or_create("CA2").await;

        assert_eq!(store.get("CA1").await.unwrap().lock().await.len(), 2);
        assert_eq!(store.get("CA2").await.unwrap().lock().await.len(), 1);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_idle() {
        let store = store();
        store.get_or_create("old").await;
        tokio::time::advance(Duration::from_secs(120)).await;
        store.get_or_create("fresh").await;

        let evicted = store.evict_idle(Duration::from_secs(60)).await;
        assert_eq!(evicted, 1);
        assert!(store.get("old").await.is_none());
        assert!(store.get("fresh").await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_skips_sessions_mid_turn() {
        let store = store();
        let handle = store.get_or_create("busy").await;
        tokio::time::advance(Duration::from_secs(120)).await;

        let _guard = handle.lock().await;
        assert_eq!(store.evict_idle(Duration::from_secs(60)).await, 0);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_refreshes_idle_clock() {
        let store = store();
        store.get_or_create("CA1").await.lock().await.append(Message::user("hi"));
        tokio::time::advance(Duration::from_secs(120)).await;

        // Sweep lands after the turn looked up its handle but before it locked
        let handle = store.get_or_create("CA1").await;
        assert_eq!(store.evict_idle(Duration::from_secs(60)).await, 0);

        handle.lock().await.append(Message::assistant("hello"));
        let next = store.get_or_create("CA1").await;
        assert!(Arc::ptr_eq(&handle, &next));
        assert_eq!(next.lock().await.len(), 3);
    }
}
