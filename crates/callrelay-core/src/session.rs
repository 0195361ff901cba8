//! Call session model: bounded conversation history keyed by call identifier.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::types::{Message, Role};

/// Default cap on the number of messages kept per call, system prompt included.
pub const DEFAULT_MAX_MESSAGES: usize = 12;

/// Conversation state for one phone call.
///
/// The first message is always the system instruction the session was created
/// with. Appends past `max_messages` drop the oldest non-system entries.
#[derive(Debug, Clone)]
pub struct CallSession {
    pub call_sid: String,
    pub created_at: DateTime<Utc>,
    messages: Vec<Message>,
    max_messages: usize,
    turns: u64,
    last_active: Instant,
}

impl CallSession {
    pub fn new(call_sid: impl Into<String>, system_prompt: &str, max_messages: usize) -> Self {
        Self {
            call_sid: call_sid.into(),
            created_at: Utc::now(),
            messages: vec![Message::system(system_prompt)],
            // Room for the system prompt plus at least one turn
            max_messages: max_messages.max(2),
            turns: 0,
            last_active: Instant::now(),
        }
    }

    /// Ordered history, system message first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of user utterances recorded over the session's life.
    pub fn turns(&self) -> u64 {
        self.turns
    }

    pub fn idle_for(&self) -> Duration {
        self.last_active.elapsed()
    }

    /// Wall-clock time since the session was created.
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.created_at
    }

    /// Append a message, truncating to the first entry plus the most recent
    /// `max_messages - 1` entries on overflow.
    pub fn append(&mut self, message: Message) {
        if message.role == Role::User {
            self.turns += 1;
        }
        self.messages.push(message);
        if self.messages.len() > self.max_messages {
            let excess = self.messages.len() - self.max_messages;
            self.messages.drain(1..1 + excess);
        }
        self.last_active = Instant::now();
    }

    pub fn touch(&mut self) {
        self.last_active = Instant::now();
    }
}

/// Shared handle to one call's session. Holding the lock serializes turns
/// for that call without blocking other calls.
pub type SessionHandle = Arc<Mutex<CallSession>>;

/// Storage for live call sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Return the session for `call_sid`, creating it with the system prompt
    /// if this is the first time the id is seen.
    async fn get_or_create(&self, call_sid: &str) -> SessionHandle;

    /// Look up an existing session without creating one.
    async fn get(&self, call_sid: &str) -> Option<SessionHandle>;

    /// Remove a session, returning its handle if it existed.
    async fn remove(&self, call_sid: &str) -> Option<SessionHandle>;

    /// Number of live sessions.
    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop sessions idle for longer than `max_idle`. Returns how many were removed.
    async fn evict_idle(&self, max_idle: Duration) -> usize;
}
