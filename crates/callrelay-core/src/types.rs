use serde::{Deserialize, Serialize};

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single entry of a call's conversation history.
///
/// Serializes to the chat-completions message shape
/// `{"role": "user", "content": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Inbound speech event as delivered by the telephony provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpeechEvent {
    pub call_sid: Option<String>,
    pub transcript: Option<String>,
    pub caller: Option<String>,
}

impl SpeechEvent {
    /// The transcript with surrounding whitespace removed, or `None` when
    /// nothing usable was recognized.
    pub fn utterance(&self) -> Option<&str> {
        self.transcript
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}
