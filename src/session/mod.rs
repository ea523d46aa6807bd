//! Conversation sessions and their ordered message history
//!
//! A session is keyed by (project id, topic id) and created lazily on the
//! first message. Messages carry an optional hidden context that only the
//! model ever sees; every caller-facing view goes through [`PublicMessage`].

mod locks;
mod store;

pub use locks::{SessionKey, SessionLocks};
pub use store::{SessionStore, SqliteSessionStore};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::MontageError;

/// One ongoing conversation for a (project, topic) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub project_id: String,
    pub topic_id: String,
    pub selected_model: Option<String>,
    /// Microseconds since the Unix epoch
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Error,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageRole {
    type Err = MontageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            "error" => Ok(Self::Error),
            other => Err(MontageError::persistence(format!(
                "unknown message role '{}'",
                other
            ))),
        }
    }
}

/// A stored message, including model-only hidden context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub session_id: String,
    pub role: MessageRole,
    pub content: String,
    pub hidden_context: Option<String>,
    pub model: Option<String>,
    /// Microseconds since the Unix epoch; strictly increasing within a session
    pub created_at: i64,
}

impl Message {
    /// Caller-facing copy with hidden context removed
    pub fn to_public(&self) -> PublicMessage {
        PublicMessage {
            id: self.id.clone(),
            role: self.role,
            content: self.content.clone(),
            model: self.model.clone(),
            created_at: self.created_at,
        }
    }
}

/// Message as exposed to callers (no hidden context field at all)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub created_at: i64,
}

/// Message about to be appended; id and timestamp are assigned by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub role: MessageRole,
    pub content: String,
    pub hidden_context: Option<String>,
    pub model: Option<String>,
}

impl NewMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            hidden_context: None,
            model: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Error, content)
    }

    pub fn with_hidden_context(mut self, hidden: impl Into<String>) -> Self {
        self.hidden_context = Some(hidden.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}
