//! Session state
//!
//! One `Session` per conversation: ordered message history plus the outputs
//! of the last turn and any confirmation the next turn may act on.

use crate::models::{Intent, PendingConfirmation, ToolOutput};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// A single message in the conversation history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub message_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub role: MessageRole,
    pub content: String,
    /// Approximate token count for context window management
    pub token_count: usize,
}

impl ConversationMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        let content = content.into();
        let token_count = (content.len() + 3) / 4;

        Self {
            message_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            role,
            content,
            token_count,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    /// Authenticated principal that opened the session
    pub principal: String,
    messages: Vec<ConversationMessage>,
    #[serde(default)]
    pub last_intent: Option<Intent>,
    #[serde(default)]
    pub last_tool_result: Option<ToolOutput>,
    #[serde(default)]
    pub last_reasoning: Option<String>,
    #[serde(default)]
    pub pending_confirmation: Option<PendingConfirmation>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(session_id: impl Into<String>, principal: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            principal: principal.into(),
            messages: Vec::new(),
            last_intent: None,
            last_tool_result: None,
            last_reasoning: None,
            pending_confirmation: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.push(ConversationMessage::new(MessageRole::User, content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.push(ConversationMessage::new(MessageRole::Assistant, content));
    }

    fn push(&mut self, message: ConversationMessage) {
        self.messages.push(message);
        self.updated_at = Utc::now();
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Latest user utterance, if any
    pub fn last_user_message(&self) -> Option<&ConversationMessage> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
    }

    pub fn last_assistant_message(&self) -> Option<&ConversationMessage> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::Assistant)
    }

    /// Pending confirmation is only valid for the turn right after it was set.
    pub fn take_pending(&mut self) -> Option<PendingConfirmation> {
        self.pending_confirmation.take()
    }
}
