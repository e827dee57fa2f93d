//! Context Window Management
//!
//! Chooses which prior messages of a session the responder sees.

use crate::memory::store::{ConversationMessage, Session};
use tracing::debug;

/// Configuration for context window management
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Number of prior messages to include
    pub window: usize,
    /// Token ceiling for the included messages
    pub max_context_tokens: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            window: 10,
            max_context_tokens: 2_000,
        }
    }
}

pub struct ContextManager {
    config: ContextConfig,
}

impl ContextManager {
    pub fn new() -> Self {
        Self {
            config: ContextConfig::default(),
        }
    }

    pub fn with_config(config: ContextConfig) -> Self {
        Self { config }
    }

    pub fn with_window(window: usize) -> Self {
        Self::with_config(ContextConfig {
            window,
            ..ContextConfig::default()
        })
    }

    /// Prior messages for the prompt, oldest first.
    ///
    /// The latest user message is excluded (the responder gets it separately);
    /// older messages are dropped first when the token ceiling is hit.
    pub fn prior_context<'a>(&self, session: &'a Session) -> Vec<&'a ConversationMessage> {
        let messages = session.messages();
        let prior = match messages.split_last() {
            Some((_, rest)) => rest,
            None => return Vec::new(),
        };

        let mut context: Vec<&ConversationMessage> = Vec::with_capacity(self.config.window);
        let mut tokens = 0;

        for msg in prior.iter().rev().take(self.config.window) {
            if tokens + msg.token_count > self.config.max_context_tokens {
                debug!(
                    included = context.len(),
                    tokens, "Context token ceiling reached"
                );
                break;
            }
            tokens += msg.token_count;
            context.push(msg);
        }

        context.reverse();
        context
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }
}

impl Default for ContextManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with(count: usize) -> Session {
        let mut session = Session::new("s", "Alice");
        for i in 0..count {
            if i % 2 == 0 {
                session.push_user(format!("Question {}", i));
            } else {
                session.push_assistant(format!("Answer {}", i));
            }
        }
        session
    }

    #[test]
    fn test_context_manager_creation() {
        let manager = ContextManager::new();
        assert_eq!(manager.config().window, 10);
    }

    #[test]
    fn test_window_excludes_latest_and_keeps_order() {
        let manager = ContextManager::with_window(3);
        let session = session_with(7);

        let context = manager.prior_context(&session);
        let contents: Vec<&str> = context.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["Answer 3", "Question 4", "Answer 5"]);
    }

    #[test]
    fn test_token_ceiling_drops_oldest() {
        let manager = ContextManager::with_config(ContextConfig {
            window: 10,
            max_context_tokens: 8,
        });
        let mut session = Session::new("s", "Alice");
        session.push_user("x".repeat(40));
        session.push_assistant("short");
        session.push_user("latest");

        let context = manager.prior_context(&session);
        assert_eq!(context.len(), 1);
        assert_eq!(context[0].content, "short");
    }

    #[test]
    fn test_empty_session() {
        let manager = ContextManager::new();
        assert!(manager.prior_context(&Session::new("s", "Alice")).is_empty());
    }
}
