//! Reasoning and response adapters
//!
//! The reasoner turns a raw tool result into an interpretive summary; the
//! responder writes the persona-constrained reply. Both wrap the opaque
//! inference call, with offline stand-ins that need no model.

use crate::llm::{LanguageModel, PromptMessage};
use crate::memory::{ConversationMessage, MessageRole};
use crate::Result;
use std::sync::Arc;
use tracing::debug;

const REASONER_PROMPT: &str = "Interpret DB or tool results for conversation.";

const PERSONA_PROMPT: &str = "You are a friendly banking assistant. \
Keep replies concise, clear, and natural, within 50-60 words. \
Answer only banking-related queries (balance, transfers, transactions, exchange rates, beneficiaries). \
If asked unrelated questions, politely decline and remind the user that your purpose is banking assistance. \
Never invent balances, amounts or names that are not in the provided summary.";

const OFFLINE_HELP: &str = "I'm your banking assistant. I can check your balance, send money, \
show your recent transactions, look up exchange rates, or add a new beneficiary.";

#[async_trait::async_trait]
pub trait Reasoner: Send + Sync {
    async fn interpret(&self, tool_result: &str) -> Result<String>;
}

/// Everything the responder may draw on for one reply
#[derive(Debug, Clone)]
pub struct ResponseRequest<'a> {
    /// Output of the reasoning stage
    pub reasoning: &'a str,
    /// True when `reasoning` describes a tool result rather than plain chat
    pub grounded: bool,
    /// Prior messages, oldest first
    pub history: Vec<&'a ConversationMessage>,
    pub message: &'a str,
}

#[async_trait::async_trait]
pub trait Responder: Send + Sync {
    async fn respond(&self, request: &ResponseRequest<'_>) -> Result<String>;
}

pub struct LlmReasoner {
    model: Arc<dyn LanguageModel>,
}

impl LlmReasoner {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }
}

#[async_trait::async_trait]
impl Reasoner for LlmReasoner {
    async fn interpret(&self, tool_result: &str) -> Result<String> {
        let summary = self
            .model
            .complete(REASONER_PROMPT, &[PromptMessage::user(tool_result)])
            .await?;
        Ok(summary.trim().to_string())
    }
}

pub struct LlmResponder {
    model: Arc<dyn LanguageModel>,
}

impl LlmResponder {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    fn build_messages(request: &ResponseRequest<'_>) -> Vec<PromptMessage> {
        let mut messages: Vec<PromptMessage> = request
            .history
            .iter()
            .map(|m| match m.role {
                MessageRole::User => PromptMessage::user(m.content.clone()),
                MessageRole::Assistant => PromptMessage::assistant(m.content.clone()),
            })
            .collect();

        messages.push(PromptMessage::assistant(request.reasoning));
        messages.push(PromptMessage::user(request.message));
        messages
    }
}

#[async_trait::async_trait]
impl Responder for LlmResponder {
    async fn respond(&self, request: &ResponseRequest<'_>) -> Result<String> {
        let messages = Self::build_messages(request);
        debug!(
            history = request.history.len(),
            grounded = request.grounded,
            "Requesting reply"
        );

        let reply = self.model.complete(PERSONA_PROMPT, &messages).await?;
        Ok(reply.trim().to_string())
    }
}

/// Offline reasoner: the tool text is already the summary
pub struct PassThroughReasoner;

#[async_trait::async_trait]
impl Reasoner for PassThroughReasoner {
    async fn interpret(&self, tool_result: &str) -> Result<String> {
        Ok(tool_result.to_string())
    }
}

/// Offline responder: relays grounded summaries, otherwise explains what it can do
pub struct TemplateResponder;

#[async_trait::async_trait]
impl Responder for TemplateResponder {
    async fn respond(&self, request: &ResponseRequest<'_>) -> Result<String> {
        if request.grounded {
            Ok(request.reasoning.to_string())
        } else {
            Ok(OFFLINE_HELP.to_string())
        }
    }
}
