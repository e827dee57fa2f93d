//! Intent classifier adapters
//!
//! Labels a user message with one of the fixed [`Intent`]s:
//! - `LlmIntentClassifier`: asks the inference backend for a single keyword
//! - `KeywordIntentClassifier`: static keyword lists, no model required

use crate::llm::{LanguageModel, PromptMessage};
use crate::models::Intent;
use crate::Result;
use std::sync::Arc;
use tracing::debug;

#[async_trait::async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, message: &str) -> Result<Intent>;
}

const CLASSIFIER_PROMPT: &str = "Classify the intent of the user query as one of: \
balance, transfer, transactions, exchange_rate, add_beneficiary, or conversation. \
Reply with only the intent keyword. \
If the user confirms adding a new person (e.g. 'yes, add Charlie'), classify as add_beneficiary.";

/// Classifier backed by the opaque inference call
pub struct LlmIntentClassifier {
    model: Arc<dyn LanguageModel>,
}

impl LlmIntentClassifier {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }
}

#[async_trait::async_trait]
impl IntentClassifier for LlmIntentClassifier {
    async fn classify(&self, message: &str) -> Result<Intent> {
        let label = self
            .model
            .complete(CLASSIFIER_PROMPT, &[PromptMessage::user(message)])
            .await?;

        let intent = Intent::from_label(&label);
        debug!(label = %label.trim(), %intent, "Classifier label mapped");
        Ok(intent)
    }
}

/// Static keyword lists, zero allocation
const BENEFICIARY_KEYWORDS: &[&str] = &["beneficiary", "payee", "add "];

const TRANSFER_KEYWORDS: &[&str] = &["transfer", "send", "pay ", "wire", "move money"];

const TRANSACTION_KEYWORDS: &[&str] = &[
    "transaction", "history", "statement", "recent activity", "spent", "payments",
];

const BALANCE_KEYWORDS: &[&str] = &["balance", "how much money", "how much do i have", "funds"];

const RATE_KEYWORDS: &[&str] = &["exchange", "rate", "convert", "conversion", "forex"];

/// Deterministic keyword classifier
pub struct KeywordIntentClassifier;

impl KeywordIntentClassifier {
    pub fn classify_text(message: &str) -> Intent {
        let text = format!("{} ", message.to_lowercase());
        let has_any = |keywords: &[&str]| keywords.iter().any(|kw| text.contains(kw));

        // Confirmation turns ("yes, add Zoe") win over everything else
        if has_any(BENEFICIARY_KEYWORDS) {
            Intent::AddBeneficiary
        } else if has_any(TRANSFER_KEYWORDS) {
            Intent::Transfer
        } else if has_any(TRANSACTION_KEYWORDS) {
            Intent::Transactions
        } else if has_any(BALANCE_KEYWORDS) {
            Intent::Balance
        } else if has_any(RATE_KEYWORDS) {
            Intent::ExchangeRate
        } else {
            Intent::Conversation
        }
    }
}

#[async_trait::async_trait]
impl IntentClassifier for KeywordIntentClassifier {
    async fn classify(&self, message: &str) -> Result<Intent> {
        Ok(Self::classify_text(message))
    }
}
