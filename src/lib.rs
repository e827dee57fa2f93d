//! Banking Assistant
//!
//! A per-session conversational-turn processor over a transactional ledger:
//! - Classifies each message into a fixed intent
//! - Routes it to exactly one handler (ledger, rates, beneficiary, chat)
//! - Runs ledger operations all-or-nothing
//! - Carries a pending beneficiary confirmation across turns
//!
//! TURN GRAPH:
//! NLU → {DB, INFO, BENEFICIARY, CONVERSATION} → REASONING → CONVERSATION(final) → END

pub mod agent;
pub mod api;
pub mod auth;
pub mod bootstrap;
pub mod classifier;
pub mod config;
pub mod conversational;
pub mod error;
pub mod ledger;
pub mod llm;
pub mod memory;
pub mod models;
pub mod router;
pub mod tools;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use classifier::{IntentClassifier, KeywordIntentClassifier};
