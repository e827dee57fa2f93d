//! Opaque text-in/text-out inference backends
//!
//! Everything that talks to a model goes through [`LanguageModel`]; the
//! classifier, reasoner and responder only ever see this trait.

pub mod gemini;
pub mod ollama;

pub use gemini::GeminiClient;
pub use ollama::OllamaClient;

use crate::config::{LlmBackend, LlmConfig};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub content: String,
}

impl PromptMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::Assistant,
            content: content.into(),
        }
    }
}

/// A single blocking request/response inference call
#[async_trait::async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &'static str;

    async fn complete(&self, system: &str, messages: &[PromptMessage]) -> Result<String>;
}

/// Build the configured backend. `Offline` has no model.
pub fn build_model(config: &LlmConfig) -> Result<Option<Arc<dyn LanguageModel>>> {
    let model: Option<Arc<dyn LanguageModel>> = match config.backend {
        LlmBackend::Gemini => Some(Arc::new(GeminiClient::new(
            config.gemini_api_key.clone(),
            &config.gemini_model,
            config.temperature,
            config.timeout,
        )?)),
        LlmBackend::Ollama => Some(Arc::new(OllamaClient::new(
            &config.ollama_base_url,
            &config.model_name,
            config.temperature,
            config.timeout,
        )?)),
        LlmBackend::Offline => None,
    };

    Ok(model)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted model used across the crate's tests

    use super::*;
    use crate::error::AssistantError;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    pub enum Scripted {
        Reply(String),
        Fail,
        Hang,
    }

    /// Pops one scripted step per call; echoes the last user message when empty.
    pub struct ScriptedModel {
        steps: Mutex<VecDeque<Scripted>>,
        pub calls: Mutex<Vec<(String, Vec<PromptMessage>)>>,
    }

    impl ScriptedModel {
        pub fn new(steps: Vec<Scripted>) -> Self {
            Self {
                steps: Mutex::new(steps.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn replies(replies: &[&str]) -> Self {
            Self::new(
                replies
                    .iter()
                    .map(|r| Scripted::Reply(r.to_string()))
                    .collect(),
            )
        }
    }

    #[async_trait::async_trait]
    impl LanguageModel for ScriptedModel {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn complete(&self, system: &str, messages: &[PromptMessage]) -> Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push((system.to_string(), messages.to_vec()));

            let step = self.steps.lock().unwrap().pop_front();
            match step {
                Some(Scripted::Reply(text)) => Ok(text),
                Some(Scripted::Fail) => Err(AssistantError::LlmError("scripted failure".into())),
                Some(Scripted::Hang) => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(String::new())
                }
                None => Ok(messages
                    .last()
                    .map(|m| m.content.clone())
                    .unwrap_or_default()),
            }
        }
    }
}
