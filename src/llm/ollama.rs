//! Ollama chat client (`POST /api/chat`, non-streaming)

use super::{LanguageModel, PromptMessage, PromptRole};
use crate::error::AssistantError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

pub struct OllamaClient {
    client: Client,
    chat_url: String,
    model: String,
    temperature: f32,
}

impl OllamaClient {
    pub fn new(
        base_url: &str,
        model: &str,
        temperature: f32,
        timeout: Duration,
    ) -> crate::Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            chat_url: format!("{}/api/chat", base_url.trim_end_matches('/')),
            model: model.to_string(),
            temperature,
        })
    }

    fn build_request<'a>(&'a self, system: &'a str, messages: &'a [PromptMessage]) -> ChatRequest<'a> {
        let mut chat = Vec::with_capacity(messages.len() + 1);
        chat.push(ChatMessage {
            role: "system",
            content: system,
        });
        chat.extend(messages.iter().map(|m| ChatMessage {
            role: match m.role {
                PromptRole::User => "user",
                PromptRole::Assistant => "assistant",
            },
            content: &m.content,
        }));

        ChatRequest {
            model: &self.model,
            messages: chat,
            stream: false,
            options: ChatOptions {
                temperature: self.temperature,
            },
        }
    }
}

#[async_trait::async_trait]
impl LanguageModel for OllamaClient {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn complete(&self, system: &str, messages: &[PromptMessage]) -> crate::Result<String> {
        let request = self.build_request(system, messages);

        debug!(model = %self.model, "Calling Ollama chat API");

        let response = self
            .client
            .post(&self.chat_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Ollama request failed: {}", e);
                if e.is_timeout() {
                    AssistantError::Timeout("Ollama chat API".to_string())
                } else {
                    AssistantError::LlmError(format!("Ollama error: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AssistantError::LlmError(format!(
                "Ollama returned {}: {}",
                status, body
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AssistantError::LlmError(format!("Ollama parse error: {}", e)))?;

        let content = parsed.message.content.trim().to_string();
        if content.is_empty() {
            return Err(AssistantError::LlmError("Empty response from Ollama".to_string()));
        }

        Ok(content)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}
