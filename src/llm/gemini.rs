//! Gemini API client
//!
//! Uses a long-lived reqwest::Client for connection pooling.

use super::{LanguageModel, PromptMessage, PromptRole};
use crate::error::AssistantError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    url: String,
    temperature: f32,
}

impl GeminiClient {
    pub fn new(
        api_key: String,
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
            api_key,
            url: format!("{}/{}:generateContent", GEMINI_BASE_URL, model),
            temperature,
        })
    }

    fn build_request(&self, system: &str, messages: &[PromptMessage]) -> GeminiRequest {
        GeminiRequest {
            contents: messages
                .iter()
                .map(|m| Content {
                    role: Some(
                        match m.role {
                            PromptRole::User => "user",
                            PromptRole::Assistant => "model",
                        }
                        .to_string(),
                    ),
                    parts: vec![Part {
                        text: m.content.clone(),
                    }],
                })
                .collect(),
            generation_config: GenerationConfig {
                temperature: self.temperature,
                top_p: 0.9,
                top_k: 40,
                max_output_tokens: 512,
            },
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: system.to_string(),
                }],
            },
        }
    }
}

#[async_trait::async_trait]
impl LanguageModel for GeminiClient {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn complete(&self, system: &str, messages: &[PromptMessage]) -> crate::Result<String> {
        if self.api_key.is_empty() {
            return Err(AssistantError::LlmError(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let url = format!("{}?key={}", self.url, self.api_key);
        let request = self.build_request(system, messages);

        debug!("Calling Gemini API");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini API request failed: {}", e);
                if e.is_timeout() {
                    AssistantError::Timeout("Gemini API".to_string())
                } else {
                    AssistantError::LlmError(format!("Gemini API error: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Gemini API error response: {}", error_text);
            return Err(AssistantError::LlmError(format!(
                "Gemini API error: {}",
                error_text
            )));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            AssistantError::LlmError(format!("Gemini parse error: {}", e))
        })?;

        let answer = gemini_response
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AssistantError::LlmError("Empty response from Gemini".to_string()))?;

        Ok(answer)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    system_instruction: SystemInstruction,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}
