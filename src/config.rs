//! Environment configuration
//!
//! Every value has a development default so a bare checkout runs against the
//! in-memory ledger with keyword classification.

use crate::error::AssistantError;
use crate::tools::extract::normalize_name;
use crate::Result;
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const DEV_JWT_SECRET: &str = "dev-secret-change-me";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Gemini,
    Ollama,
    /// Keyword classifier + pass-through reasoning, no model calls
    Offline,
}

impl FromStr for LlmBackend {
    type Err = AssistantError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "gemini" => Ok(LlmBackend::Gemini),
            "ollama" => Ok(LlmBackend::Ollama),
            "offline" | "none" | "keyword" => Ok(LlmBackend::Offline),
            other => Err(AssistantError::ConfigError(format!(
                "Unknown LLM_BACKEND '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub ollama_base_url: String,
    pub model_name: String,
    pub temperature: f32,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct RateConfig {
    pub primary_url: String,
    pub fallback_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub cors_origins: Vec<String>,
    pub history_window: usize,
    pub seed_accounts: Vec<(String, Decimal)>,
    pub llm: LlmConfig,
    pub rates: RateConfig,
}

impl AppConfig {
    /// Read configuration from the process environment (call `dotenv` first).
    pub fn from_env() -> Result<Self> {
        let port = env::var("PORT")
            .or_else(|_| env::var("API_PORT"))
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .map_err(|e| AssistantError::ConfigError(format!("Invalid PORT: {}", e)))?;

        let database_url = env::var("DATABASE_URL")
            .or_else(|_| env::var("POSTGRES_URL"))
            .ok()
            .filter(|v| !v.trim().is_empty());

        let jwt_secret = match env::var("JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ => {
                warn!("JWT_SECRET not set, using the development secret");
                DEV_JWT_SECRET.to_string()
            }
        };

        let cors_origins = env::var("CORS_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let history_window = parse_or("HISTORY_WINDOW", 10usize)?;

        let seed_accounts = match env::var("SEED_ACCOUNTS") {
            Ok(raw) => parse_seed_accounts(&raw)?,
            Err(_) => Vec::new(),
        };

        let backend = match env::var("LLM_BACKEND") {
            Ok(v) => v.parse()?,
            Err(_) if env::var("GEMINI_API_KEY").is_ok() => LlmBackend::Gemini,
            Err(_) => LlmBackend::Offline,
        };

        let llm = LlmConfig {
            backend,
            gemini_api_key: env::var("GEMINI_API_KEY").unwrap_or_default(),
            gemini_model: env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| "gemini-2.0-flash".to_string()),
            ollama_base_url: env::var("OLLAMA_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            model_name: env::var("MODEL_NAME")
                .unwrap_or_else(|_| "qwen2.5:3b-instruct".to_string()),
            temperature: parse_or("TEMPERATURE", 0.0f32)?,
            timeout: Duration::from_secs(parse_or("LLM_TIMEOUT_SECS", 30u64)?),
        };

        let rates = RateConfig {
            primary_url: env::var("RATE_API_URL")
                .unwrap_or_else(|_| "https://api.exchangerate.host".to_string()),
            fallback_url: env::var("RATE_FALLBACK_URL")
                .unwrap_or_else(|_| "https://api.duckduckgo.com".to_string()),
            timeout: Duration::from_secs(parse_or("RATE_TIMEOUT_SECS", 5u64)?),
        };

        Ok(Self {
            port,
            database_url,
            jwt_secret,
            cors_origins,
            history_window,
            seed_accounts,
            llm,
            rates,
        })
    }
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| AssistantError::ConfigError(format!("Invalid {}: {}", key, e))),
        Err(_) => Ok(default),
    }
}

/// Parse `Alice:120,Bob:50.25` into (name, opening balance) pairs.
pub fn parse_seed_accounts(raw: &str) -> Result<Vec<(String, Decimal)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (name, balance) = entry.split_once(':').ok_or_else(|| {
                AssistantError::ConfigError(format!("Seed entry '{}' must be name:balance", entry))
            })?;
            let balance = Decimal::from_str(balance.trim()).map_err(|e| {
                AssistantError::ConfigError(format!("Seed balance for '{}': {}", name, e))
            })?;
            if balance.is_sign_negative() {
                return Err(AssistantError::ConfigError(format!(
                    "Seed balance for '{}' must not be negative",
                    name
                )));
            }
            Ok((normalize_name(name.trim()), balance))
        })
        .collect()
}
