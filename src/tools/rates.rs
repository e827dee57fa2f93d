//! Currency-rate sources
//!
//! HTTP-backed lookups with a bounded timeout. The primary source returns a
//! currency → rate mapping; the secondary is an instant-answer search used
//! when the primary yields nothing usable.

use crate::config::RateConfig;
use crate::error::AssistantError;
use crate::Result;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[async_trait::async_trait]
pub trait ExchangeRateSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Human-readable quote such as `1 USD = 0.9210 EUR`
    async fn lookup(&self, base: &str, target: &str) -> Result<String>;
}

fn http_client(timeout: Duration) -> Result<Client> {
    Ok(Client::builder()
        .pool_idle_timeout(Duration::from_secs(60))
        .pool_max_idle_per_host(4)
        .timeout(timeout)
        .build()?)
}

fn request_error(source: &str, e: reqwest::Error) -> AssistantError {
    if e.is_timeout() {
        AssistantError::Timeout(source.to_string())
    } else {
        AssistantError::RateSourceError(format!("{} request failed: {}", source, e))
    }
}

/// exchangerate.host style `/latest?base=USD&symbols=EUR`
pub struct ExchangeRateHostSource {
    client: Client,
    base_url: String,
}

impl ExchangeRateHostSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

/// Accepts both `{"rates": {"EUR": 0.92}}` and `{"quotes": {"USDEUR": 0.92}}`.
pub fn parse_rate_mapping(body: &Value, base: &str, target: &str) -> Option<f64> {
    body.get("rates")
        .and_then(|rates| rates.get(target))
        .or_else(|| {
            body.get("quotes")
                .and_then(|quotes| quotes.get(format!("{}{}", base, target)))
        })
        .and_then(Value::as_f64)
        .filter(|rate| rate.is_finite() && *rate > 0.0)
}

#[async_trait::async_trait]
impl ExchangeRateSource for ExchangeRateHostSource {
    fn name(&self) -> &'static str {
        "exchangerate.host"
    }

    async fn lookup(&self, base: &str, target: &str) -> Result<String> {
        let body: Value = self
            .client
            .get(format!("{}/latest", self.base_url))
            .query(&[("base", base), ("symbols", target)])
            .send()
            .await
            .map_err(|e| request_error(self.name(), e))?
            .json()
            .await
            .map_err(|e| {
                AssistantError::RateSourceError(format!("Malformed rate response: {}", e))
            })?;

        debug!(source = self.name(), response = %body, "Rate response");

        let rate = parse_rate_mapping(&body, base, target).ok_or_else(|| {
            AssistantError::RateSourceError(format!("No rate for {}->{} in response", base, target))
        })?;

        Ok(format!("1 {} = {:.4} {}", base, rate, target))
    }
}

/// Instant-answer search (DuckDuckGo API)
pub struct InstantAnswerSource {
    client: Client,
    base_url: String,
}

impl InstantAnswerSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

pub fn parse_instant_answer(body: &Value) -> Option<String> {
    ["Answer", "AbstractText"]
        .iter()
        .filter_map(|key| body.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|text| !text.is_empty())
        .map(str::to_string)
}

#[async_trait::async_trait]
impl ExchangeRateSource for InstantAnswerSource {
    fn name(&self) -> &'static str {
        "instant-answer"
    }

    async fn lookup(&self, base: &str, target: &str) -> Result<String> {
        let query = format!("{} to {} exchange rate", base, target);
        let body: Value = self
            .client
            .get(format!("{}/", self.base_url))
            .query(&[
                ("q", query.as_str()),
                ("format", "json"),
                ("no_redirect", "1"),
                ("no_html", "1"),
            ])
            .send()
            .await
            .map_err(|e| request_error(self.name(), e))?
            .json()
            .await
            .map_err(|e| {
                AssistantError::RateSourceError(format!("Malformed instant answer: {}", e))
            })?;

        parse_instant_answer(&body).ok_or_else(|| {
            AssistantError::RateSourceError(format!(
                "No exchange rate info found for {}->{}",
                base, target
            ))
        })
    }
}

/// Tries each source in order and returns the first usable quote
pub struct FallbackRateSource {
    sources: Vec<Arc<dyn ExchangeRateSource>>,
}

impl FallbackRateSource {
    pub fn new(sources: Vec<Arc<dyn ExchangeRateSource>>) -> Self {
        Self { sources }
    }

    pub fn from_config(config: &RateConfig) -> Result<Self> {
        Ok(Self::new(vec![
            Arc::new(ExchangeRateHostSource::new(&config.primary_url, config.timeout)?),
            Arc::new(InstantAnswerSource::new(&config.fallback_url, config.timeout)?),
        ]))
    }
}

#[async_trait::async_trait]
impl ExchangeRateSource for FallbackRateSource {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn lookup(&self, base: &str, target: &str) -> Result<String> {
        let mut failures = Vec::with_capacity(self.sources.len());

        for source in &self.sources {
            match source.lookup(base, target).await {
                Ok(quote) => return Ok(quote),
                Err(e) => {
                    warn!(source = source.name(), error = %e, "Rate source failed, trying next");
                    failures.push(format!("{}: {}", source.name(), e));
                }
            }
        }

        Err(AssistantError::RateSourceError(if failures.is_empty() {
            "No rate sources configured".to_string()
        } else {
            failures.join("; ")
        }))
    }
}
