//! LLM client trait and provider implementations (spec §4.5).

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use leadscout_core::Ethnicity;

use crate::types::{Exemplars, LLMClassificationOutput, LLMError};

/// A bounded, well-formed result from one provider call, before cost/
/// provenance bookkeeping is attached by the caller.
#[derive(Debug, Clone)]
pub struct LLMCallResult {
    pub ethnicity: Ethnicity,
    pub confidence: f64,
    pub latency_ms: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Provider-agnostic LLM client trait (spec §4.5). Implementations must
/// never leave partial side effects: either a well-formed result or a
/// typed `LLMError`, nothing persisted by the client itself.
#[async_trait]
pub trait LLMClient: Send + Sync {
    async fn classify(&self, normalized_name: &str, context: &Exemplars) -> Result<LLMCallResult, LLMError>;

    fn provider_name(&self) -> &str;

    fn cost_per_call(&self, input_tokens: u64, output_tokens: u64) -> f64;
}

/// Configuration shared by HTTP-backed clients.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_key: String,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        Self { api_key: api_key.into(), base_url: None, model: model.into(), timeout }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }
}

fn build_http_client(timeout: Duration) -> Client {
    match catch_unwind(AssertUnwindSafe(|| Client::builder().timeout(timeout).build())) {
        Ok(Ok(client)) => client,
        Ok(Err(_)) | Err(_) => Client::builder()
            .no_proxy()
            .timeout(timeout)
            .build()
            .expect("failed to construct a fallback HTTP client"),
    }
}

/// Anthropic Claude-backed classifier client.
pub struct AnthropicClient {
    config: ClientConfig,
    http: Client,
}

impl AnthropicClient {
    const DEFAULT_BASE_URL: &'static str = "https://api.anthropic.com";
    const API_VERSION: &'static str = "2023-06-01";
    /// Cost assumptions for the configured classification model, USD per
    /// million tokens. Kept local to this client rather than a shared
    /// pricing table, since only one model is ever in play here.
    const INPUT_COST_PER_M: f64 = 0.80;
    const OUTPUT_COST_PER_M: f64 = 4.00;

    pub fn new(config: ClientConfig) -> Self {
        let http = build_http_client(config.timeout);
        Self { config, http }
    }

    fn base_url(&self) -> &str {
        self.config.base_url.as_deref().unwrap_or(Self::DEFAULT_BASE_URL)
    }

    fn build_prompt(&self, normalized_name: &str, context: &Exemplars) -> String {
        let mut prompt = String::from(
            "Classify the following South African director name into exactly one ethnicity \
             category from this closed set: african, white, indian, cape_malay, coloured, \
             chinese, unknown. Respond with strict JSON only: \
             {\"ethnicity\": <category>, \"confidence\": <0.0-1.0>}.\n\n",
        );
        if !context.is_empty() {
            prompt.push_str("Examples of prior verified classifications:\n");
            for (name, ethnicity) in context {
                prompt.push_str(&format!("- \"{name}\" -> {}\n", ethnicity.as_str()));
            }
            prompt.push('\n');
        }
        prompt.push_str(&format!("Name to classify: \"{normalized_name}\"\n"));
        prompt
    }
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<AnthropicMessage>,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
    usage: AnthropicUsage,
}

#[derive(Deserialize)]
struct AnthropicContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[async_trait]
impl LLMClient for AnthropicClient {
    async fn classify(&self, normalized_name: &str, context: &Exemplars) -> Result<LLMCallResult, LLMError> {
        let provider = self.provider_name().to_string();
        let start = Instant::now();

        let request = AnthropicRequest {
            model: &self.config.model,
            max_tokens: 64,
            messages: vec![AnthropicMessage {
                role: "user",
                content: self.build_prompt(normalized_name, context),
            }],
        };

        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url()))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", Self::API_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LLMError::Timeout(provider.clone())
                } else {
                    LLMError::ProviderUnavailable(provider.clone())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(LLMError::Auth(provider));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LLMError::RateLimited(provider));
        }
        if status.is_server_error() {
            return Err(LLMError::ProviderUnavailable(provider));
        }
        if !status.is_success() {
            return Err(LLMError::Unknown(provider, format!("HTTP {status}")));
        }

        let body: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| LLMError::SchemaViolation(provider.clone(), e.to_string()))?;

        let text = body
            .content
            .first()
            .map(|b| b.text.as_str())
            .unwrap_or_default();

        let parsed: LLMClassificationOutput = serde_json::from_str(text.trim())
            .map_err(|e| LLMError::SchemaViolation(provider.clone(), format!("non-JSON response: {e}")))?;

        let ethnicity = parsed
            .parse_ethnicity()
            .ok_or_else(|| LLMError::SchemaViolation(provider.clone(), format!("unrecognized ethnicity {}", parsed.ethnicity)))?;

        if !(0.0..=0.99).contains(&parsed.confidence) {
            return Err(LLMError::SchemaViolation(
                provider,
                format!("confidence {} outside [0.0, 0.99]", parsed.confidence),
            ));
        }

        Ok(LLMCallResult {
            ethnicity,
            confidence: parsed.confidence,
            latency_ms: start.elapsed().as_millis() as u64,
            input_tokens: body.usage.input_tokens,
            output_tokens: body.usage.output_tokens,
        })
    }

    fn provider_name(&self) -> &str {
        "anthropic"
    }

    fn cost_per_call(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 / 1_000_000.0) * Self::INPUT_COST_PER_M
            + (output_tokens as f64 / 1_000_000.0) * Self::OUTPUT_COST_PER_M
    }
}

/// OpenAI chat-completions-backed classifier client.
pub struct OpenAiClient {
    config: ClientConfig,
    http: Client,
}

impl OpenAiClient {
    const DEFAULT_BASE_URL: &'static str = "https://api.openai.com";
    const INPUT_COST_PER_M: f64 = 0.15;
    const OUTPUT_COST_PER_M: f64 = 0.60;

    pub fn new(config: ClientConfig) -> Self {
        let http = build_http_client(config.timeout);
        Self { config, http }
    }

    fn base_url(&self) -> &str {
        self.config.base_url.as_deref().unwrap_or(Self::DEFAULT_BASE_URL)
    }

    fn build_prompt(&self, normalized_name: &str, context: &Exemplars) -> String {
        let mut prompt = String::from(
            "Classify the following South African director name into exactly one ethnicity \
             category from this closed set: african, white, indian, cape_malay, coloured, \
             chinese, unknown. Respond with strict JSON only: \
             {\"ethnicity\": <category>, \"confidence\": <0.0-1.0>}.\n\n",
        );
        if !context.is_empty() {
            prompt.push_str("Examples of prior verified classifications:\n");
            for (name, ethnicity) in context {
                prompt.push_str(&format!("- \"{name}\" -> {}\n", ethnicity.as_str()));
            }
            prompt.push('\n');
        }
        prompt.push_str(&format!("Name to classify: \"{normalized_name}\"\n"));
        prompt
    }
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<AnthropicMessage>,
    response_format: OpenAiResponseFormat,
}

#[derive(Serialize)]
struct OpenAiResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    usage: OpenAiUsage,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Deserialize)]
struct OpenAiResponseMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[async_trait]
impl LLMClient for OpenAiClient {
    async fn classify(&self, normalized_name: &str, context: &Exemplars) -> Result<LLMCallResult, LLMError> {
        let provider = self.provider_name().to_string();
        let start = Instant::now();

        let request = OpenAiRequest {
            model: &self.config.model,
            messages: vec![AnthropicMessage {
                role: "user",
                content: self.build_prompt(normalized_name, context),
            }],
            response_format: OpenAiResponseFormat { kind: "json_object" },
        };

        let response = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url()))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LLMError::Timeout(provider.clone())
                } else {
                    LLMError::ProviderUnavailable(provider.clone())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(LLMError::Auth(provider));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LLMError::RateLimited(provider));
        }
        if status.is_server_error() {
            return Err(LLMError::ProviderUnavailable(provider));
        }
        if !status.is_success() {
            return Err(LLMError::Unknown(provider, format!("HTTP {status}")));
        }

        let body: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| LLMError::SchemaViolation(provider.clone(), e.to_string()))?;

        let text = body
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or_default();

        let parsed: LLMClassificationOutput = serde_json::from_str(text.trim())
            .map_err(|e| LLMError::SchemaViolation(provider.clone(), format!("non-JSON response: {e}")))?;

        let ethnicity = parsed
            .parse_ethnicity()
            .ok_or_else(|| LLMError::SchemaViolation(provider.clone(), format!("unrecognized ethnicity {}", parsed.ethnicity)))?;

        if !(0.0..=0.99).contains(&parsed.confidence) {
            return Err(LLMError::SchemaViolation(
                provider,
                format!("confidence {} outside [0.0, 0.99]", parsed.confidence),
            ));
        }

        Ok(LLMCallResult {
            ethnicity,
            confidence: parsed.confidence,
            latency_ms: start.elapsed().as_millis() as u64,
            input_tokens: body.usage.prompt_tokens,
            output_tokens: body.usage.completion_tokens,
        })
    }

    fn provider_name(&self) -> &str {
        "openai"
    }

    fn cost_per_call(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 / 1_000_000.0) * Self::INPUT_COST_PER_M
            + (output_tokens as f64 / 1_000_000.0) * Self::OUTPUT_COST_PER_M
    }
}

/// A no-op client used when no credentials are configured for a given
/// provider slot. Always reports the provider as unavailable so the
/// router fails over immediately rather than stalling.
pub struct NullClient {
    name: String,
}

impl NullClient {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl LLMClient for NullClient {
    async fn classify(&self, _normalized_name: &str, _context: &Exemplars) -> Result<LLMCallResult, LLMError> {
        Err(LLMError::ProviderUnavailable(self.name.clone()))
    }

    fn provider_name(&self) -> &str {
        &self.name
    }

    fn cost_per_call(&self, _input_tokens: u64, _output_tokens: u64) -> f64 {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_client_is_always_provider_unavailable() {
        let client = NullClient::new("anthropic");
        let result = client.classify("bongani", &vec![]).await;
        assert!(matches!(result, Err(LLMError::ProviderUnavailable(_))));
    }
}
