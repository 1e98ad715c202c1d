//! LLM bridge: send a system/user prompt pair, get text plus token usage.
//!
//! Providers report usage in different shapes. [`TokenUsage::from_response`]
//! checks the known locations in order and falls back to a word-count
//! estimate, so callers always receive a single normalized value.

// External imports (alphabetized)
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Token counts for one call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenUsage {
    /// Counts reported by the provider
    Reported { input: u64, output: u64 },
    /// No usage reported; output estimated from the word count
    Estimated { output: u64 },
}

impl TokenUsage {
    pub fn input(&self) -> u64 {
        match self {
            Self::Reported { input, .. } => *input,
            Self::Estimated { .. } => 0,
        }
    }

    pub fn output(&self) -> u64 {
        match self {
            Self::Reported { output, .. } | Self::Estimated { output } => *output,
        }
    }

    pub fn is_estimated(&self) -> bool {
        matches!(self, Self::Estimated { .. })
    }

    /// Normalize the usage block of a raw provider response.
    ///
    /// Probes `usage_metadata.{input_tokens,output_tokens}`,
    /// `token_usage.{prompt_tokens,completion_tokens}`,
    /// `response_metadata.token_usage` and `usage`, in that order.
    pub fn from_response(raw: &JsonValue, content: &str) -> Self {
        let candidates: [(&str, &str, &str); 4] = [
            ("/usage_metadata", "input_tokens", "output_tokens"),
            ("/token_usage", "prompt_tokens", "completion_tokens"),
            ("/response_metadata/token_usage", "prompt_tokens", "completion_tokens"),
            ("/usage", "prompt_tokens", "completion_tokens"),
        ];
        for (pointer, input_key, output_key) in candidates {
            if let Some(block) = raw.pointer(pointer).filter(|b| b.is_object()) {
                let input = block.get(input_key).and_then(JsonValue::as_u64);
                let output = block.get(output_key).and_then(JsonValue::as_u64);
                if input.is_some() || output.is_some() {
                    return Self::Reported {
                        input: input.unwrap_or(0),
                        output: output.unwrap_or(0),
                    };
                }
            }
        }
        Self::estimate(content)
    }

    /// Roughly 0.75 words per token
    pub fn estimate(content: &str) -> Self {
        let words = content.split_whitespace().count() as f64;
        Self::Estimated {
            output: (words / 0.75) as u64,
        }
    }
}

/// Text returned by one LLM call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmResponse {
    pub content: String,
    pub usage: TokenUsage,
}

/// Anything that can answer a list of chat messages
#[async_trait]
pub trait LlmBridge: Send + Sync {
    /// Short identifier for logs
    fn name(&self) -> &str;

    async fn invoke(&self, messages: &[ChatMessage]) -> crate::Result<LlmResponse>;

    /// Convenience wrapper for a system/user pair
    async fn complete(&self, system: &str, user: &str) -> crate::Result<LlmResponse> {
        self.invoke(&[ChatMessage::system(system), ChatMessage::user(user)])
            .await
    }
}

/// Client for any OpenAI-compatible `/chat/completions` endpoint
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiCompatibleClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    /// Build from `OPENAI_API_KEY`, `OPENAI_BASE_URL` and `OPENAI_MODEL`.
    ///
    /// Returns `None` when no API key is set.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())?;
        let base_url =
            std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Some(Self::new(api_key, base_url, model))
    }
}

#[async_trait]
impl LlmBridge for OpenAiCompatibleClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, messages: &[ChatMessage]) -> crate::Result<LlmResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": 0.2,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(crate::Error::llm(format!(
                "{} returned HTTP {}: {}",
                url,
                status,
                crate::utils::truncate_chars(&text, 200)
            )));
        }

        let raw: JsonValue = response.json().await?;
        let content = raw
            .pointer("/choices/0/message/content")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| crate::Error::llm("response has no choices[0].message.content"))?
            .trim()
            .to_string();
        let usage = TokenUsage::from_response(&raw, &content);
        Ok(LlmResponse { content, usage })
    }
}
