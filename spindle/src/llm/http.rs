//! OpenAI-compatible HTTP oracle.
//!
//! Posts a single-message chat completion to `<base_url>/chat/completions`
//! and returns `choices[0].message.content`. Works against OpenAI,
//! OpenRouter and local gateways that speak the same shape.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{Oracle, OracleError};

/// Chat-completions oracle over HTTP.
///
/// Non-streaming by design: callers consume the whole reply (JSON plan,
/// reflection, final answer), so there is nothing to stream.
pub struct HttpOracle {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl HttpOracle {
    /// Creates an oracle against an OpenAI-compatible endpoint.
    ///
    /// `base_url` is the API root (e.g. `https://openrouter.ai/api/v1`);
    /// `/chat/completions` is appended per request.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// Reads `SPINDLE_LLM_BASE_URL`, `SPINDLE_LLM_API_KEY`,
    /// `SPINDLE_LLM_MODEL` from the environment. Returns `None` when the
    /// base URL is unset (callers fall back to refusing LLM work).
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("SPINDLE_LLM_BASE_URL").ok()?;
        let api_key = std::env::var("SPINDLE_LLM_API_KEY").unwrap_or_default();
        let model =
            std::env::var("SPINDLE_LLM_MODEL").unwrap_or_else(|_| "qwen2.5-coder:7b".to_string());
        Some(Self::new(base_url, api_key, model))
    }
}

#[async_trait]
impl Oracle for HttpOracle {
    async fn generate(&self, prompt: &str) -> Result<String, OracleError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "stream": false,
        });

        let mut request = self.client.post(&url).json(&body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| OracleError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(OracleError::Request(format!("HTTP {}: {}", status, text)));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Malformed(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| OracleError::Malformed("no choices in completion".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Trailing slash on the base URL is normalised away.
    #[test]
    fn base_url_trailing_slash_trimmed() {
        let oracle = HttpOracle::new("http://localhost:11434/v1/", "", "m");
        assert_eq!(oracle.base_url, "http://localhost:11434/v1");
    }

    /// **Scenario**: from_env returns None without a base URL.
    #[test]
    fn from_env_requires_base_url() {
        std::env::remove_var("SPINDLE_LLM_BASE_URL");
        assert!(HttpOracle::from_env().is_none());
    }
}
