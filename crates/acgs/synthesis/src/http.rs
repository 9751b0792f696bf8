//! Oracle backed by an OpenAI-compatible chat-completion endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::SynthesisError;
use crate::oracle::{OracleRequest, OracleResponse, RuleOracle};

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Connection settings for [`HttpOracle`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpOracleConfig {
    pub endpoint: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub request_timeout_ms: u64,
}

impl Default for HttpOracleConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.into(),
            model: "gpt-4o-mini".into(),
            api_key_env: "ACGS_ORACLE_API_KEY".into(),
            temperature: 0.0,
            max_tokens: 512,
            request_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Value,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

pub struct HttpOracle {
    id: String,
    config: HttpOracleConfig,
    api_key: String,
    client: Client,
}

impl HttpOracle {
    /// Build the oracle, reading the API key from the configured variable.
    pub fn from_env(config: HttpOracleConfig) -> Result<Self, SynthesisError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            SynthesisError::Transport(format!("environment variable {} not set", config.api_key_env))
        })?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(
        config: HttpOracleConfig,
        api_key: impl Into<String>,
    ) -> Result<Self, SynthesisError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| SynthesisError::Transport(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            id: format!("http:{}", config.model),
            config,
            api_key: api_key.into(),
            client,
        })
    }
}

#[async_trait]
impl RuleOracle for HttpOracle {
    fn id(&self) -> &str {
        &self.id
    }

    async fn propose(&self, request: &OracleRequest) -> Result<OracleResponse, SynthesisError> {
        let payload = json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
            "messages": [
                {"role": "system", "content": "You write policy rules as S-expressions."},
                {"role": "user", "content": request.prompt},
            ],
        });

        debug!(oracle = %self.id, principle_id = %request.principle.id, "sending synthesis request");
        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| SynthesisError::Transport(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SynthesisError::Oracle {
                oracle: self.id.clone(),
                detail: format!("status {}: {}", status, truncate(&body, 320)),
            });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| SynthesisError::Transport(format!("invalid response: {}", e)))?;
        let choice = body.choices.first().ok_or_else(|| SynthesisError::Oracle {
            oracle: self.id.clone(),
            detail: "response did not include choices".into(),
        })?;

        Ok(parse_reply(&extract_text(&choice.message.content)))
    }
}

fn extract_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(""),
        other => other.to_string(),
    }
}

/// Split an optional trailing `confidence: x` line off the reply.
pub fn parse_reply(text: &str) -> OracleResponse {
    let mut confidence = DEFAULT_CONFIDENCE;
    let mut body = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("confidence:") {
            if let Ok(c) = rest.trim().parse::<f64>() {
                confidence = c;
                continue;
            }
        }
        body.push(line);
    }
    OracleResponse::new(body.join("\n").trim().to_string(), confidence)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max).collect();
        out.push_str("...");
        out
    }
}
