//! Completion backends.
//!
//! Both call sites (results-page location and classification) only need
//! "prompt in, JSON-shaped text out", so they share one trait and the backend
//! per call site is a configuration choice. Output is untrusted text: decode it
//! with [`parse_lenient`].

use crate::config::{LlmBackendConfig, LlmProvider};
use crate::error::{JsonRecoveryError, ServiceError};
use crate::utils::excerpt;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str, system: Option<&str>) -> Result<String, ServiceError>;
}

/// Build the configured backend for one call site.
pub fn build_llm(config: &LlmBackendConfig) -> Result<Arc<dyn LlmClient>, ServiceError> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    let api_key = config.api_key();
    let backend = Backend {
        http,
        base_url: config.base_url().to_string(),
        api_key,
        model: config.model.clone(),
        max_tokens: config.max_tokens,
        timeout_secs: config.timeout_secs,
    };

    Ok(match config.provider {
        LlmProvider::Anthropic => Arc::new(AnthropicClient(backend)),
        LlmProvider::OpenAi => Arc::new(OpenAiClient(backend)),
    })
}

struct Backend {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
    timeout_secs: u64,
}

impl Backend {
    fn key(&self, provider: &'static str) -> Result<&str, ServiceError> {
        self.api_key.as_deref().ok_or(ServiceError::MissingApiKey(provider))
    }

    async fn post<B: Serialize + Sync, R: DeserializeOwned>(
        &self,
        provider: &'static str,
        req: reqwest::RequestBuilder,
        body: &B,
    ) -> Result<R, ServiceError> {
        let resp = req.json(body).send().await.map_err(|e| {
            if e.is_timeout() {
                ServiceError::Timeout(format!("{} completion after {}s", provider, self.timeout_secs))
            } else {
                ServiceError::Network(e)
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            warn!("{} returned {}: {}", provider, status, excerpt(&detail, 500));
            return Err(ServiceError::Http {
                status,
                url: self.base_url.clone(),
            });
        }

        let text = resp.text().await?;
        serde_json::from_str(&text).map_err(|e| ServiceError::unexpected(provider, e.to_string()))
    }
}

// ── Anthropic ─────────────────────────────────────────────────────────────────

pub struct AnthropicClient(Backend);

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicBlock>,
}

#[derive(Deserialize)]
struct AnthropicBlock {
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, prompt: &str, system: Option<&str>) -> Result<String, ServiceError> {
        let b = &self.0;
        let req = b
            .http
            .post(format!("{}/v1/messages", b.base_url))
            .header("x-api-key", b.key("anthropic")?)
            .header("anthropic-version", "2023-06-01");
        let body = AnthropicRequest {
            model: &b.model,
            max_tokens: b.max_tokens,
            system,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let resp: AnthropicResponse = b.post("anthropic", req, &body).await?;
        let text = resp
            .content
            .into_iter()
            .find_map(|block| block.text)
            .ok_or_else(|| ServiceError::unexpected("anthropic", "no text block in response"))?;
        debug!("anthropic: {} chars", text.len());
        Ok(text)
    }
}

// ── OpenAI ────────────────────────────────────────────────────────────────────

pub struct OpenAiClient(Backend);

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, prompt: &str, system: Option<&str>) -> Result<String, ServiceError> {
        let b = &self.0;
        let req = b
            .http
            .post(format!("{}/v1/chat/completions", b.base_url))
            .bearer_auth(b.key("openai")?);

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });
        let body = OpenAiRequest {
            model: &b.model,
            max_tokens: b.max_tokens,
            messages,
        };

        let resp: OpenAiResponse = b.post("openai", req, &body).await?;
        let text = resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ServiceError::unexpected("openai", "empty choice"))?;
        debug!("openai: {} chars", text.len());
        Ok(text)
    }
}

// ── Lenient decode ────────────────────────────────────────────────────────────

/// Parse model output as JSON. If that fails, retry from the first `opener`
/// (`'['` or `'{'`), since models sometimes lead with commentary.
pub fn parse_lenient<T: DeserializeOwned>(raw: &str, opener: char) -> Result<T, JsonRecoveryError> {
    let first_err = match serde_json::from_str(raw.trim()) {
        Ok(v) => return Ok(v),
        Err(e) => e,
    };

    if let Some(pos) = raw.find(opener) {
        match serde_json::from_str(&raw[pos..]) {
            Ok(v) => {
                debug!("Recovered JSON after skipping {} leading chars", pos);
                return Ok(v);
            }
            Err(e) => debug!("Second parse attempt failed: {}", e),
        }
    }

    Err(JsonRecoveryError {
        source: first_err,
        excerpt: excerpt(raw, 200),
    })
}
