//! OpenAI Chat Completions API provider.
//!
//! Implements non-streaming chat completions via OpenAI's `/v1/chat/completions` API.
//! Also serves OpenRouter, Ollama, and other OpenAI-compatible endpoints.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use callrelay_core::types::Message;

use crate::{Completion, CompletionRequest, Credentials, LlmProvider, ModelApi, ModelInfo, Usage};

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// API flavour, for the few places the presets differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiStyle {
    OpenAi,
    OpenRouter,
    Ollama,
}

pub struct OpenAiProvider {
    pub base_url: String,
    pub api_style: ApiStyle,
    provider_id: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    fn with_style(base_url: &str, api_style: ApiStyle, provider_id: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_style,
            provider_id: provider_id.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn openai(base_url: Option<&str>) -> Self {
        Self::with_style(base_url.unwrap_or(OPENAI_BASE_URL), ApiStyle::OpenAi, "openai")
    }

    pub fn openrouter(base_url: Option<&str>) -> Self {
        Self::with_style(
            base_url.unwrap_or(OPENROUTER_BASE_URL),
            ApiStyle::OpenRouter,
            "openrouter",
        )
    }

    pub fn ollama(base_url: Option<&str>) -> Self {
        Self::with_style(base_url.unwrap_or(OLLAMA_BASE_URL), ApiStyle::Ollama, "ollama")
    }

    /// Rebuild the HTTP client with a whole-request timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> anyhow::Result<Self> {
        if let Some(timeout) = timeout {
            self.client = reqwest::Client::builder().timeout(timeout).build()?;
        }
        Ok(self)
    }

    fn authorize(
        &self,
        mut req: reqwest::RequestBuilder,
        credentials: &Credentials,
    ) -> anyhow::Result<reqwest::RequestBuilder> {
        match credentials {
            Credentials::ApiKey { api_key } => {
                req = req.header("authorization", format!("Bearer {api_key}"));
            }
            Credentials::None if self.api_style == ApiStyle::Ollama => {}
            Credentials::None => {
                anyhow::bail!("{} requires an API key", self.provider_id)
            }
        }
        if self.api_style == ApiStyle::OpenRouter {
            req = req.header("HTTP-Referer", "https://github.com/callrelay/callrelay");
        }
        Ok(req)
    }
}

// --- OpenAI request/response types ---

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

/// Pull the first choice's text out of a response body, trimmed.
fn extract_completion(body: ChatCompletionResponse) -> anyhow::Result<Completion> {
    let choice = body
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Completion response contained no choices"))?;

    let text = choice
        .message
        .and_then(|m| m.content)
        .map(|c| c.trim().to_string())
        .unwrap_or_default();
    if text.is_empty() {
        anyhow::bail!("Completion response contained no text");
    }

    Ok(Completion {
        text,
        usage: body.usage.map(|u| Usage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        }),
        finish_reason: choice.finish_reason,
    })
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn id(&self) -> &str {
        &self.provider_id
    }

    fn api(&self) -> ModelApi {
        ModelApi::OpenAiCompletions
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
        credentials: &Credentials,
    ) -> anyhow::Result<Completion> {
        let body = OpenAiRequest {
            model: &request.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            stream: false,
            temperature: request.temperature,
        };

        debug!(
            model = %body.model,
            base_url = %self.base_url,
            messages = body.messages.len(),
            "Requesting OpenAI-compatible completion"
        );

        let req = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("content-type", "application/json");
        let response = self.authorize(req, credentials)?.json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI API error {status}: {body}");
        }

        let raw = response.text().await?;
        trace!(body = %raw, "OpenAI completion response");
        let parsed: ChatCompletionResponse = serde_json::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("Malformed completion response: {e}"))?;

        extract_completion(parsed)
    }

    async fn list_models(&self, credentials: &Credentials) -> anyhow::Result<Vec<ModelInfo>> {
        let req = self
            .client
            .get(format!("{}/v1/models", self.base_url))
            .header("content-type", "application/json");

        let response = self.authorize(req, credentials)?.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Failed to list models {status}: {body}");
        }

        let body: ModelsResponse = response.json().await?;
        Ok(body
            .data
            .into_iter()
            .map(|m| ModelInfo {
                name: m.id.clone(),
                id: m.id,
                api: ModelApi::OpenAiCompletions,
            })
            .collect())
    }
}
