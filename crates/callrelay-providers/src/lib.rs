//! Chat-completion provider abstraction.
//!
//! Each provider implements the [`LlmProvider`] trait to turn an ordered
//! message history into a single generated reply.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use callrelay_core::config::Config;
use callrelay_core::types::Message;

pub mod openai;

/// Supported LLM API protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelApi {
    OpenAiCompletions,
}

/// Credentials for authenticating with an LLM provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Credentials {
    #[serde(rename = "api_key")]
    ApiKey { api_key: String },
    #[serde(rename = "none")]
    None,
}

/// A request to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub temperature: Option<f64>,
}

/// A finished completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    /// Generated reply, trimmed. Never empty.
    pub text: String,
    pub usage: Option<Usage>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Model metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub api: ModelApi,
}

/// The core LLM provider trait.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider identifier (e.g., "openai", "ollama").
    fn id(&self) -> &str;

    /// API protocol used by this provider.
    fn api(&self) -> ModelApi;

    /// Run a non-streaming chat completion. An empty reply is an error.
    async fn complete(
        &self,
        request: &CompletionRequest,
        credentials: &Credentials,
    ) -> anyhow::Result<Completion>;

    /// List available models from this provider.
    async fn list_models(&self, credentials: &Credentials) -> anyhow::Result<Vec<ModelInfo>>;
}

/// Build the configured provider and its credentials.
pub fn from_config(config: &Config) -> anyhow::Result<(Arc<dyn LlmProvider>, Credentials)> {
    let provider_config = config.provider();
    let base_url = provider_config.base_url.as_deref();
    let timeout = match config.provider_timeout_secs() {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };

    let provider = match provider_config.effective_id() {
        "openai" => openai::OpenAiProvider::openai(base_url),
        "openrouter" => openai::OpenAiProvider::openrouter(base_url),
        "ollama" => openai::OpenAiProvider::ollama(base_url),
        other => anyhow::bail!("Unknown provider id: {other}"),
    }
    .with_timeout(timeout)?;

    let credentials = match provider_config.resolve_api_key() {
        Some(api_key) => Credentials::ApiKey { api_key },
        None => Credentials::None,
    };

    Ok((Arc::new(provider), credentials))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_defaults_to_openai() {
        let config = Config::default();
        let (provider, _creds) = from_config(&config).unwrap();
        assert_eq!(provider.id(), "openai");
        assert_eq!(provider.api(), ModelApi::OpenAiCompletions);
    }

    #[test]
    fn test_from_config_direct_key() {
        let config = Config::parse(r#"{ provider: { id: "openrouter", api_key: "sk-or" } }"#).unwrap();
        let (provider, creds) = from_config(&config).unwrap();
        assert_eq!(provider.id(), "openrouter");
        assert!(matches!(creds, Credentials::ApiKey { ref api_key } if api_key == "sk-or"));
    }

    #[test]
    fn test_from_config_unknown_provider() {
        let config = Config::parse(r#"{ provider: { id: "carrier-pigeon" } }"#).unwrap();
        assert!(from_config(&config).is_err());
    }

    #[test]
    fn test_request_serializes_messages_in_chat_shape() {
        let request = CompletionRequest {
            model: "gpt-4o-mini".into(),
            messages: vec![Message::system("sys"), Message::user("hi")],
            max_tokens: 120,
            temperature: Some(0.6),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
    }
}
