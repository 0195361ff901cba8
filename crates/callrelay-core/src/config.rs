//! Configuration loading and validation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CallRelayError, Result};
use crate::session::DEFAULT_MAX_MESSAGES;

pub const DEFAULT_PORT: u16 = 4000;
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a warm, professional phone receptionist for the business. \
    Keep replies short (1-2 sentences). \
    If the caller asks to book or leave a message, politely collect their name, phone number, and reason for calling. \
    Never give legal/medical advice. If unsure, offer a callback from the team.";
pub const DEFAULT_GREETING: &str = "Hello, thanks for calling. How can I help you today?";
pub const DEFAULT_REPROMPT: &str = "Sorry, I didn't catch that. Could you repeat that?";
pub const DEFAULT_APOLOGY: &str = "I'm sorry, I'm having trouble answering right now.";

/// Top-level callrelay configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewayConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<VoiceConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Chat-completion provider configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider flavour: "openai" (default), "openrouter", or "ollama".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Request timeout in seconds (default: 30, 0 = transport default).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl ProviderConfig {
    /// Resolve the API key: check `api_key` first, then the `api_key_env`
    /// variable (default `OPENAI_API_KEY`).
    pub fn resolve_api_key(&self) -> Option<String> {
        let env = self
            .api_key_env
            .clone()
            .or_else(|| Some(DEFAULT_API_KEY_ENV.to_string()));
        resolve_secret_field(&self.api_key, &env)
    }

    pub fn effective_id(&self) -> &str {
        self.id.as_deref().unwrap_or("openai")
    }
}

/// Language-model behaviour for each turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// Prefix user messages with the caller's phone number.
    #[serde(default)]
    pub annotate_caller: bool,
}

/// Spoken prompts and speech-recognition settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceConfig {
    #[serde(default = "default_voice")]
    pub voice: String,
    #[serde(default = "default_language")]
    pub language: String,
    /// Gather `speechTimeout`; "auto" lets the provider detect end of speech.
    #[serde(default = "default_speech_timeout")]
    pub speech_timeout: String,
    #[serde(default = "default_greeting")]
    pub greeting: String,
    #[serde(default = "default_reprompt")]
    pub reprompt: String,
    #[serde(default = "default_apology")]
    pub apology: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            voice: default_voice(),
            language: default_language(),
            speech_timeout: default_speech_timeout(),
            greeting: default_greeting(),
            reprompt: default_reprompt(),
            apology: default_apology(),
        }
    }
}

fn default_voice() -> String {
    "alice".into()
}

fn default_language() -> String {
    "en-US".into()
}

fn default_speech_timeout() -> String {
    "auto".into()
}

fn default_greeting() -> String {
    DEFAULT_GREETING.into()
}

fn default_reprompt() -> String {
    DEFAULT_REPROMPT.into()
}

fn default_apology() -> String {
    DEFAULT_APOLOGY.into()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Maximum messages kept per call, system prompt included (default: 12).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_messages: Option<usize>,

    /// Store the apology as an assistant message when the model call fails.
    #[serde(default)]
    pub persist_apology: bool,

    /// Drop sessions idle for this many seconds (default: 3600, 0 = never).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "callrelay_gateway=debug").
    #[serde(default)]
    pub filters: Vec<String>,

    /// Output target: "stderr" (default) or "stdout".
    #[serde(default = "default_log_output")]
    pub output: String,
}

fn default_log_format() -> String {
    "plain".into()
}

fn default_log_output() -> String {
    "stderr".into()
}

/// Resolve a secret: check the direct value first, then the env-var reference.
pub fn resolve_secret_field(direct: &Option<String>, env_var: &Option<String>) -> Option<String> {
    if let Some(val) = direct {
        if !val.is_empty() {
            return Some(val.clone());
        }
    }
    if let Some(env) = env_var {
        if let Ok(val) = std::env::var(env) {
            if !val.is_empty() {
                return Some(val);
            }
        }
    }
    None
}

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").map_err(|e| CallRelayError::Config(e.to_string()))?;
    Ok(re
        .replace_all(input, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned())
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    /// A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    /// Parse config text (JSON5), substituting `${ENV_VAR}` references.
    pub fn parse(raw: &str) -> Result<Self> {
        let substituted = substitute_env_vars(raw)?;
        json5::from_str(&substituted).map_err(|e| CallRelayError::Config(e.to_string()))
    }

    /// Apply process-environment overrides (`PORT`).
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(port) = std::env::var("PORT") {
            if !port.is_empty() {
                let port: u16 = port
                    .parse()
                    .map_err(|_| CallRelayError::Config(format!("Invalid PORT value: {port}")))?;
                self.set_port(port);
            }
        }
        Ok(())
    }

    pub fn set_port(&mut self, port: u16) {
        match self.gateway.as_mut() {
            Some(gw) => gw.port = port,
            None => {
                self.gateway = Some(GatewayConfig { port, bind: None });
            }
        }
    }

    /// Default config file location: `~/.callrelay/config.json`
    pub fn default_path() -> PathBuf {
        data_dir().join("config.json")
    }

    pub fn port(&self) -> u16 {
        self.gateway.as_ref().map(|g| g.port).unwrap_or(DEFAULT_PORT)
    }

    pub fn bind_addr(&self) -> String {
        self.gateway
            .as_ref()
            .and_then(|g| g.bind.clone())
            .unwrap_or_else(|| "0.0.0.0".to_string())
    }

    pub fn provider(&self) -> ProviderConfig {
        self.provider.clone().unwrap_or_default()
    }

    pub fn model(&self) -> String {
        self.provider
            .as_ref()
            .and_then(|p| p.model.clone())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string())
    }

    pub fn provider_timeout_secs(&self) -> u64 {
        self.provider
            .as_ref()
            .and_then(|p| p.timeout_secs)
            .unwrap_or(30)
    }

    pub fn system_prompt(&self) -> String {
        self.agent
            .as_ref()
            .and_then(|a| a.system_prompt.clone())
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string())
    }

    pub fn max_tokens(&self) -> u32 {
        self.agent.as_ref().and_then(|a| a.max_tokens).unwrap_or(120)
    }

    pub fn temperature(&self) -> f64 {
        self.agent.as_ref().and_then(|a| a.temperature).unwrap_or(0.6)
    }

    pub fn annotate_caller(&self) -> bool {
        self.agent.as_ref().is_some_and(|a| a.annotate_caller)
    }

    pub fn voice(&self) -> VoiceConfig {
        self.voice.clone().unwrap_or_default()
    }

    pub fn max_messages(&self) -> usize {
        self.session
            .as_ref()
            .and_then(|s| s.max_messages)
            .unwrap_or(DEFAULT_MAX_MESSAGES)
    }

    pub fn persist_apology(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.persist_apology)
    }

    pub fn idle_timeout_secs(&self) -> u64 {
        self.session
            .as_ref()
            .and_then(|s| s.idle_timeout_secs)
            .unwrap_or(3600)
    }

    /// Get a config value by dotted path (e.g. "gateway.port", "voice.greeting").
    pub fn get_path(&self, path: &str) -> Option<serde_json::Value> {
        let json = serde_json::to_value(self).ok()?;
        let mut current = &json;
        for segment in path.split('.') {
            current = current.get(segment)?;
        }
        Some(current.clone())
    }

    /// Validate config, returning (warnings, errors).
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        let provider = self.provider();
        if provider.effective_id() != "ollama" && provider.resolve_api_key().is_none() {
            warnings.push(format!(
                "Provider '{}' has no API key configured (set {} or provider.api_key)",
                provider.effective_id(),
                provider.api_key_env.as_deref().unwrap_or(DEFAULT_API_KEY_ENV)
            ));
        }

        if !matches!(provider.effective_id(), "openai" | "openrouter" | "ollama") {
            errors.push(format!("Unknown provider id: {}", provider.effective_id()));
        }

        if self.port() == 0 {
            errors.push("Gateway port cannot be 0".to_string());
        }

        if self.max_messages() < 2 {
            errors.push("session.max_messages must be at least 2".to_string());
        }

        if self.max_tokens() == 0 {
            errors.push("agent.max_tokens must be greater than 0".to_string());
        }

        let temperature = self.temperature();
        if !(0.0..=2.0).contains(&temperature) {
            errors.push(format!("agent.temperature must be within 0..=2, got {temperature}"));
        }

        (warnings, errors)
    }
}

/// Base directory for callrelay data: `~/.callrelay/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".callrelay")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_substitution() {
        // SAFETY: test-only, variable name unique to this test
        unsafe { std::env::set_var("TEST_CR_KEY", "sk-test-123") };
        let input = r#"{"key": "${TEST_CR_KEY}", "other": "plain"}"#;
        let result = substitute_env_vars(input).unwrap();
        assert!(result.contains("sk-test-123"));
        assert!(result.contains("plain"));
        unsafe { std::env::remove_var("TEST_CR_KEY") };
    }

    #[test]
    fn test_env_var_missing() {
        let input = r#"{"key": "${NONEXISTENT_VAR_CR_TEST}"}"#;
        let result = substitute_env_vars(input).unwrap();
        assert!(result.contains(r#""""#));
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port(), 4000);
        assert_eq!(config.model(), "gpt-4o-mini");
        assert_eq!(config.max_tokens(), 120);
        assert_eq!(config.temperature(), 0.6);
        assert_eq!(config.max_messages(), 12);
        assert!(!config.persist_apology());
        assert!(!config.annotate_caller());
        assert_eq!(config.idle_timeout_secs(), 3600);
        assert_eq!(config.voice().voice, "alice");
        assert_eq!(config.voice().language, "en-US");
        assert_eq!(config.voice().speech_timeout, "auto");
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config.port(), DEFAULT_PORT);
    }

    #[test]
    fn test_load_json5_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                // comments are allowed
                gateway: { port: 8080 },
                agent: { system_prompt: "Be terse.", annotate_caller: true },
                voice: { voice: "Polly.Joanna" },
                session: { max_messages: 6, persist_apology: true },
            }"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.port(), 8080);
        assert_eq!(config.system_prompt(), "Be terse.");
        assert!(config.annotate_caller());
        assert_eq!(config.voice().voice, "Polly.Joanna");
        // Unset voice fields fall back to defaults
        assert_eq!(config.voice().greeting, DEFAULT_GREETING);
        assert_eq!(config.max_messages(), 6);
        assert!(config.persist_apology());
    }

    #[test]
    fn test_parse_error_is_config_error() {
        let err = Config::parse("{ gateway: ").unwrap_err();
        assert!(matches!(err, CallRelayError::Config(_)));
    }

    #[test]
    fn test_provider_resolve_api_key() {
        // SAFETY: test-only, variable name unique to this test
        unsafe { std::env::set_var("TEST_CR_API_KEY", "from-env") };
        let provider = ProviderConfig {
            api_key_env: Some("TEST_CR_API_KEY".into()),
            ..ProviderConfig::default()
        };
        assert_eq!(provider.resolve_api_key(), Some("from-env".into()));

        let provider2 = ProviderConfig {
            api_key_env: Some("TEST_CR_API_KEY".into()),
            api_key: Some("direct-key".into()),
            ..ProviderConfig::default()
        };
        // Direct key takes priority
        assert_eq!(provider2.resolve_api_key(), Some("direct-key".into()));
        unsafe { std::env::remove_var("TEST_CR_API_KEY") };
    }

    #[test]
    fn test_set_port_creates_gateway_section() {
        let mut config = Config::default();
        config.set_port(5050);
        assert_eq!(config.port(), 5050);
        assert_eq!(config.bind_addr(), "0.0.0.0");
    }

    #[test]
    fn test_get_path() {
        let config = Config::parse(r#"{ voice: { greeting: "Hi there" } }"#).unwrap();
        assert_eq!(
            config.get_path("voice.greeting"),
            Some(serde_json::json!("Hi there"))
        );
        assert!(config.get_path("voice.nonexistent").is_none());
    }

    #[test]
    fn test_logging_config_defaults() {
        let config = Config::parse(r#"{ "logging": {} }"#).unwrap();
        let logging = config.logging.expect("logging should be present");
        assert_eq!(logging.format, "plain");
        assert!(logging.level.is_none());
        assert_eq!(logging.output, "stderr");
        assert!(logging.filters.is_empty());
    }

    #[test]
    fn test_validate_missing_api_key_warns() {
        let config = Config {
            provider: Some(ProviderConfig {
                api_key_env: Some("NONEXISTENT_CR_KEY_VAR".into()),
                ..ProviderConfig::default()
            }),
            ..Config::default()
        };
        let (warnings, errors) = config.validate();
        assert!(
            warnings.iter().any(|w| w.contains("openai") && w.to_lowercase().contains("key")),
            "Expected a warning about missing API key, got: {warnings:?}"
        );
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
    }

    #[test]
    fn test_validate_ollama_needs_no_key() {
        let config = Config::parse(r#"{ provider: { id: "ollama", api_key_env: "NONEXISTENT_CR_KEY_VAR" } }"#).unwrap();
        let (warnings, _errors) = config.validate();
        assert!(warnings.is_empty(), "got: {warnings:?}");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = Config::parse(
            r#"{
                provider: { id: "mystery" },
                agent: { temperature: 3.5, max_tokens: 0 },
                session: { max_messages: 1 },
            }"#,
        )
        .unwrap();
        let (_warnings, errors) = config.validate();
        assert!(errors.iter().any(|e| e.contains("provider")));
        assert!(errors.iter().any(|e| e.contains("temperature")));
        assert!(errors.iter().any(|e| e.contains("max_tokens")));
        assert!(errors.iter().any(|e| e.contains("max_messages")));
    }
}
