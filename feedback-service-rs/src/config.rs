// feedback-service-rs/src/config.rs
//
// Process configuration, read once at startup from the environment (and a
// `.env` file when present, see `config_rs::load_env`).
//
// Recognized variables:
// - LLM_PROVIDER: google | anthropic | openai. Unset means classifier-only mode.
// - GOOGLE_API_KEY / ANTHROPIC_API_KEY / OPENAI_API_KEY: provider credential
// - LLM_API_KEY: generic credential used when the provider-specific one is absent
// - LLM_MODEL, LLM_API_URL: model name and full endpoint override
// - LLM_TIMEOUT_SECS: per-attempt timeout (default: 30)
// - LLM_MAX_RETRIES: extra attempts after the first (default: 0, at most 2)
// - LLM_INITIAL_RETRY_DELAY_MS / LLM_MAX_RETRY_DELAY_MS: backoff window
// - MAX_REVIEW_LENGTH: characters kept from a review (default: 5000)
// - DATABASE_PATH: SQLite file (default: reviews.db)

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use config_rs::{get_env_string, get_env_var};

pub const DEFAULT_MAX_REVIEW_LENGTH: usize = 5000;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const MAX_RETRY_LIMIT: u32 = 2;
pub const DEFAULT_DATABASE_PATH: &str = "reviews.db";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("API key required for provider '{provider}' (set {var} or LLM_API_KEY)")]
    MissingCredential {
        provider: &'static str,
        var: &'static str,
    },
}

/// Remote model backends the service knows how to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    Google,
    Anthropic,
    OpenAi,
}

impl LlmProvider {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "google" | "gemini" => Some(Self::Google),
            "anthropic" | "claude" => Some(Self::Anthropic),
            "openai" => Some(Self::OpenAi),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
        }
    }

    fn key_var(&self) -> &'static str {
        match self {
            Self::Google => "GOOGLE_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Google => "gemini-pro",
            Self::Anthropic => "claude-3-haiku-20240307",
            Self::OpenAi => "gpt-3.5-turbo",
        }
    }

    pub fn default_api_url(&self, model: &str) -> String {
        match self {
            Self::Google => format!(
                "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
                model
            ),
            Self::Anthropic => "https://api.anthropic.com/v1/messages".to_string(),
            Self::OpenAi => "https://api.openai.com/v1/chat/completions".to_string(),
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything the HTTP completion client needs for one provider.
#[derive(Clone)]
pub struct LlmSettings {
    pub provider: LlmProvider,
    pub api_key: String,
    pub model: String,
    pub api_url: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub initial_retry_delay: Duration,
    pub max_retry_delay: Duration,
}

impl LlmSettings {
    /// Settings with the provider's public endpoint and default tuning.
    pub fn new(provider: LlmProvider, api_key: impl Into<String>) -> Self {
        let model = provider.default_model().to_string();
        Self {
            provider,
            api_key: api_key.into(),
            api_url: provider.default_api_url(&model),
            model,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: 0,
            initial_retry_delay: Duration::from_millis(500),
            max_retry_delay: Duration::from_millis(2000),
        }
    }

    fn from_env(provider: LlmProvider) -> Result<Self, ConfigError> {
        let api_key = get_env_string(provider.key_var())
            .or_else(|| get_env_string("LLM_API_KEY"))
            .ok_or(ConfigError::MissingCredential {
                provider: provider.name(),
                var: provider.key_var(),
            })?;

        let mut settings = Self::new(provider, api_key);
        if let Some(model) = get_env_string("LLM_MODEL") {
            settings.api_url = provider.default_api_url(&model);
            settings.model = model;
        }
        if let Some(url) = get_env_string("LLM_API_URL") {
            settings.api_url = url;
        }

        settings.timeout = Duration::from_secs(get_env_var("LLM_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS));
        settings.max_retries = clamp_retries(get_env_var("LLM_MAX_RETRIES", 0));
        settings.initial_retry_delay =
            Duration::from_millis(get_env_var("LLM_INITIAL_RETRY_DELAY_MS", 500));
        settings.max_retry_delay =
            Duration::from_millis(get_env_var("LLM_MAX_RETRY_DELAY_MS", 2000));

        Ok(settings)
    }
}

// Hand-written so the credential never reaches a log line.
impl fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmSettings")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_url", &self.api_url)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

fn clamp_retries(requested: u32) -> u32 {
    if requested > MAX_RETRY_LIMIT {
        tracing::warn!(
            "LLM_MAX_RETRIES={} exceeds the limit, using {}",
            requested,
            MAX_RETRY_LIMIT
        );
    }
    requested.min(MAX_RETRY_LIMIT)
}

/// Immutable process-wide configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// `None` runs the service in classifier-only mode.
    pub llm: Option<LlmSettings>,
    pub max_review_length: usize,
    pub database_path: PathBuf,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            llm: None,
            max_review_length: DEFAULT_MAX_REVIEW_LENGTH,
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
        }
    }
}

impl ServiceConfig {
    /// Read configuration from the environment.
    ///
    /// Fails only when a recognized provider is selected without a credential.
    pub fn from_env() -> Result<Self, ConfigError> {
        let llm = match get_env_string("LLM_PROVIDER") {
            None => {
                tracing::info!("LLM_PROVIDER not set, running in classifier-only mode");
                None
            }
            Some(name) => match LlmProvider::from_name(&name) {
                Some(provider) => Some(LlmSettings::from_env(provider)?),
                None => {
                    tracing::warn!(
                        "Unrecognized LLM_PROVIDER '{}', running in classifier-only mode",
                        name
                    );
                    None
                }
            },
        };

        Ok(Self {
            llm,
            max_review_length: get_env_var("MAX_REVIEW_LENGTH", DEFAULT_MAX_REVIEW_LENGTH).max(1),
            database_path: get_env_string("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH)),
        })
    }

    /// Provider name reported by the health endpoint.
    pub fn provider_name(&self) -> &'static str {
        self.llm
            .as_ref()
            .map(|llm| llm.provider.name())
            .unwrap_or("fallback")
    }
}
