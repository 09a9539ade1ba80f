// feedback-service-rs/src/llm_client.rs
//
// HTTP client for the configured LLM provider
//
// This module provides:
// - The `CompletionBackend` seam the feedback generator calls through
// - Request/response envelopes for Google (Gemini), Anthropic and
//   OpenAI-compatible chat completion APIs
// - Error classification into retryable vs. non-retryable failures
// - Bounded, sequential retries with exponential backoff and jitter
//
// Every attempt is bounded by the configured timeout. The default is a
// single attempt; `LLM_MAX_RETRIES` adds at most two more.

use async_trait::async_trait;
use backoff::{backoff::Backoff, ExponentialBackoff, ExponentialBackoffBuilder};
use rand::Rng;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::{LlmProvider, LlmSettings};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_OUTPUT_TOKENS: u32 = 1000;

/// Anything that can turn a prompt into raw model text.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

// Custom error type for LLM client operations
// Variants distinguish failures that are worth retrying from those that are not
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    // 400, 401, 403, 404 - retrying will not help
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // 429
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    // 500, 502, 503, 504
    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    // 2xx with a body we cannot read the model text from
    #[error("Malformed response envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::ServerError(_)
                | LlmError::Network(_)
                | LlmError::Timeout(_)
                | LlmError::RateLimitExceeded(_)
        )
    }

    fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout(err.to_string())
        } else if err.is_connect() {
            LlmError::Network(format!("Connection failed: {}", err))
        } else {
            LlmError::Network(err.to_string())
        }
    }

    fn from_status(status: u16, body: &str) -> Self {
        match status {
            400 | 401 | 403 | 404 => LlmError::InvalidRequest(format!("HTTP {}: {}", status, body)),
            429 => LlmError::RateLimitExceeded(body.to_string()),
            500 | 502 | 503 | 504 => LlmError::ServerError(format!("HTTP {}: {}", status, body)),
            _ => LlmError::Unknown(format!("HTTP {}: {}", status, body)),
        }
    }
}

// --- Google (Gemini) envelopes ---

#[derive(Debug, Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContentIn<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiContentIn<'a> {
    parts: Vec<GeminiPartIn<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiPartIn<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiContentOut,
}

#[derive(Debug, Deserialize)]
struct GeminiContentOut {
    #[serde(default)]
    parts: Vec<GeminiPartOut>,
}

#[derive(Debug, Deserialize)]
struct GeminiPartOut {
    text: Option<String>,
}

// --- Anthropic envelopes ---

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicBlock>,
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

// --- OpenAI-compatible envelopes ---

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    total_tokens: u32,
}

/// `CompletionBackend` that talks to the configured provider over HTTPS.
#[derive(Debug)]
pub struct HttpCompletionBackend {
    client: Client,
    settings: LlmSettings,
}

impl HttpCompletionBackend {
    pub fn new(settings: LlmSettings) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| LlmError::Unknown(format!("failed to build HTTP client: {}", e)))?;

        tracing::info!(
            "LLM client initialized: provider={}, model={}, timeout={:?}, max_retries={}",
            settings.provider,
            settings.model,
            settings.timeout,
            settings.max_retries
        );

        Ok(Self { client, settings })
    }

    pub fn provider(&self) -> LlmProvider {
        self.settings.provider
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.settings.initial_retry_delay)
            .with_max_interval(self.settings.max_retry_delay)
            .with_multiplier(2.0)
            .with_randomization_factor(0.5)
            // attempts are capped by max_retries instead
            .with_max_elapsed_time(None)
            .build()
    }

    fn build_request(&self, prompt: &str) -> RequestBuilder {
        let settings = &self.settings;
        let request = self.client.post(&settings.api_url);

        match settings.provider {
            LlmProvider::Google => request
                .header("x-goog-api-key", &settings.api_key)
                .json(&GeminiRequest {
                    contents: vec![GeminiContentIn {
                        parts: vec![GeminiPartIn { text: prompt }],
                    }],
                }),
            LlmProvider::Anthropic => request
                .header("x-api-key", &settings.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&AnthropicRequest {
                    model: &settings.model,
                    max_tokens: MAX_OUTPUT_TOKENS,
                    messages: vec![ChatMessage {
                        role: "user",
                        content: prompt,
                    }],
                }),
            LlmProvider::OpenAi => request
                .bearer_auth(&settings.api_key)
                .json(&ChatCompletionRequest {
                    model: &settings.model,
                    messages: vec![ChatMessage {
                        role: "user",
                        content: prompt,
                    }],
                    max_tokens: MAX_OUTPUT_TOKENS,
                }),
        }
    }

    // Execute a single request attempt
    async fn execute_request(&self, prompt: &str) -> Result<String, LlmError> {
        let response = self
            .build_request(prompt)
            .send()
            .await
            .map_err(LlmError::from_transport)?;

        let status = response.status();
        let body = response.text().await.map_err(LlmError::from_transport)?;

        if !status.is_success() {
            return Err(LlmError::from_status(status.as_u16(), &body));
        }

        extract_text(self.settings.provider, &body)
    }
}

#[async_trait]
impl CompletionBackend for HttpCompletionBackend {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let mut backoff = self.create_backoff();
        let mut attempt: u32 = 0;

        tracing::debug!(
            "Sending prompt to {} (model: {}, {} chars)",
            self.settings.provider,
            self.settings.model,
            prompt.len()
        );

        loop {
            attempt += 1;
            if attempt > 1 {
                tracing::info!("Retry attempt {} for LLM request", attempt);
            }

            match self.execute_request(prompt).await {
                Ok(text) => return Ok(text),
                Err(err) => {
                    if !err.is_retryable() || attempt > self.settings.max_retries {
                        tracing::warn!("LLM request failed after {} attempt(s): {}", attempt, err);
                        return Err(err);
                    }

                    let delay = backoff
                        .next_backoff()
                        .unwrap_or(self.settings.max_retry_delay);
                    let jitter = rand::thread_rng().gen_range(0..=100);
                    let delay = delay + Duration::from_millis(jitter);

                    tracing::warn!("Retryable error: {}. Retrying in {:?}", err, delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Pull the model's text out of a provider response body.
fn extract_text(provider: LlmProvider, body: &str) -> Result<String, LlmError> {
    let malformed = |e: serde_json::Error| LlmError::MalformedEnvelope(e.to_string());

    let text = match provider {
        LlmProvider::Google => {
            let data: GeminiResponse = serde_json::from_str(body).map_err(malformed)?;
            data.candidates
                .into_iter()
                .next()
                .and_then(|c| c.content.parts.into_iter().find_map(|p| p.text))
        }
        LlmProvider::Anthropic => {
            let data: AnthropicResponse = serde_json::from_str(body).map_err(malformed)?;
            if let Some(usage) = &data.usage {
                tracing::debug!(
                    "LLM request completed. Used {} input / {} output tokens",
                    usage.input_tokens,
                    usage.output_tokens
                );
            }
            data.content
                .into_iter()
                .find(|block| block.kind == "text")
                .and_then(|block| block.text)
        }
        LlmProvider::OpenAi => {
            let data: ChatCompletionResponse = serde_json::from_str(body).map_err(malformed)?;
            if let Some(usage) = &data.usage {
                tracing::debug!("LLM request completed. Used {} tokens", usage.total_tokens);
            }
            data.choices
                .into_iter()
                .next()
                .and_then(|choice| choice.message.content)
        }
    };

    text.ok_or_else(|| LlmError::MalformedEnvelope(format!("no text in {} response", provider)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Clone)]
    struct Stub {
        status: StatusCode,
        body: Value,
        delay: Duration,
        hits: Arc<AtomicUsize>,
    }

    async fn stub_handler(State(stub): State<Stub>) -> (StatusCode, Json<Value>) {
        stub.hits.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(stub.delay).await;
        (stub.status, Json(stub.body))
    }

    /// Serve `stub` on an ephemeral port and return settings pointing at it.
    async fn spawn_stub(provider: LlmProvider, stub: Stub) -> LlmSettings {
        let app = Router::new()
            .route("/generate", post(stub_handler))
            .with_state(stub);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let mut settings = LlmSettings::new(provider, "test-key");
        settings.api_url = format!("http://{}/generate", addr);
        settings.timeout = Duration::from_secs(5);
        settings.initial_retry_delay = Duration::from_millis(10);
        settings.max_retry_delay = Duration::from_millis(20);
        settings
    }

    fn stub(status: StatusCode, body: Value) -> Stub {
        Stub {
            status,
            body,
            delay: Duration::ZERO,
            hits: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[test]
    fn test_retryable_classification() {
        assert!(LlmError::from_status(503, "busy").is_retryable());
        assert!(LlmError::from_status(429, "slow down").is_retryable());
        assert!(LlmError::Timeout("t".into()).is_retryable());
        assert!(!LlmError::from_status(401, "no").is_retryable());
        assert!(!LlmError::from_status(418, "teapot").is_retryable());
        assert!(!LlmError::MalformedEnvelope("x".into()).is_retryable());
    }

    #[test]
    fn test_extract_text_per_provider() {
        let google = r#"{"candidates":[{"content":{"parts":[{"text":"hello"}]}}]}"#;
        assert_eq!(extract_text(LlmProvider::Google, google).unwrap(), "hello");

        let anthropic = r#"{"content":[{"type":"text","text":"hi there"}],"usage":{"input_tokens":3,"output_tokens":2}}"#;
        assert_eq!(extract_text(LlmProvider::Anthropic, anthropic).unwrap(), "hi there");

        let openai = r#"{"choices":[{"message":{"role":"assistant","content":"hey"}}],"usage":{"total_tokens":5}}"#;
        assert_eq!(extract_text(LlmProvider::OpenAi, openai).unwrap(), "hey");
    }

    #[test]
    fn test_extract_text_rejects_bad_envelopes() {
        assert!(matches!(
            extract_text(LlmProvider::Google, r#"{"candidates":[]}"#),
            Err(LlmError::MalformedEnvelope(_))
        ));
        assert!(matches!(
            extract_text(LlmProvider::Google, "not json"),
            Err(LlmError::MalformedEnvelope(_))
        ));
        assert!(matches!(
            extract_text(LlmProvider::OpenAi, r#"{"choices":[{"message":{"content":null}}]}"#),
            Err(LlmError::MalformedEnvelope(_))
        ));
        assert!(matches!(
            extract_text(LlmProvider::Anthropic, r#"{"content":[{"type":"tool_use"}]}"#),
            Err(LlmError::MalformedEnvelope(_))
        ));
    }

    #[tokio::test]
    async fn test_google_round_trip() {
        let body = json!({"candidates": [{"content": {"parts": [{"text": "{\"ok\":true}"}]}}]});
        let settings = spawn_stub(LlmProvider::Google, stub(StatusCode::OK, body)).await;
        let backend = HttpCompletionBackend::new(settings).unwrap();

        let text = backend.complete("prompt").await.unwrap();
        assert_eq!(text, "{\"ok\":true}");
    }

    #[tokio::test]
    async fn test_non_success_status_is_not_retried() {
        let stub = stub(StatusCode::UNAUTHORIZED, json!({"error": "bad key"}));
        let hits = stub.hits.clone();
        let mut settings = spawn_stub(LlmProvider::Anthropic, stub).await;
        settings.max_retries = 2;
        let backend = HttpCompletionBackend::new(settings).unwrap();

        let err = backend.complete("prompt").await.unwrap_err();
        assert!(matches!(err, LlmError::InvalidRequest(_)));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_server_errors_retry_up_to_limit() {
        let stub = stub(StatusCode::SERVICE_UNAVAILABLE, json!({"error": "overloaded"}));
        let hits = stub.hits.clone();
        let mut settings = spawn_stub(LlmProvider::OpenAi, stub).await;
        settings.max_retries = 2;
        let backend = HttpCompletionBackend::new(settings).unwrap();

        let err = backend.complete("prompt").await.unwrap_err();
        assert!(matches!(err, LlmError::ServerError(_)));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_single_attempt_by_default() {
        let stub = stub(StatusCode::BAD_GATEWAY, json!({}));
        let hits = stub.hits.clone();
        let settings = spawn_stub(LlmProvider::OpenAi, stub).await;
        let backend = HttpCompletionBackend::new(settings).unwrap();

        assert!(backend.complete("prompt").await.is_err());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let mut slow = stub(StatusCode::OK, json!({"choices": []}));
        slow.delay = Duration::from_secs(3);
        let mut settings = spawn_stub(LlmProvider::OpenAi, slow).await;
        settings.timeout = Duration::from_millis(200);
        let backend = HttpCompletionBackend::new(settings).unwrap();

        let started = std::time::Instant::now();
        let err = backend.complete("prompt").await.unwrap_err();
        assert!(matches!(err, LlmError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let mut settings = LlmSettings::new(LlmProvider::Google, "test-key");
        // Port 9 (discard) is closed on any sane test machine
        settings.api_url = "http://127.0.0.1:9/generate".to_string();
        settings.timeout = Duration::from_secs(2);
        let backend = HttpCompletionBackend::new(settings).unwrap();

        let err = backend.complete("prompt").await.unwrap_err();
        assert!(matches!(err, LlmError::Network(_) | LlmError::Timeout(_)));
    }
}
