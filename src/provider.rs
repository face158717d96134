//! Embedding and chat-completion providers.
//!
//! The retrieval core consumes two capabilities: "can embed text"
//! ([`Embedder`]) and "can chat-complete" ([`ChatModel`]). [`OpenAiProvider`]
//! implements both against any OpenAI-compatible HTTP API (OpenAI itself,
//! Ollama, LM Studio, vLLM, ...), parameterized by base URL, API key, and
//! model names.

use std::pin::Pin;
use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::document::ChatMessage;
use crate::error::{Result, RetrievalError};
use crate::index::EmbeddingMatrix;

/// Default per-request timeout for embeddings and non-streaming chat calls.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default completion token cap for chat calls.
const DEFAULT_MAX_TOKENS: u32 = 2000;

/// A finite, non-restartable stream of completion text tokens.
///
/// Provider failures surface as a single terminal token rather than an error,
/// since consumers forward the stream verbatim to live HTTP clients.
pub type TokenStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// A provider that turns text into fixed-dimension `f32` vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifier of the embedding model, recorded in cache metadata and
    /// compared on reload to detect model changes.
    fn model_id(&self) -> &str;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of texts into an N×D matrix, one row per input, in
    /// input order.
    ///
    /// The default implementation makes one [`embed`](Embedder::embed) call
    /// per item. Any single failure fails the whole batch — a partial matrix
    /// would silently misalign rows against chunks.
    async fn embed_batch(&self, texts: &[String]) -> Result<EmbeddingMatrix> {
        let mut rows = Vec::with_capacity(texts.len());
        for text in texts {
            rows.push(self.embed(text).await?);
        }
        EmbeddingMatrix::from_rows(rows)
    }
}

/// A provider that generates chat completions.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Generate a completion for `messages`.
    async fn generate_text(&self, messages: &[ChatMessage], temperature: f32) -> Result<String>;

    /// Generate a completion as a lazy token stream.
    ///
    /// The stream is finite and not restartable. Failures — including a
    /// failed initial request — are reported as one terminal message token.
    /// Cancellation is dropping the stream; the underlying connection is
    /// released with it.
    async fn generate_text_stream(&self, messages: &[ChatMessage], temperature: f32)
    -> TokenStream;
}

/// Configuration for [`OpenAiProvider`].
///
/// `base_url` should include the API version path, e.g.
/// `https://api.openai.com/v1` or `http://localhost:11434/v1`.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base URL of the OpenAI-compatible API, including the `/v1` path.
    pub base_url: String,
    /// API key sent as a bearer token. May be a placeholder for local servers.
    pub api_key: String,
    /// Model used for the embeddings endpoint.
    pub embedding_model: String,
    /// Model used for the chat-completions endpoint.
    pub chat_model: String,
    /// Per-request timeout for embeddings and non-streaming chat.
    pub timeout: Duration,
    /// Completion token cap for chat calls.
    pub max_tokens: u32,
}

impl ProviderConfig {
    /// Create a configuration with default models and timeout.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            embedding_model: "text-embedding-3-small".to_string(),
            chat_model: "qwen2.5:7b".to_string(),
            timeout: DEFAULT_TIMEOUT,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// Set the embedding model name.
    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    /// Set the chat model name.
    pub fn with_chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = model.into();
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the completion token cap.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// An [`Embedder`] and [`ChatModel`] speaking the OpenAI-compatible wire
/// protocol over `reqwest`.
pub struct OpenAiProvider {
    client: reqwest::Client,
    config: ProviderConfig,
}

impl OpenAiProvider {
    /// Create a provider from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Provider`] if the HTTP client cannot be
    /// constructed.
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| provider_err(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn chat_request(&self, messages: &[ChatMessage], temperature: f32, stream: bool) -> ChatRequest {
        ChatRequest {
            model: self.config.chat_model.clone(),
            messages: messages.to_vec(),
            temperature,
            max_tokens: self.config.max_tokens,
            stream,
        }
    }
}

fn provider_err(message: impl Into<String>) -> RetrievalError {
    RetrievalError::Provider { provider: "openai".to_string(), message: message.into() }
}

/// Read an error body and extract the API's message when it parses.
async fn error_detail(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorResponse>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body);
    format!("API returned {status}: {detail}")
}

// ── wire types ─────────────────────────────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatStreamChunk {
    choices: Vec<ChatStreamChoice>,
}

#[derive(Deserialize)]
struct ChatStreamChoice {
    delta: ChatDelta,
}

#[derive(Deserialize, Default)]
struct ChatDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

// ── Embedder ───────────────────────────────────────────────────────

#[async_trait]
impl Embedder for OpenAiProvider {
    fn model_id(&self) -> &str {
        &self.config.embedding_model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(model = %self.config.embedding_model, text_len = text.len(), "embedding text");

        let request = EmbeddingRequest { model: &self.config.embedding_model, input: text };
        let response = self
            .client
            .post(self.endpoint("embeddings"))
            .bearer_auth(&self.config.api_key)
            .timeout(self.config.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "embeddings request failed");
                provider_err(format!("embeddings request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let detail = error_detail(response).await;
            error!(%detail, "embeddings API error");
            return Err(provider_err(detail));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| provider_err(format!("failed to parse embeddings response: {e}")))?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| provider_err("embeddings API returned no data"))
    }
}

// ── ChatModel ──────────────────────────────────────────────────────

#[async_trait]
impl ChatModel for OpenAiProvider {
    async fn generate_text(&self, messages: &[ChatMessage], temperature: f32) -> Result<String> {
        debug!(model = %self.config.chat_model, message_count = messages.len(), "chat completion");

        let request = self.chat_request(messages, temperature, false);
        let response = self
            .client
            .post(self.endpoint("chat/completions"))
            .bearer_auth(&self.config.api_key)
            .timeout(self.config.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "chat request failed");
                provider_err(format!("chat request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let detail = error_detail(response).await;
            error!(%detail, "chat API error");
            return Err(provider_err(detail));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| provider_err(format!("failed to parse chat response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| provider_err("chat API returned no choices"))
    }

    async fn generate_text_stream(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> TokenStream {
        let request = self.chat_request(messages, temperature, true);
        let builder = self
            .client
            .post(self.endpoint("chat/completions"))
            .bearer_auth(&self.config.api_key)
            .json(&request);

        Box::pin(stream! {
            let response = match builder.send().await {
                Ok(response) => response,
                Err(e) => {
                    error!(error = %e, "chat stream request failed");
                    yield format!("模型调用失败: {e}");
                    return;
                }
            };

            if !response.status().is_success() {
                let detail = error_detail(response).await;
                error!(%detail, "chat stream API error");
                yield format!("模型调用失败: {detail}");
                return;
            }

            // SSE framing: `data: {json}` lines, `data: [DONE]` sentinel.
            // Bytes may arrive mid-line, so carry a partial line across reads.
            let mut bytes = response.bytes_stream();
            let mut pending = String::new();
            while let Some(item) = bytes.next().await {
                let chunk = match item {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        error!(error = %e, "chat stream interrupted");
                        yield format!("模型调用失败: {e}");
                        return;
                    }
                };
                pending.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(newline) = pending.find('\n') {
                    let line: String = pending.drain(..=newline).collect();
                    let line = line.trim();
                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    if data == "[DONE]" {
                        return;
                    }
                    if let Ok(parsed) = serde_json::from_str::<ChatStreamChunk>(data) {
                        if let Some(content) =
                            parsed.choices.into_iter().next().and_then(|c| c.delta.content)
                        {
                            if !content.is_empty() {
                                yield content;
                            }
                        }
                    }
                }
            }
        })
    }
}
