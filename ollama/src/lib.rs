//! Minimal Ollama API client.
//!
//! This crate provides a focused client for a local Ollama runtime with:
//! - Non-streaming and streaming chat completions
//! - Batch embeddings
//! - Newline-delimited JSON parsing for streaming responses

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio_stream::Stream;

/// Where a local Ollama listens unless told otherwise.
pub const DEFAULT_HOST: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "phi";
const DEFAULT_EMBED_MODEL: &str = "all-minilm";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Errors that can occur when using the Ollama client.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Error connecting to Ollama. Is the Ollama app running? ({0})")]
    Unavailable(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_connect() {
            Error::Unavailable(e.to_string())
        } else {
            Error::Network(e.to_string())
        }
    }
}

/// Add a scheme to bare `host:port` values as Ollama itself accepts them.
pub fn normalize_host(host: &str) -> String {
    let host = host.trim();
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}

/// Ollama API client.
#[derive(Clone)]
pub struct Ollama {
    client: reqwest::Client,
    base_url: String,
    model: String,
    embed_model: String,
}

impl Ollama {
    /// Create a new client talking to the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: build_client(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: DEFAULT_MODEL.to_string(),
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
        }
    }

    /// Create a client from the OLLAMA_HOST environment variable.
    ///
    /// Falls back to `http://localhost:11434` when unset.
    pub fn from_env() -> Result<Self, Error> {
        let host = std::env::var("OLLAMA_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
        if host.trim().is_empty() {
            return Err(Error::Config("OLLAMA_HOST is empty".to_string()));
        }
        Ok(Self::new(normalize_host(&host)))
    }

    /// Set the default chat model for this client.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the model used for embeddings.
    pub fn with_embed_model(mut self, model: impl Into<String>) -> Self {
        self.embed_model = model.into();
        self
    }

    /// Set the overall HTTP request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_client(timeout);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn embed_model(&self) -> &str {
        &self.embed_model
    }

    /// Send a chat request and return the full response.
    pub async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, Error> {
        let api_request = self.build_api_request(&request, false);
        tracing::debug!(model = %api_request.model, messages = api_request.messages.len(), "ollama chat");

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&api_request)
            .send()
            .await
            .map_err(Error::from_reqwest)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status,
                message: api_error_message(&body),
            });
        }

        let api_response: ApiChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))?;

        Ok(api_response.into())
    }

    /// Send a chat request and stream the response.
    pub async fn stream(
        &self,
        request: ChatRequest,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<ChatChunk, Error>> + Send>>, Error> {
        let api_request = self.build_api_request(&request, true);

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&api_request)
            .send()
            .await
            .map_err(Error::from_reqwest)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status,
                message: api_error_message(&body),
            });
        }

        // Objects and multibyte characters can be split across network
        // chunks, so carry the raw tail over and decode whole lines only.
        let stream = response
            .bytes_stream()
            .scan(Vec::new(), |buffer, result| {
                let chunks = match result {
                    Ok(bytes) => {
                        buffer.extend_from_slice(&bytes);
                        parse_ndjson_buffered(buffer)
                    }
                    Err(e) => vec![Err(Error::Network(e.to_string()))],
                };
                futures::future::ready(Some(chunks))
            })
            .flat_map(futures::stream::iter);

        Ok(Box::pin(stream))
    }

    /// Embed a batch of texts, returning one vector per input in order.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, Error> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let api_request = ApiEmbedRequest {
            model: self.embed_model.clone(),
            input: texts.to_vec(),
        };

        let response = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .json(&api_request)
            .send()
            .await
            .map_err(Error::from_reqwest)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status,
                message: api_error_message(&body),
            });
        }

        let api_response: ApiEmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))?;

        if api_response.embeddings.len() != texts.len() {
            return Err(Error::Parse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                api_response.embeddings.len()
            )));
        }

        Ok(api_response.embeddings)
    }

    fn build_api_request(&self, request: &ChatRequest, stream: bool) -> ApiChatRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system {
            messages.push(ApiMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.extend(request.messages.iter().map(|m| ApiMessage {
            role: m.role.as_str().to_string(),
            content: m.content.clone(),
        }));

        let options = if request.temperature.is_some() || request.num_predict.is_some() {
            Some(ApiOptions {
                temperature: request.temperature,
                num_predict: request.num_predict,
            })
        } else {
            None
        };

        ApiChatRequest {
            model: request.model.clone().unwrap_or_else(|| self.model.clone()),
            messages,
            stream,
            options,
        }
    }
}

fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Ollama reports failures as `{"error": "..."}`; fall back to the raw body.
fn api_error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ApiError {
        error: String,
    }

    serde_json::from_str::<ApiError>(body)
        .map(|e| e.error)
        .unwrap_or_else(|_| body.to_string())
}

// ============================================================================
// Public types
// ============================================================================

/// A chat request to send to Ollama.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: Option<String>,
    pub system: Option<String>,
    pub messages: Vec<Message>,
    pub temperature: Option<f32>,
    pub num_predict: Option<i32>,
}

impl ChatRequest {
    /// Create a new request with the given messages.
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            model: None,
            system: None,
            messages,
            temperature: None,
            num_predict: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_num_predict(mut self, num_predict: i32) -> Self {
        self.num_predict = Some(num_predict);
        self
    }
}

/// A message in the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
        }
    }
}

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A completed chat response.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub model: String,
    pub message: Message,
    pub done_reason: Option<String>,
    pub usage: Usage,
}

impl ChatResponse {
    /// The assistant's reply text.
    pub fn text(&self) -> &str {
        &self.message.content
    }
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

/// One piece of a streaming response.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatChunk {
    pub content: String,
    pub done: bool,
}

// ============================================================================
// Internal API types
// ============================================================================

#[derive(Debug, Serialize)]
struct ApiChatRequest {
    model: String,
    messages: Vec<ApiMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ApiOptions>,
}

#[derive(Debug, Serialize)]
struct ApiOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiChatResponse {
    model: String,
    message: ApiMessage,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<usize>,
    #[serde(default)]
    eval_count: Option<usize>,
}

impl From<ApiChatResponse> for ChatResponse {
    fn from(api: ApiChatResponse) -> Self {
        let role = match api.message.role.as_str() {
            "system" => Role::System,
            "user" => Role::User,
            _ => Role::Assistant,
        };
        Self {
            model: api.model,
            message: Message {
                role,
                content: api.message.content,
            },
            done_reason: api.done_reason,
            usage: Usage {
                prompt_tokens: api.prompt_eval_count.unwrap_or_default(),
                completion_tokens: api.eval_count.unwrap_or_default(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiStreamChunk {
    #[serde(default)]
    message: Option<ApiMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct ApiEmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ApiEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Parse newline-delimited JSON objects from a buffer, consuming complete
/// lines and leaving any partial trailing line for the next chunk.
fn parse_ndjson_buffered(buffer: &mut Vec<u8>) -> Vec<Result<ChatChunk, Error>> {
    let mut chunks = Vec::new();

    while let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
        let line = &buffer[..newline_pos];

        if !line.iter().all(u8::is_ascii_whitespace) {
            match serde_json::from_slice::<ApiStreamChunk>(line) {
                Ok(ApiStreamChunk {
                    error: Some(message),
                    ..
                }) => chunks.push(Err(Error::Api {
                    status: 200,
                    message,
                })),
                Ok(chunk) => chunks.push(Ok(ChatChunk {
                    content: chunk.message.map(|m| m.content).unwrap_or_default(),
                    done: chunk.done,
                })),
                Err(e) => chunks.push(Err(Error::Parse(format!("stream parse error: {e}")))),
            }
        }

        buffer.drain(..=newline_pos);
    }

    chunks
}
