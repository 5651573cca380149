//! Minimal Ollama API client.
//!
//! This crate provides a focused client for a local Ollama server with:
//! - Model listing (`/api/tags`), which doubles as a connectivity check
//! - Non-streaming text completion (`/api/generate`)
//! - Model inspection (`/api/show`) for context window discovery

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_HOST: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama2:7b";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Errors that can occur when using the Ollama client.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Ollama API client.
#[derive(Clone)]
pub struct Ollama {
    client: reqwest::Client,
    host: String,
    model: String,
    timeout: Duration,
}

impl Ollama {
    /// Create a client for the server at `host` with the given request timeout.
    pub fn new(host: impl Into<String>, timeout: Duration) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            host: host.into().trim_end_matches('/').to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout,
        })
    }

    /// Set the default model for this client.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// The server base URL, without a trailing slash.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The default model used when a request does not name one.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// The per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// List the models installed on the server.
    pub async fn list_models(&self) -> Result<Vec<ModelSummary>, Error> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.host))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let tags: ApiTags = Self::parse(response).await?;
        Ok(tags.models)
    }

    /// Send a completion request and return the full (non-streamed) response.
    pub async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, Error> {
        let api_request = self.build_api_request(&request);

        let response = self
            .client
            .post(format!("{}/api/generate", self.host))
            .headers(Self::build_headers())
            .json(&api_request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let api_response: ApiGenerateResponse = Self::parse(response).await?;

        Ok(GenerateResponse {
            model: api_response.model,
            text: api_response.response,
            done: api_response.done,
            prompt_tokens: api_response.prompt_eval_count,
            completion_tokens: api_response.eval_count,
        })
    }

    /// Fetch the model's modelfile and parameters.
    pub async fn show(&self, model: &str) -> Result<ModelDetails, Error> {
        let response = self
            .client
            .post(format!("{}/api/show", self.host))
            .headers(Self::build_headers())
            .json(&ApiShowRequest { name: model })
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        Self::parse(response).await
    }

    fn build_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    fn build_api_request<'a>(&'a self, request: &'a GenerateRequest) -> ApiGenerateRequest<'a> {
        ApiGenerateRequest {
            model: request.model.as_deref().unwrap_or(&self.model),
            prompt: &request.prompt,
            stream: false,
            options: &request.options,
        }
    }

    fn transport_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Timeout(self.timeout)
        } else {
            Error::Network(e.to_string())
        }
    }

    async fn parse<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<T, Error> {
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status,
                message: body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))
    }
}

// ============================================================================
// Public types
// ============================================================================

/// A completion request to send to Ollama.
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    pub model: Option<String>,
    pub prompt: String,
    pub options: Options,
}

impl GenerateRequest {
    /// Create a new request for the given prompt.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }
}

/// Sampling options understood by `/api/generate`.
///
/// Unset fields are omitted so the server applies the model's defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Options {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repeat_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repeat_last_n: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

/// A completion response from Ollama.
#[derive(Debug, Clone)]
pub struct GenerateResponse {
    pub model: String,
    pub text: String,
    pub done: bool,
    pub prompt_tokens: Option<usize>,
    pub completion_tokens: Option<usize>,
}

/// An installed model as reported by `/api/tags`.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelSummary {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub modified_at: Option<String>,
}

/// Model information as reported by `/api/show`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelDetails {
    #[serde(default)]
    pub modelfile: String,
    #[serde(default)]
    pub parameters: String,
}

impl ModelDetails {
    /// The configured context window, if the model declares `num_ctx`.
    ///
    /// Checks the parameter block first, then `PARAMETER` lines in the modelfile.
    pub fn num_ctx(&self) -> Option<usize> {
        self.parameters
            .lines()
            .chain(self.modelfile.lines())
            .find_map(|line| {
                let mut words = line.split_whitespace();
                let mut key = words.next()?;
                if key.eq_ignore_ascii_case("PARAMETER") {
                    key = words.next()?;
                }
                if key != "num_ctx" {
                    return None;
                }
                words.next()?.parse().ok()
            })
    }
}

// ============================================================================
// Internal API types
// ============================================================================

#[derive(Debug, Serialize)]
struct ApiGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: &'a Options,
}

#[derive(Debug, Deserialize)]
struct ApiGenerateResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<usize>,
    #[serde(default)]
    eval_count: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ApiShowRequest<'a> {
    name: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiTags {
    #[serde(default)]
    models: Vec<ModelSummary>,
}
