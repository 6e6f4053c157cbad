//! Reasoning providers that turn a header list into mapping proposals.
//!
//! The provider is treated as an opaque function returning JSON text. The
//! [`OpenAiProvider`] talks to an OpenAI-compatible chat completions endpoint;
//! [`ReplayProvider`] returns a previously recorded response from disk.

use std::{fs, path::PathBuf};

use log::{debug, info};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{ConfigError, ProviderConfig};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(String),
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("failed to decode provider envelope: {0}")]
    Envelope(String),
    #[error("failed to read recorded response {path:?}: {source}")]
    Replay {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub trait ReasoningProvider {
    /// Human-readable provider label for logs.
    fn name(&self) -> &str;

    /// Sends the instructions and the user prompt, returning the raw message
    /// content. `None` means the provider answered without content.
    fn complete(&self, instructions: &str, prompt: &str) -> Result<Option<String>, ProviderError>;
}

impl<P> ReasoningProvider for &P
where
    P: ReasoningProvider + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    fn complete(&self, instructions: &str, prompt: &str) -> Result<Option<String>, ProviderError> {
        (**self).complete(instructions, prompt)
    }
}

impl<P> ReasoningProvider for Box<P>
where
    P: ReasoningProvider + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    fn complete(&self, instructions: &str, prompt: &str) -> Result<Option<String>, ProviderError> {
        (**self).complete(instructions, prompt)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_effort: Option<&'a str>,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Blocking client for OpenAI-compatible chat completions.
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    url: String,
    model: String,
    reasoning_effort: Option<String>,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("url", &self.url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl OpenAiProvider {
    /// Fails with [`ConfigError::MissingCredential`] before any client is
    /// built when the API key is absent.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, OpenAiSetupError> {
        let api_key = config.require_api_key()?.to_string();
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Network(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key,
            url: config.completions_url(),
            model: config.model.clone(),
            reasoning_effort: config.reasoning_effort.clone(),
        })
    }
}

#[derive(Debug, Error)]
pub enum OpenAiSetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Client(#[from] ProviderError),
}

impl ReasoningProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.model
    }

    fn complete(&self, instructions: &str, prompt: &str) -> Result<Option<String>, ProviderError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "developer",
                    content: instructions,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            reasoning_effort: self.reasoning_effort.as_deref(),
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        info!("Requesting mapping proposals from {} ({})", self.model, self.url);
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            let message = match serde_json::from_str::<ApiErrorEnvelope>(&body) {
                Ok(envelope) => envelope.error.message,
                Err(_) => body,
            };
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let envelope: ChatResponse = response
            .json()
            .map_err(|e| ProviderError::Envelope(e.to_string()))?;
        let content = envelope
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content);
        debug!(
            "Provider returned {} byte(s) of content",
            content.as_ref().map(String::len).unwrap_or_default()
        );
        Ok(content)
    }
}

/// Serves a recorded provider response instead of calling the network.
#[derive(Debug, Clone)]
pub struct ReplayProvider {
    path: PathBuf,
}

impl ReplayProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ReasoningProvider for ReplayProvider {
    fn name(&self) -> &str {
        "replay"
    }

    fn complete(&self, _instructions: &str, _prompt: &str) -> Result<Option<String>, ProviderError> {
        info!("Replaying recorded proposals from {:?}", self.path);
        let content = fs::read_to_string(&self.path).map_err(|source| ProviderError::Replay {
            path: self.path.clone(),
            source,
        })?;
        Ok(Some(content))
    }
}
