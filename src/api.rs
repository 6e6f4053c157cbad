//! The analyze request/response contract.
//!
//! Requests carry a `headers` array; replies carry either `mappings` or an
//! `error` message. Configuration problems are reported verbatim and checked
//! first. Every other failure is logged with detail and answered with a
//! generic message.

use log::error;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{
    config::ConfigError,
    headers::header_text,
    inference::SchemaInferenceService,
    mapping::Mapping,
    provider::{OpenAiSetupError, ReasoningProvider},
};

pub const GENERIC_FAILURE: &str = "Failed to process schema.";

pub const STATUS_OK: u16 = 200;
pub const STATUS_SERVER_ERROR: u16 = 500;

#[derive(Debug, Default, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub headers: Value,
}

impl AnalyzeRequest {
    /// Header texts from the request; anything other than an array is empty.
    pub fn header_texts(&self) -> Vec<String> {
        self.headers
            .as_array()
            .map(|values| values.iter().map(header_text).collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnalyzeBody {
    Mappings { mappings: Vec<Mapping> },
    Error { error: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzeReply {
    pub status: u16,
    pub body: AnalyzeBody,
}

impl AnalyzeReply {
    fn ok(mappings: Vec<Mapping>) -> Self {
        Self {
            status: STATUS_OK,
            body: AnalyzeBody::Mappings { mappings },
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_SERVER_ERROR,
            body: AnalyzeBody::Error {
                error: message.into(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == STATUS_OK
    }
}

/// Handles one analyze request.
///
/// `connect` builds the provider; it runs before the body is parsed so a
/// missing credential is reported ahead of any other work.
pub fn handle_analyze<P, E, F>(body: &str, connect: F) -> AnalyzeReply
where
    P: ReasoningProvider,
    E: Into<ConnectError>,
    F: FnOnce() -> Result<P, E>,
{
    let provider = match connect().map_err(Into::<ConnectError>::into) {
        Ok(provider) => provider,
        Err(ConnectError::Config(err)) => {
            error!("Schema analysis misconfigured: {err}");
            return AnalyzeReply::failure(err.to_string());
        }
        Err(ConnectError::Other(detail)) => {
            error!("Schema analysis failed: {detail}");
            return AnalyzeReply::failure(GENERIC_FAILURE);
        }
    };

    let request: AnalyzeRequest = match serde_json::from_str(body) {
        Ok(request) => request,
        Err(err) => {
            error!("Schema analysis failed: invalid request body: {err}");
            return AnalyzeReply::failure(GENERIC_FAILURE);
        }
    };

    let service = SchemaInferenceService::new(provider);
    match service.infer(&request.header_texts()) {
        Ok(mappings) => AnalyzeReply::ok(mappings),
        Err(err) => {
            error!("Schema analysis failed: {err}");
            AnalyzeReply::failure(GENERIC_FAILURE)
        }
    }
}

/// Provider construction failure as seen by [`handle_analyze`].
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Other(String),
}

impl From<OpenAiSetupError> for ConnectError {
    fn from(err: OpenAiSetupError) -> Self {
        match err {
            OpenAiSetupError::Config(config) => ConnectError::Config(config),
            OpenAiSetupError::Client(other) => ConnectError::Other(other.to_string()),
        }
    }
}

impl From<std::convert::Infallible> for ConnectError {
    fn from(err: std::convert::Infallible) -> Self {
        match err {}
    }
}
