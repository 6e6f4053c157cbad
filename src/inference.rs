//! Schema inference: normalize headers, ask the provider once, reconcile.

use log::{info, warn};
use thiserror::Error;

use crate::{
    headers::normalize_headers,
    mapping::{Mapping, reconcile_mappings},
    provider::{ProviderError, ReasoningProvider},
};

pub const CONSOLIDATION_INSTRUCTIONS: &str = r#"
You are an expert Data Engineer helping a modern ATS/CRM onboard customers.
Your job is to migrate messy, legacy ATS database exports into clean, modern relational schemas.

Users provide a JSON array of column headers. Your task:
1) Identify redundant or semantically identical custom fields.
2) Group them together.
3) Propose a clean snake_case target field name.
4) Determine the best SQL data type (string, boolean, integer, date).

Ignore standard system fields and only process custom/messy fields.

Return strict JSON in this shape:
{
  "mappings": [
    {
      "target_field": "snake_case_name",
      "data_type": "string|boolean|integer|date",
      "source_fields": ["original header", "another"],
      "reasoning": "brief explanation"
    }
  ]
}
"#;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("reasoning provider '{provider}' failed: {source}")]
    Provider {
        provider: String,
        #[source]
        source: ProviderError,
    },
    #[error("reasoning provider returned malformed JSON: {0}")]
    MalformedResponse(#[source] serde_json::Error),
    #[error("failed to encode header list: {0}")]
    Prompt(#[source] serde_json::Error),
}

pub fn build_prompt(headers: &[String]) -> Result<String, InferenceError> {
    let encoded = serde_json::to_string(headers).map_err(InferenceError::Prompt)?;
    Ok(format!("Analyze these headers: {encoded}"))
}

pub struct SchemaInferenceService<P> {
    provider: P,
}

impl<P> SchemaInferenceService<P>
where
    P: ReasoningProvider,
{
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Returns the reconciled mappings for `raw_headers`.
    ///
    /// When no header survives normalization the provider is never called and
    /// the result is empty.
    pub fn infer<S>(&self, raw_headers: &[S]) -> Result<Vec<Mapping>, InferenceError>
    where
        S: AsRef<str>,
    {
        let headers = normalize_headers(raw_headers);
        if headers.is_empty() {
            info!("No custom headers left after normalization; skipping provider call");
            return Ok(Vec::new());
        }
        info!(
            "Analyzing {} header(s) with provider '{}'",
            headers.len(),
            self.provider.name()
        );

        let prompt = build_prompt(&headers)?;
        let content = self
            .provider
            .complete(CONSOLIDATION_INSTRUCTIONS, &prompt)
            .map_err(|source| InferenceError::Provider {
                provider: self.provider.name().to_string(),
                source,
            })?
            .filter(|content| !content.is_empty())
            .unwrap_or_else(|| "{}".to_string());

        let payload: serde_json::Value =
            serde_json::from_str(&content).map_err(InferenceError::MalformedResponse)?;
        let mappings = reconcile_mappings(&payload, &headers);
        if mappings.is_empty() {
            warn!("Provider proposals yielded no usable mappings");
        } else {
            info!("Reconciled {} mapping(s)", mappings.len());
        }
        Ok(mappings)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::cell::{Cell, RefCell};

    use crate::provider::{ProviderError, ReasoningProvider};

    /// Provider double that records prompts and returns a canned answer.
    pub struct StubProvider {
        pub response: Result<Option<String>, String>,
        pub calls: Cell<usize>,
        pub prompts: RefCell<Vec<String>>,
    }

    impl StubProvider {
        pub fn answering(content: &str) -> Self {
            Self {
                response: Ok(Some(content.to_string())),
                calls: Cell::new(0),
                prompts: RefCell::new(Vec::new()),
            }
        }

        pub fn silent() -> Self {
            Self {
                response: Ok(None),
                calls: Cell::new(0),
                prompts: RefCell::new(Vec::new()),
            }
        }

        pub fn failing(message: &str) -> Self {
            Self {
                response: Err(message.to_string()),
                calls: Cell::new(0),
                prompts: RefCell::new(Vec::new()),
            }
        }
    }

    impl ReasoningProvider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }

        fn complete(
            &self,
            _instructions: &str,
            prompt: &str,
        ) -> Result<Option<String>, ProviderError> {
            self.calls.set(self.calls.get() + 1);
            self.prompts.borrow_mut().push(prompt.to_string());
            self.response.clone().map_err(ProviderError::Network)
        }
    }
}
