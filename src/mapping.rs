//! Coercion and reconciliation of untrusted mapping proposals.
//!
//! The reasoning provider answers with JSON of unknown shape. Each proposal is
//! decoded field by field from a [`serde_json::Value`]; anything that does not
//! survive validation is dropped without surfacing an error. Proposals that
//! land on the same normalized target field are merged so the result always
//! has unique targets, allowed types and grounded source fields.

use std::{collections::HashMap, fmt, str::FromStr, sync::LazyLock};

use itertools::Itertools;
use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::headers::{HeaderVocabulary, value_to_text};

static IDENTIFIER_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[^a-z0-9]+").expect("valid separator pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    String,
    Boolean,
    Integer,
    Date,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Boolean => "boolean",
            DataType::Integer => "integer",
            DataType::Date => "date",
        }
    }

    pub fn variants() -> &'static [&'static str] {
        &["string", "boolean", "integer", "date"]
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "string" => Ok(DataType::String),
            "boolean" => Ok(DataType::Boolean),
            "integer" => Ok(DataType::Integer),
            "date" => Ok(DataType::Date),
            other => Err(format!(
                "Unsupported data type '{other}'. Expected one of: {}",
                DataType::variants().join(", ")
            )),
        }
    }
}

/// A validated, grounded mapping from legacy headers to one target field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    pub target_field: String,
    pub data_type: DataType,
    pub source_fields: Vec<String>,
    #[serde(default)]
    pub reasoning: String,
}

impl Mapping {
    /// The source column that drives code generation.
    pub fn primary_source(&self) -> Option<&str> {
        self.source_fields.first().map(String::as_str)
    }

    fn absorb(&mut self, other: Mapping) {
        for field in other.source_fields {
            if !self.source_fields.contains(&field) {
                self.source_fields.push(field);
            }
        }
        if self.reasoning.is_empty() {
            self.reasoning = other.reasoning;
        }
    }
}

/// Lowercases `input` and collapses every run of non-alphanumeric characters
/// into a single underscore, stripping separators at either end.
pub fn normalize_identifier(input: &str) -> String {
    let lowered = input.trim().to_lowercase();
    IDENTIFIER_SEPARATORS
        .replace_all(&lowered, "_")
        .trim_matches('_')
        .to_string()
}

/// Validates a single proposal against the header vocabulary.
///
/// Returns `None` when the target is empty, the type is not allowed or no
/// source field resolves to a known header.
pub fn coerce_candidate(candidate: &Value, vocabulary: &HeaderVocabulary) -> Option<Mapping> {
    let target_field = candidate
        .get("target_field")
        .and_then(Value::as_str)
        .map(normalize_identifier)
        .filter(|name| !name.is_empty())?;

    let data_type = candidate
        .get("data_type")
        .and_then(Value::as_str)
        .and_then(|raw| DataType::from_str(raw).ok())?;

    let source_fields = candidate
        .get("source_fields")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(value_to_text)
                .filter_map(|item| vocabulary.resolve(&item).map(str::to_string))
                .unique()
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    if source_fields.is_empty() {
        return None;
    }

    let reasoning = candidate
        .get("reasoning")
        .and_then(Value::as_str)
        .map(|text| text.trim().to_string())
        .unwrap_or_default();

    Some(Mapping {
        target_field,
        data_type,
        source_fields,
        reasoning,
    })
}

/// Turns a provider payload into a deduplicated list of mappings.
///
/// A payload without a `mappings` array yields an empty list. Proposals that
/// share a normalized target are merged: the first accepted proposal keeps its
/// type and reasoning, source fields are unioned in first-appearance order.
pub fn reconcile_mappings<S>(payload: &Value, headers: &[S]) -> Vec<Mapping>
where
    S: AsRef<str>,
{
    let Some(candidates) = payload.get("mappings").and_then(Value::as_array) else {
        debug!("Provider payload has no 'mappings' array; nothing to reconcile");
        return Vec::new();
    };

    let vocabulary = HeaderVocabulary::new(headers);
    let mut reconciled: Vec<Mapping> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for (idx, candidate) in candidates.iter().enumerate() {
        let Some(mapping) = coerce_candidate(candidate, &vocabulary) else {
            debug!("Rejected mapping proposal #{idx}: {candidate}");
            continue;
        };
        match positions.get(&mapping.target_field) {
            Some(&position) => {
                debug!(
                    "Merging proposal #{idx} into existing target '{}'",
                    mapping.target_field
                );
                reconciled[position].absorb(mapping);
            }
            None => {
                positions.insert(mapping.target_field.clone(), reconciled.len());
                reconciled.push(mapping);
            }
        }
    }

    reconciled
}
