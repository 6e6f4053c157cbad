//! Header normalization and the case-insensitive header vocabulary.
//!
//! Raw headers arrive either from the first row of a CSV file or from an
//! untrusted JSON request body. Both paths funnel through
//! [`normalize_headers`], which trims values, drops blanks and removes the
//! standard system fields listed in [`IGNORED_HEADERS`]. The surviving list
//! becomes the authoritative vocabulary that proposed source fields are
//! resolved against.

use std::collections::HashMap;

use itertools::Itertools;
use serde_json::Value;

/// Standard fields that never take part in consolidation, compared lowercase.
pub const IGNORED_HEADERS: &[&str] = &[
    "first name",
    "last name",
    "email",
    "phone",
    "mobile",
    "created at",
    "updated at",
    "id",
];

pub fn is_ignored_header(header: &str) -> bool {
    let lowered = header.to_lowercase();
    IGNORED_HEADERS.contains(&lowered.as_str())
}

/// Coerces a JSON value to header text. `null`, arrays and objects carry no
/// usable name and become the empty string.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => String::new(),
    }
}

/// Coerces a request header to text. Falsy scalars (`null`, `false`, zero)
/// are empty, arrays render as their comma-joined elements and objects carry
/// no usable name.
pub fn header_text(value: &Value) -> String {
    match value {
        Value::Null | Value::Bool(false) => String::new(),
        Value::Number(number) if number.as_f64() == Some(0.0) => String::new(),
        Value::Array(items) => items.iter().map(array_element_text).join(","),
        Value::Object(_) => String::new(),
        other => scalar_text(other),
    }
}

fn array_element_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Array(items) => items.iter().map(array_element_text).join(","),
        Value::Object(_) => String::new(),
        other => scalar_text(other),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => match (number.as_i64(), number.as_u64(), number.as_f64()) {
            (Some(int), _, _) => int.to_string(),
            (_, Some(uint), _) => uint.to_string(),
            (_, _, Some(float)) => float.to_string(),
            _ => number.to_string(),
        },
        Value::Bool(flag) => flag.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => String::new(),
    }
}

/// Trims every header, drops empty entries and ignored system fields.
///
/// Order is preserved and duplicates pass through untouched.
pub fn normalize_headers<S>(headers: &[S]) -> Vec<String>
where
    S: AsRef<str>,
{
    headers
        .iter()
        .map(|header| header.as_ref().trim())
        .filter(|header| !header.is_empty())
        .filter(|header| !is_ignored_header(header))
        .map(|header| header.to_string())
        .collect()
}

/// Same as [`normalize_headers`] for headers taken from a JSON document.
pub fn normalize_header_values(values: &[Value]) -> Vec<String> {
    let texts = values.iter().map(header_text).collect::<Vec<_>>();
    normalize_headers(&texts)
}

/// Lowercase lookup from header text to its canonical (first-seen) casing.
#[derive(Debug, Clone, Default)]
pub struct HeaderVocabulary {
    canonical: HashMap<String, String>,
}

impl HeaderVocabulary {
    pub fn new<S>(headers: &[S]) -> Self
    where
        S: AsRef<str>,
    {
        let mut canonical = HashMap::with_capacity(headers.len());
        for header in headers {
            let header = header.as_ref();
            canonical
                .entry(header.to_lowercase())
                .or_insert_with(|| header.to_string());
        }
        Self { canonical }
    }

    pub fn resolve(&self, candidate: &str) -> Option<&str> {
        let key = candidate.trim().to_lowercase();
        if key.is_empty() {
            return None;
        }
        self.canonical.get(&key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.canonical.len()
    }

    pub fn is_empty(&self) -> bool {
        self.canonical.is_empty()
    }
}
