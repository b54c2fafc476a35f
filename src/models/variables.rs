use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Error decoding a caller-supplied variable map
#[derive(Debug, thiserror::Error)]
pub enum VariableError {
    #[error("Invalid variable map: {0}")]
    Invalid(#[from] serde_json::Error),

    #[error("Invalid base64 variable map: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// How a variable is consumed by the substitution engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableKind {
    /// Interpolated into `{{key}}` text markup
    String,
    /// Image source for placeholder slots
    Url,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    #[serde(rename = "type")]
    pub kind: VariableKind,
    pub value: String,
}

impl Variable {
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            kind: VariableKind::String,
            value: value.into(),
        }
    }

    pub fn url(value: impl Into<String>) -> Self {
        Self {
            kind: VariableKind::Url,
            value: value.into(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.value.trim().is_empty()
    }
}

/// Runtime values for a single render call, keyed by variable name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableMap(HashMap<String, Variable>);

impl VariableMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a `{ key: { type, value } }` JSON value
    pub fn from_value(value: Value) -> Result<Self, VariableError> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn from_json(json: &str) -> Result<Self, VariableError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Decode a base64-encoded JSON variable map
    pub fn from_base64(encoded: &str) -> Result<Self, VariableError> {
        let bytes = base64::engine::general_purpose::STANDARD.decode(encoded.trim())?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Accept a map given inline, as a JSON string, as base64, or absent
    pub fn decode(value: Value) -> Result<Self, VariableError> {
        match value {
            Value::Null => Ok(Self::new()),
            Value::String(s) if s.trim_start().starts_with('{') => Self::from_json(&s),
            Value::String(s) => Self::from_base64(&s),
            other => Self::from_value(other),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, variable: Variable) {
        self.0.insert(key.into(), variable);
    }

    pub fn with(mut self, key: impl Into<String>, variable: Variable) -> Self {
        self.insert(key, variable);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Variable> {
        self.0.get(key)
    }

    /// Look up a `url` variable by name
    pub fn url(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .filter(|v| v.kind == VariableKind::Url)
            .map(|v| v.value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}
