//! Parsed invocation values.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;

/// One request to execute a capability with bound parameter values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParsedInvocation {
    name: String,
    parameters: Map<String, Value>,
    raw_source: String,
}

impl ParsedInvocation {
    /// Creates an invocation from its parts.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        parameters: Map<String, Value>,
        raw_source: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            parameters,
            raw_source: raw_source.into(),
        }
    }

    /// Builds an invocation from a native function-call payload.
    ///
    /// `arguments` may be a JSON object, a string holding a JSON object, or
    /// `null` for a call without arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ArgumentsError`] when the arguments are not valid JSON or do
    /// not describe an object.
    pub fn from_function_call(
        name: impl Into<String>,
        arguments: &Value,
    ) -> Result<Self, ArgumentsError> {
        let name = name.into();
        let parameters = match arguments {
            Value::Null => Map::new(),
            Value::Object(map) => map.clone(),
            Value::String(text) if text.trim().is_empty() => Map::new(),
            Value::String(text) => match serde_json::from_str::<Value>(text) {
                Ok(Value::Object(map)) => map,
                Ok(other) => {
                    return Err(ArgumentsError::NotAnObject {
                        name,
                        found: kind_label(&other),
                    });
                }
                Err(source) => return Err(ArgumentsError::InvalidJson { name, source }),
            },
            other => {
                return Err(ArgumentsError::NotAnObject {
                    name,
                    found: kind_label(other),
                });
            }
        };
        let raw_source = json!({ "name": name, "arguments": parameters }).to_string();
        Ok(Self {
            name,
            parameters,
            raw_source,
        })
    }

    /// Target tool tag or function name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Coerced parameter values keyed by name.
    #[must_use]
    pub fn parameters(&self) -> &Map<String, Value> {
        &self.parameters
    }

    /// Text the invocation was parsed from.
    #[must_use]
    pub fn raw_source(&self) -> &str {
        &self.raw_source
    }
}

/// Returns `true` when the invocation names a target and carries its source.
#[must_use]
pub fn validate_invocation(invocation: &ParsedInvocation) -> bool {
    !invocation.name.is_empty() && !invocation.raw_source.is_empty()
}

/// Result of parsing one block of generated text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParseOutcome {
    overall_ok: bool,
    invocations: Vec<ParsedInvocation>,
    errors: Vec<String>,
    leftover_text: String,
}

impl ParseOutcome {
    pub(crate) fn new(
        invocations: Vec<ParsedInvocation>,
        errors: Vec<String>,
        leftover_text: String,
    ) -> Self {
        Self {
            overall_ok: errors.is_empty(),
            invocations,
            errors,
            leftover_text,
        }
    }

    /// `false` when at least one invoke block failed to parse.
    #[must_use]
    pub const fn overall_ok(&self) -> bool {
        self.overall_ok
    }

    /// Parsed invocations in document order.
    #[must_use]
    pub fn invocations(&self) -> &[ParsedInvocation] {
        &self.invocations
    }

    /// Diagnostics for invoke blocks that failed to parse.
    #[must_use]
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Input text with every container block removed.
    #[must_use]
    pub fn leftover_text(&self) -> &str {
        &self.leftover_text
    }

    /// Consumes the outcome, returning the invocations.
    #[must_use]
    pub fn into_invocations(self) -> Vec<ParsedInvocation> {
        self.invocations
    }
}

/// Errors converting native function-call arguments.
#[derive(Debug, Error)]
pub enum ArgumentsError {
    /// The arguments string was not valid JSON.
    #[error("arguments of `{name}` are not valid JSON: {source}")]
    InvalidJson {
        /// Function the arguments belong to.
        name: String,
        /// Source parsing error.
        source: serde_json::Error,
    },

    /// The arguments were valid JSON but not an object.
    #[error("arguments of `{name}` must be a JSON object, got {found}")]
    NotAnObject {
        /// Function the arguments belong to.
        name: String,
        /// JSON type that was found instead.
        found: &'static str,
    },
}

fn kind_label(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
