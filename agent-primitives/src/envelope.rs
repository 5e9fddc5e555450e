//! Result envelope returned by every capability invocation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Uniform success/error shape produced by tool implementations.
///
/// Exactly one of `output` and `error_message` is meaningful, selected by
/// [`ResultEnvelope::succeeded`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<Map<String, Value>>,
}

impl ResultEnvelope {
    /// Creates a successful envelope carrying `output`.
    #[must_use]
    pub fn success(output: impl Into<Value>) -> Self {
        Self {
            succeeded: true,
            output: Some(output.into()),
            error_message: None,
            metadata: None,
        }
    }

    /// Creates a failed envelope carrying `message`.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            output: None,
            error_message: Some(message.into()),
            metadata: None,
        }
    }

    /// Attaches a metadata entry, creating the metadata map on first use.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    /// Returns `true` when the invocation succeeded.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.succeeded
    }

    /// Returns the output of a successful invocation.
    #[must_use]
    pub fn output(&self) -> Option<&Value> {
        if self.succeeded {
            self.output.as_ref()
        } else {
            None
        }
    }

    /// Returns the error message of a failed invocation.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        if self.succeeded {
            None
        } else {
            self.error_message.as_deref()
        }
    }

    /// Returns the optional metadata map.
    #[must_use]
    pub fn metadata(&self) -> Option<&Map<String, Value>> {
        self.metadata.as_ref()
    }
}
