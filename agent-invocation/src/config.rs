//! Grammar configuration.

use agent_primitives::inline::{
    DEFAULT_CONTAINER_TAG, DEFAULT_INVOKE_TAG, DEFAULT_PARAMETER_TAG, TagNames,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias for parser construction.
pub type ParserResult<T> = Result<T, ParserError>;

/// Tag names of the inline grammar.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    container_tag: String,
    invoke_tag: String,
    parameter_tag: String,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            container_tag: DEFAULT_CONTAINER_TAG.to_owned(),
            invoke_tag: DEFAULT_INVOKE_TAG.to_owned(),
            parameter_tag: DEFAULT_PARAMETER_TAG.to_owned(),
        }
    }
}

impl ParserConfig {
    /// Sets the container tag.
    #[must_use]
    pub fn with_container_tag(mut self, tag: impl Into<String>) -> Self {
        self.container_tag = tag.into();
        self
    }

    /// Sets the invoke block tag.
    #[must_use]
    pub fn with_invoke_tag(mut self, tag: impl Into<String>) -> Self {
        self.invoke_tag = tag.into();
        self
    }

    /// Sets the parameter block tag.
    #[must_use]
    pub fn with_parameter_tag(mut self, tag: impl Into<String>) -> Self {
        self.parameter_tag = tag.into();
        self
    }

    /// Borrowed view of the three tag names.
    #[must_use]
    pub fn tags(&self) -> TagNames<'_> {
        TagNames {
            container: &self.container_tag,
            invoke: &self.invoke_tag,
            parameter: &self.parameter_tag,
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ParserError::InvalidConfig`] when a tag is empty, contains
    /// characters outside ASCII alphanumerics, dash, underscore, dot, or
    /// colon, or when two levels share a tag.
    pub fn validate(&self) -> ParserResult<()> {
        for tag in [&self.container_tag, &self.invoke_tag, &self.parameter_tag] {
            if tag.is_empty() {
                return Err(ParserError::invalid_config("tag names cannot be empty"));
            }
            if !tag
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
            {
                return Err(ParserError::invalid_config(format!(
                    "tag `{tag}` must contain ASCII alphanumeric, dash, underscore, dot, or colon"
                )));
            }
        }
        if self.container_tag == self.invoke_tag
            || self.container_tag == self.parameter_tag
            || self.invoke_tag == self.parameter_tag
        {
            return Err(ParserError::invalid_config(
                "container, invoke, and parameter tags must differ",
            ));
        }
        Ok(())
    }
}

/// Errors raised while building a parser.
#[derive(Debug, Error)]
pub enum ParserError {
    /// The grammar configuration was invalid.
    #[error("invalid parser configuration: {reason}")]
    InvalidConfig {
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// A tag pattern failed to compile.
    #[error("failed to compile tag pattern: {source}")]
    Pattern {
        /// Source error from the regex engine.
        #[from]
        source: regex::Error,
    },
}

impl ParserError {
    fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}
