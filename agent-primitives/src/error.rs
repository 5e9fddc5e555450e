//! Shared error definitions for agent primitives.

use thiserror::Error;

use crate::Dialect;

/// Result alias used throughout the agent runtime.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while constructing primitive types.
#[derive(Debug, Error)]
pub enum Error {
    /// The provided tool kind failed validation.
    #[error("invalid tool kind `{kind}`: {reason}")]
    InvalidToolKind {
        /// The offending identifier string.
        kind: String,
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// Capability schema failed validation.
    #[error("invalid capability: {reason}")]
    InvalidCapability {
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// A function declared the same dialect more than once.
    #[error("function `{function}` declares the {dialect} dialect more than once")]
    DuplicateDialect {
        /// Function carrying the duplicate declaration.
        function: String,
        /// Dialect that was declared twice.
        dialect: Dialect,
    },
}

impl Error {
    pub(crate) fn invalid_capability(reason: impl Into<String>) -> Self {
        Self::InvalidCapability {
            reason: reason.into(),
        }
    }
}
