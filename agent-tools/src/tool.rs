//! Contracts implemented by concrete tools.

use agent_primitives::{CapabilityMap, ResultEnvelope, ToolKind};
use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// Result alias for tool construction and declaration.
pub type ToolResult<T> = Result<T, ToolError>;

/// Executes the functions of a constructed tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Invokes `function` with bound `arguments`.
    ///
    /// Failures are reported through the returned envelope rather than a
    /// Rust error so callers handle every outcome uniformly.
    async fn invoke(&self, function: &str, arguments: Map<String, Value>) -> ResultEnvelope;
}

/// Static description and constructor of a tool type.
///
/// The capability table is a pure function of the type: it is built without
/// an instance and must be identical on every call.
pub trait ToolType: Tool + Sized + 'static {
    /// Kind under which the tool registers.
    const KIND: &'static str;

    /// Arguments accepted by [`ToolType::construct`].
    type Args;

    /// Constructs an instance.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError`] when the instance cannot be created.
    fn construct(args: Self::Args) -> ToolResult<Self>;

    /// Returns the full dialect-tagged capability table of the type.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError`] when the declarations are invalid.
    fn capabilities() -> ToolResult<CapabilityMap>;

    /// Returns [`ToolType::KIND`] as a validated identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Declaration`] if the constant is not a valid kind.
    fn kind() -> ToolResult<ToolKind> {
        Ok(ToolKind::new(Self::KIND)?)
    }
}

/// Errors raised by tool types while constructing or declaring themselves.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The instance could not be constructed.
    #[error("tool construction failed: {reason}")]
    Construction {
        /// Human-readable reason returned by the tool type.
        reason: String,
    },

    /// A capability declaration was invalid.
    #[error("invalid capability declaration: {source}")]
    Declaration {
        /// Underlying validation error.
        #[from]
        source: agent_primitives::Error,
    },
}

impl ToolError {
    /// Creates a construction error from the supplied reason.
    #[must_use]
    pub fn construction(reason: impl Into<String>) -> Self {
        Self::Construction {
            reason: reason.into(),
        }
    }
}
