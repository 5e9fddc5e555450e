//! Dispatcher configuration.

use serde::{Deserialize, Serialize};

/// How the invocations of one turn are executed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    /// One after another, in document order.
    #[default]
    Sequential,
    /// Concurrently; results are still reported in document order.
    Parallel,
}

/// Dispatcher configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    strategy: ExecutionStrategy,
    enforce_required: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            strategy: ExecutionStrategy::Sequential,
            enforce_required: true,
        }
    }
}

impl DispatchConfig {
    /// Sets the execution strategy.
    #[must_use]
    pub const fn with_strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Enables or disables the required-parameter check.
    #[must_use]
    pub const fn with_enforce_required(mut self, enforce: bool) -> Self {
        self.enforce_required = enforce;
        self
    }

    /// Returns the execution strategy.
    #[must_use]
    pub const fn strategy(self) -> ExecutionStrategy {
        self.strategy
    }

    /// Returns `true` when missing required parameters block dispatch.
    #[must_use]
    pub const fn enforce_required(self) -> bool {
        self.enforce_required
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_with_defaults() {
        let config: DispatchConfig =
            serde_json::from_str(r#"{"strategy": "parallel"}"#).expect("deserialize");
        assert_eq!(config.strategy(), ExecutionStrategy::Parallel);
        assert!(config.enforce_required());
    }
}
