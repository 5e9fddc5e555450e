//! Structured logging for tool-calling agents.
//!
//! Every crate in the workspace emits [`tracing`] events. This crate installs
//! the `fmt` subscriber that renders them, filtered through `RUST_LOG` when it
//! is set and through [`TelemetryConfig::default_directive`] otherwise.

#![warn(missing_docs, clippy::pedantic)]

use anyhow::{Context, anyhow};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVE: &str = "info";

/// Subscriber settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    default_directive: String,
    with_target: bool,
    ansi: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            default_directive: DEFAULT_DIRECTIVE.to_owned(),
            with_target: true,
            ansi: true,
        }
    }
}

impl TelemetryConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the filter directive used when `RUST_LOG` is absent.
    #[must_use]
    pub fn with_default_directive(mut self, directive: impl Into<String>) -> Self {
        self.default_directive = directive.into();
        self
    }

    /// Controls whether event targets are printed.
    #[must_use]
    pub const fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    /// Controls ANSI colouring.
    #[must_use]
    pub const fn with_ansi(mut self, enabled: bool) -> Self {
        self.ansi = enabled;
        self
    }

    /// Filter directive used when `RUST_LOG` is absent.
    #[must_use]
    pub fn default_directive(&self) -> &str {
        &self.default_directive
    }

    /// Whether event targets are printed.
    #[must_use]
    pub const fn target_enabled(&self) -> bool {
        self.with_target
    }

    /// Whether output is coloured.
    #[must_use]
    pub const fn ansi(&self) -> bool {
        self.ansi
    }

    /// Builds the filter the subscriber is installed with.
    ///
    /// # Errors
    ///
    /// Returns an error when `RUST_LOG` is unset and the default directive
    /// does not parse.
    pub fn env_filter(&self) -> anyhow::Result<EnvFilter> {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.default_directive))
            .with_context(|| format!("invalid log directive `{}`", self.default_directive))
    }
}

/// Installs the global `fmt` subscriber.
///
/// # Errors
///
/// Returns an error when the filter directive is invalid or a global
/// subscriber is already installed.
pub fn init(config: &TelemetryConfig) -> anyhow::Result<()> {
    let filter = config.env_filter()?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target)
        .with_ansi(config.ansi)
        .try_init()
        .map_err(|err| anyhow!("failed to install tracing subscriber: {err}"))?;
    tracing::debug!(directive = %config.default_directive, "telemetry initialised");
    Ok(())
}
