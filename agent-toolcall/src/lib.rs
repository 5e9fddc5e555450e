//! Tool-calling toolkit facade.
//!
//! Depend on this crate via `cargo add agent-toolcall`. It bundles the
//! workspace crates behind feature flags so downstream users only compile the
//! layers they need: schemas always, the registry, the inline parser and the
//! dispatcher on demand.

#![warn(missing_docs, clippy::pedantic)]

/// Re-export shared primitives for convenience.
pub use agent_primitives as primitives;

/// Capability registry (enabled by `tools` feature).
#[cfg(feature = "tools")]
pub use agent_tools as tools;

/// Inline invocation parser (enabled by `invocation` feature).
#[cfg(feature = "invocation")]
pub use agent_invocation as invocation;

/// Invocation dispatch (enabled by `dispatch` feature).
#[cfg(feature = "dispatch")]
pub use agent_dispatch as dispatch;

/// Logging setup (enabled by `telemetry` feature).
#[cfg(feature = "telemetry")]
pub use agent_telemetry as telemetry;
