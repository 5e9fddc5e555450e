//! Dispatch glue between parsed invocations and registered tools.
//!
//! An [`InvocationDispatcher`] resolves each invocation through the
//! [`CapabilityRegistry`](agent_tools::CapabilityRegistry), checks required
//! parameters, and returns the tool's result envelope.

#![warn(missing_docs, clippy::pedantic)]

mod config;
mod dispatcher;

pub use config::{DispatchConfig, ExecutionStrategy};
pub use dispatcher::{
    DispatchError, DispatchRecord, DispatchResult, InvocationDispatcher, TurnOutcome,
};
