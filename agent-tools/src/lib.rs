//! Tool contracts and the capability registry.
//!
//! Tool types implement [`tool::ToolType`] to declare their capabilities
//! statically and [`tool::Tool`] to execute them. The
//! [`registry::CapabilityRegistry`] owns constructed instances and indexes
//! their capabilities by tool kind, structured function name, and inline tag.

#![warn(missing_docs, clippy::pedantic)]

pub mod registry;
pub mod tool;

pub use registry::{
    CapabilityRegistry, CollisionPolicy, RegistrationError, RegistrationResult, RegistryConfig,
    RegistryStats, ResolvedCapability, ToolRegistration,
};
pub use tool::{Tool, ToolError, ToolResult, ToolType};
