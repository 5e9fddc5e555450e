//! Core shared types for agent tool calling.
//!
//! Tools advertise their callable operations through [`CapabilityMap`]s built
//! from one of two schema dialects: a JSON-Schema-like structured dialect for
//! native function calling, and a tag-based inline dialect that models embed
//! in free-form text. Every invocation answers with a [`ResultEnvelope`].

#![warn(missing_docs, clippy::pedantic)]

mod capability;
mod envelope;
mod error;
mod ids;
pub mod inline;

/// Capability schemas, entries, and the per-tool capability table.
pub use capability::{
    CapabilityEntry, CapabilityMap, CapabilityMapBuilder, CapabilitySchema, Dialect,
    InlineParameter, InlineSchema, InlineSchemaBuilder, ObjectParameters, PropertySpec,
    PropertyType, StructuredSchema, StructuredSchemaBuilder,
};
/// Uniform result shape returned by every capability invocation.
pub use envelope::ResultEnvelope;
/// Error type and result alias shared across the workspace.
pub use error::{Error, Result};
/// Identifier naming a tool type within a registry.
pub use ids::ToolKind;
