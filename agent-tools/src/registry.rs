//! Runtime registry for tool instances and their capability schemas.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use agent_primitives::{
    CapabilityEntry, CapabilityMap, Dialect, InlineSchema, StructuredSchema, ToolKind,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::tool::{Tool, ToolError, ToolType};

/// Result alias for registration.
pub type RegistrationResult<T> = Result<T, RegistrationError>;

/// How the registry reacts when two tool kinds claim the same inline tag or
/// structured function name.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// Log a warning and keep the earliest registration for lookups.
    #[default]
    Warn,
    /// Fail the later registration with [`RegistrationError::Collision`].
    Reject,
}

/// Registry configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    collision_policy: CollisionPolicy,
}

impl RegistryConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the collision policy.
    #[must_use]
    pub const fn with_collision_policy(mut self, policy: CollisionPolicy) -> Self {
        self.collision_policy = policy;
        self
    }

    /// Returns the collision policy.
    #[must_use]
    pub const fn collision_policy(self) -> CollisionPolicy {
        self.collision_policy
    }
}

/// A registered tool: its instance and the capabilities it exposes.
#[derive(Clone)]
pub struct ToolRegistration {
    kind: ToolKind,
    instance: Arc<dyn Tool>,
    capabilities: CapabilityMap,
    allowed_functions: Option<BTreeSet<String>>,
}

impl fmt::Debug for ToolRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistration")
            .field("kind", &self.kind)
            .field("functions", &self.capabilities.functions().collect::<Vec<_>>())
            .field("allowed_functions", &self.allowed_functions)
            .finish_non_exhaustive()
    }
}

impl ToolRegistration {
    /// Registered tool kind.
    #[must_use]
    pub fn kind(&self) -> &ToolKind {
        &self.kind
    }

    /// Handle to the constructed instance.
    #[must_use]
    pub fn instance(&self) -> &Arc<dyn Tool> {
        &self.instance
    }

    /// Retained capabilities, after filtering.
    #[must_use]
    pub fn capabilities(&self) -> &CapabilityMap {
        &self.capabilities
    }

    /// Function filter supplied at registration, if any.
    #[must_use]
    pub fn allowed_functions(&self) -> Option<&BTreeSet<String>> {
        self.allowed_functions.as_ref()
    }

    fn inline_schemas(&self) -> impl Iterator<Item = &InlineSchema> {
        self.capabilities
            .entries()
            .filter_map(CapabilityEntry::as_inline)
    }

    fn structured_schemas(&self) -> impl Iterator<Item = &StructuredSchema> {
        self.capabilities
            .entries()
            .filter_map(CapabilityEntry::as_structured)
    }
}

/// Capability resolved for dispatch.
#[derive(Clone)]
pub struct ResolvedCapability {
    entry: CapabilityEntry,
    tool: Arc<dyn Tool>,
}

impl fmt::Debug for ResolvedCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedCapability")
            .field("entry", &self.entry)
            .finish_non_exhaustive()
    }
}

impl ResolvedCapability {
    fn new(registration: &ToolRegistration, entry: &CapabilityEntry) -> Self {
        Self {
            entry: entry.clone(),
            tool: Arc::clone(&registration.instance),
        }
    }

    /// Kind of the owning tool.
    #[must_use]
    pub fn kind(&self) -> &ToolKind {
        self.entry.owner()
    }

    /// Function to invoke on the tool.
    #[must_use]
    pub fn function(&self) -> &str {
        self.entry.function()
    }

    /// Matched capability entry.
    #[must_use]
    pub fn entry(&self) -> &CapabilityEntry {
        &self.entry
    }

    /// Tool instance that serves the capability.
    #[must_use]
    pub fn tool(&self) -> &Arc<dyn Tool> {
        &self.tool
    }

    /// Consumes the resolution, returning the tool instance.
    #[must_use]
    pub fn into_tool(self) -> Arc<dyn Tool> {
        self.tool
    }
}

/// Counts derived from the current registrations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    /// Registered tool kinds.
    pub total_tools: usize,
    /// Retained functions across all tools.
    pub total_functions: usize,
    /// Tools with at least one inline capability.
    pub tools_with_inline: usize,
    /// Tools with at least one structured capability.
    pub tools_with_structured: usize,
}

#[derive(Default)]
struct Inner {
    registrations: Vec<ToolRegistration>,
    // Positions of registrations carrying inline capabilities, in
    // registration order.
    inline_index: Vec<usize>,
}

impl Inner {
    fn reindex(&mut self) {
        self.inline_index = self
            .registrations
            .iter()
            .enumerate()
            .filter(|(_, registration)| registration.capabilities.has_dialect(Dialect::Inline))
            .map(|(position, _)| position)
            .collect();
    }

    fn find(&self, kind: &str) -> Option<&ToolRegistration> {
        self.registrations
            .iter()
            .find(|registration| registration.kind.as_str() == kind)
    }

    fn inline_registrations(&self) -> impl Iterator<Item = &ToolRegistration> {
        self.inline_index
            .iter()
            .map(|&position| &self.registrations[position])
    }
}

/// Registry owning tool instances keyed by kind.
///
/// Registration order is preserved. When different kinds collide on an
/// inline tag or structured function name, every lookup resolves to the
/// earliest registration. Re-registering an existing kind replaces it in
/// place.
#[derive(Default)]
pub struct CapabilityRegistry {
    config: RegistryConfig,
    inner: RwLock<Inner>,
}

impl fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.read();
        let kinds: Vec<_> = inner
            .registrations
            .iter()
            .map(|registration| registration.kind.as_str())
            .collect();
        f.debug_struct("CapabilityRegistry")
            .field("config", &self.config)
            .field("registered", &kinds)
            .finish()
    }
}

impl CapabilityRegistry {
    /// Creates an empty registry with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty registry with the supplied configuration.
    #[must_use]
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            config,
            inner: RwLock::default(),
        }
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> RegistryConfig {
        self.config
    }

    // Mutations replace whole values, so a poisoned lock still guards a
    // consistent index.
    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Constructs `T` from `args` and registers every capability it declares.
    ///
    /// # Errors
    ///
    /// See [`CapabilityRegistry::register_instance`]; additionally returns
    /// [`RegistrationError::Construction`] or
    /// [`RegistrationError::Declaration`] when the tool type fails.
    pub fn register<T: ToolType>(&self, args: T::Args) -> RegistrationResult<()> {
        self.register_with::<T>(args, None)
    }

    /// Constructs `T` and registers only the functions named in `allowed`.
    ///
    /// Names the tool does not declare are ignored. An empty list disables
    /// filtering.
    ///
    /// # Errors
    ///
    /// Same as [`CapabilityRegistry::register`].
    pub fn register_filtered<T, I, S>(&self, args: T::Args, allowed: I) -> RegistrationResult<()>
    where
        T: ToolType,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let allowed = allowed.into_iter().map(Into::into).collect();
        self.register_with::<T>(args, Some(allowed))
    }

    fn register_with<T: ToolType>(
        &self,
        args: T::Args,
        allowed: Option<BTreeSet<String>>,
    ) -> RegistrationResult<()> {
        let kind = T::kind().map_err(|source| RegistrationError::InvalidKind {
            kind: T::KIND.to_owned(),
            source,
        })?;
        let instance = T::construct(args).map_err(|source| RegistrationError::Construction {
            kind: kind.clone(),
            source,
        })?;
        let capabilities = T::capabilities().map_err(|source| RegistrationError::Declaration {
            kind: kind.clone(),
            source,
        })?;
        self.register_instance(kind, Arc::new(instance), capabilities, allowed)
    }

    /// Registers an already constructed instance with its capability table.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::MissingSchemas`] when the table is empty,
    /// [`RegistrationError::OwnerMismatch`] when it was built for another
    /// kind, [`RegistrationError::Schema`] when a retained capability is
    /// invalid, and [`RegistrationError::Collision`] under
    /// [`CollisionPolicy::Reject`].
    pub fn register_instance(
        &self,
        kind: ToolKind,
        instance: Arc<dyn Tool>,
        mut capabilities: CapabilityMap,
        allowed: Option<BTreeSet<String>>,
    ) -> RegistrationResult<()> {
        if capabilities.is_empty() {
            return Err(RegistrationError::MissingSchemas { kind });
        }
        if capabilities.owner() != &kind {
            return Err(RegistrationError::OwnerMismatch {
                owner: capabilities.owner().clone(),
                kind,
            });
        }

        let allowed = allowed.filter(|names| !names.is_empty());
        if let Some(names) = &allowed {
            capabilities.retain_functions(names);
        }
        capabilities
            .validate()
            .map_err(|source| RegistrationError::Schema {
                kind: kind.clone(),
                source,
            })?;

        let mut inner = self.write();
        self.check_collisions(&inner, &kind, &capabilities)?;

        let functions = capabilities.len();
        let registration = ToolRegistration {
            kind: kind.clone(),
            instance,
            capabilities,
            allowed_functions: allowed,
        };
        if let Some(existing) = inner
            .registrations
            .iter_mut()
            .find(|registration| registration.kind == kind)
        {
            debug!(%kind, "replacing existing tool registration");
            *existing = registration;
        } else {
            inner.registrations.push(registration);
        }
        inner.reindex();

        info!(%kind, functions, "tool registered");
        Ok(())
    }

    fn check_collisions(
        &self,
        inner: &Inner,
        kind: &ToolKind,
        capabilities: &CapabilityMap,
    ) -> RegistrationResult<()> {
        for entry in capabilities.entries() {
            let name = entry.schema().name();
            let clash = inner
                .registrations
                .iter()
                .filter(|other| &other.kind != kind)
                .find(|other| {
                    other.capabilities.entries().any(|candidate| {
                        candidate.dialect() == entry.dialect() && candidate.schema().name() == name
                    })
                });
            let Some(other) = clash else {
                continue;
            };

            match self.config.collision_policy {
                CollisionPolicy::Warn => {
                    warn!(
                        %kind,
                        other = %other.kind,
                        capability = name,
                        dialect = %entry.dialect(),
                        "capability name collision; earliest registration wins"
                    );
                }
                CollisionPolicy::Reject => {
                    return Err(RegistrationError::Collision {
                        kind: kind.clone(),
                        other: other.kind.clone(),
                        name: name.to_owned(),
                        dialect: entry.dialect(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Returns the instance registered under `kind`.
    #[must_use]
    pub fn get_tool(&self, kind: &str) -> Option<Arc<dyn Tool>> {
        let inner = self.read();
        inner
            .find(kind)
            .map(|registration| Arc::clone(&registration.instance))
    }

    /// Resolves an inline tag to the capability that declares it.
    #[must_use]
    pub fn resolve_tag(&self, tag: &str) -> Option<ResolvedCapability> {
        let inner = self.read();
        inner.inline_registrations().find_map(|registration| {
            registration
                .capabilities
                .entries()
                .find(|entry| entry.as_inline().is_some_and(|schema| schema.tag() == tag))
                .map(|entry| ResolvedCapability::new(registration, entry))
        })
    }

    /// Resolves a structured function name to the capability that declares it.
    #[must_use]
    pub fn resolve_function(&self, name: &str) -> Option<ResolvedCapability> {
        let inner = self.read();
        inner.registrations.iter().find_map(|registration| {
            registration
                .capabilities
                .entries()
                .find(|entry| {
                    entry
                        .as_structured()
                        .is_some_and(|schema| schema.name() == name)
                })
                .map(|entry| ResolvedCapability::new(registration, entry))
        })
    }

    /// Returns the instance declaring the inline tag `tag`.
    #[must_use]
    pub fn get_capability_by_tag(&self, tag: &str) -> Option<Arc<dyn Tool>> {
        self.resolve_tag(tag).map(ResolvedCapability::into_tool)
    }

    /// Structured schemas of every registered tool keyed by function name.
    #[must_use]
    pub fn get_all_structured_schemas(&self) -> BTreeMap<String, StructuredSchema> {
        let inner = self.read();
        let mut schemas = BTreeMap::new();
        for schema in inner
            .registrations
            .iter()
            .flat_map(ToolRegistration::structured_schemas)
        {
            schemas
                .entry(schema.name().to_owned())
                .or_insert_with(|| schema.clone());
        }
        schemas
    }

    /// Native function-calling definitions of every structured schema, sorted
    /// by function name.
    #[must_use]
    pub fn structured_tool_definitions(&self) -> Vec<Value> {
        self.get_all_structured_schemas()
            .values()
            .map(StructuredSchema::to_function_tool)
            .collect()
    }

    fn inline_schemas(&self) -> BTreeMap<String, InlineSchema> {
        let inner = self.read();
        let mut schemas = BTreeMap::new();
        for schema in inner
            .inline_registrations()
            .flat_map(ToolRegistration::inline_schemas)
        {
            schemas
                .entry(schema.tag().to_owned())
                .or_insert_with(|| schema.clone());
        }
        schemas
    }

    /// Usage examples of every inline capability keyed by tag.
    #[must_use]
    pub fn get_all_inline_examples(&self) -> BTreeMap<String, String> {
        self.inline_schemas()
            .into_iter()
            .map(|(tag, schema)| (tag, schema.example().to_owned()))
            .collect()
    }

    /// Renders every inline capability as a prompt section, sorted by tag.
    #[must_use]
    pub fn inline_usage_prompt(&self) -> String {
        self.inline_schemas()
            .values()
            .map(|schema| {
                if schema.description().is_empty() {
                    format!("### {}\n{}", schema.tag(), schema.example())
                } else {
                    format!(
                        "### {}\n{}\n{}",
                        schema.tag(),
                        schema.description(),
                        schema.example()
                    )
                }
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Every registered instance keyed by kind.
    #[must_use]
    pub fn get_all_tools(&self) -> BTreeMap<ToolKind, Arc<dyn Tool>> {
        let inner = self.read();
        inner
            .registrations
            .iter()
            .map(|registration| {
                (
                    registration.kind.clone(),
                    Arc::clone(&registration.instance),
                )
            })
            .collect()
    }

    /// Retained capability table of `kind`.
    #[must_use]
    pub fn get_capability_schemas(&self, kind: &str) -> Option<CapabilityMap> {
        let inner = self.read();
        inner
            .find(kind)
            .map(|registration| registration.capabilities.clone())
    }

    /// Snapshot of every registration in registration order.
    #[must_use]
    pub fn registrations(&self) -> Vec<ToolRegistration> {
        self.read().registrations.clone()
    }

    /// Returns `true` when `kind` is registered.
    #[must_use]
    pub fn has_tool(&self, kind: &str) -> bool {
        self.read().find(kind).is_some()
    }

    /// Registered kinds in registration order.
    #[must_use]
    pub fn list_tool_kinds(&self) -> Vec<ToolKind> {
        let inner = self.read();
        inner
            .registrations
            .iter()
            .map(|registration| registration.kind.clone())
            .collect()
    }

    /// Drops every registration.
    pub fn clear(&self) {
        let mut inner = self.write();
        let dropped = inner.registrations.len();
        inner.registrations.clear();
        inner.inline_index.clear();
        info!(dropped, "capability registry cleared");
    }

    /// Counts tools and functions across all registrations.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let inner = self.read();
        inner
            .registrations
            .iter()
            .fold(RegistryStats::default(), |mut stats, registration| {
                stats.total_tools += 1;
                stats.total_functions += registration.capabilities.len();
                if registration.capabilities.has_dialect(Dialect::Inline) {
                    stats.tools_with_inline += 1;
                }
                if registration.capabilities.has_dialect(Dialect::Structured) {
                    stats.tools_with_structured += 1;
                }
                stats
            })
    }
}

/// Errors produced while registering a tool.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// The tool type's kind constant is not a valid identifier.
    #[error("tool kind `{kind}` is invalid: {source}")]
    InvalidKind {
        /// Offending kind string.
        kind: String,
        /// Validation failure.
        source: ToolError,
    },

    /// Constructing the instance failed.
    #[error("failed to construct tool `{kind}`: {source}")]
    Construction {
        /// Kind being registered.
        kind: ToolKind,
        /// Error returned by the tool type.
        source: ToolError,
    },

    /// Retrieving the capability table failed.
    #[error("failed to retrieve capabilities of `{kind}`: {source}")]
    Declaration {
        /// Kind being registered.
        kind: ToolKind,
        /// Error returned by the tool type.
        source: ToolError,
    },

    /// The tool declared no capabilities.
    #[error("tool `{kind}` declares no capabilities")]
    MissingSchemas {
        /// Kind being registered.
        kind: ToolKind,
    },

    /// The capability table was built for a different kind.
    #[error("capabilities of `{owner}` cannot be registered as `{kind}`")]
    OwnerMismatch {
        /// Kind being registered.
        kind: ToolKind,
        /// Kind the table was built for.
        owner: ToolKind,
    },

    /// A declared schema failed validation.
    #[error("invalid schema on tool `{kind}`: {source}")]
    Schema {
        /// Kind being registered.
        kind: ToolKind,
        /// Validation failure.
        source: agent_primitives::Error,
    },

    /// Another tool kind already claims the name.
    #[error("{dialect} capability `{name}` of `{kind}` collides with tool `{other}`")]
    Collision {
        /// Kind being registered.
        kind: ToolKind,
        /// Kind already holding the name.
        other: ToolKind,
        /// Colliding tag or function name.
        name: String,
        /// Dialect the collision occurred in.
        dialect: Dialect,
    },
}
