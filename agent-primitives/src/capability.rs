//! Capability schemas shared across the agent runtime.
//!
//! A tool type declares each callable function once, under the structured
//! dialect, the inline dialect, or both. Declarations are static: they are
//! collected into a [`CapabilityMap`] by a pure function of the tool type and
//! never change per instance.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{Error, Result};
use crate::inline::{self, TagNames};
use crate::ToolKind;

const MAX_NAME_LEN: usize = 96;

/// Calling convention a schema is written for.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// JSON-Schema-like description for native function calling.
    Structured,
    /// Tag-based convention embedded in generated text.
    Inline,
}

impl Display for Dialect {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Structured => f.write_str("structured"),
            Self::Inline => f.write_str("inline"),
        }
    }
}

/// JSON type of a declared parameter.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    /// UTF-8 string.
    String,
    /// Whole number.
    Integer,
    /// Any JSON number.
    Number,
    /// `true` or `false`.
    Boolean,
    /// JSON array.
    Array,
    /// JSON object.
    Object,
}

/// Description of a single structured-dialect property.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropertySpec {
    #[serde(rename = "type")]
    kind: PropertyType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    allowed: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    items: Option<Box<PropertySpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<Value>,
}

impl PropertySpec {
    /// Creates a property of the given type.
    #[must_use]
    pub fn new(kind: PropertyType) -> Self {
        Self {
            kind,
            description: None,
            allowed: None,
            items: None,
            default: None,
        }
    }

    /// Shorthand for a described string property.
    #[must_use]
    pub fn string(description: impl Into<String>) -> Self {
        Self::new(PropertyType::String).with_description(description)
    }

    /// Shorthand for a described integer property.
    #[must_use]
    pub fn integer(description: impl Into<String>) -> Self {
        Self::new(PropertyType::Integer).with_description(description)
    }

    /// Shorthand for a described boolean property.
    #[must_use]
    pub fn boolean(description: impl Into<String>) -> Self {
        Self::new(PropertyType::Boolean).with_description(description)
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Restricts the property to an enumerated set of values.
    #[must_use]
    pub fn with_allowed(mut self, values: Vec<Value>) -> Self {
        self.allowed = Some(values);
        self
    }

    /// Sets the element type of an array property.
    #[must_use]
    pub fn with_items(mut self, items: PropertySpec) -> Self {
        self.items = Some(Box::new(items));
        self
    }

    /// Sets the default value advertised to the model.
    #[must_use]
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Returns the property type.
    #[must_use]
    pub const fn kind(&self) -> PropertyType {
        self.kind
    }

    /// Returns the optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

/// Object-typed parameter block of a structured schema.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectParameters {
    #[serde(rename = "type")]
    kind: PropertyType,
    #[serde(default)]
    properties: BTreeMap<String, PropertySpec>,
    #[serde(default)]
    required: BTreeSet<String>,
}

impl Default for ObjectParameters {
    fn default() -> Self {
        Self {
            kind: PropertyType::Object,
            properties: BTreeMap::new(),
            required: BTreeSet::new(),
        }
    }
}

impl ObjectParameters {
    /// Declared properties keyed by name.
    #[must_use]
    pub fn properties(&self) -> &BTreeMap<String, PropertySpec> {
        &self.properties
    }

    /// Names of required properties.
    #[must_use]
    pub fn required(&self) -> &BTreeSet<String> {
        &self.required
    }
}

/// Structured-dialect schema advertised for native function calling.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StructuredSchema {
    name: String,
    description: String,
    parameters: ObjectParameters,
}

impl StructuredSchema {
    /// Starts building a structured schema for `name`.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> StructuredSchemaBuilder {
        StructuredSchemaBuilder {
            name: name.into(),
            description: String::new(),
            parameters: ObjectParameters::default(),
        }
    }

    /// Function name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human-readable description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Object parameter block.
    #[must_use]
    pub fn parameters(&self) -> &ObjectParameters {
        &self.parameters
    }

    /// Checks the schema invariants.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCapability`] if the name is invalid, the
    /// parameter block is not object-typed, or a required property is not
    /// declared.
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        if self.parameters.kind != PropertyType::Object {
            return Err(Error::invalid_capability(format!(
                "parameters of `{}` must be an object",
                self.name
            )));
        }
        if let Some(missing) = self
            .parameters
            .required
            .iter()
            .find(|name| !self.parameters.properties.contains_key(*name))
        {
            return Err(Error::invalid_capability(format!(
                "required property `{missing}` of `{}` is not declared",
                self.name
            )));
        }
        Ok(())
    }

    /// Returns required property names absent from `arguments`, in name order.
    #[must_use]
    pub fn missing_required(&self, arguments: &Map<String, Value>) -> Vec<String> {
        self.parameters
            .required
            .iter()
            .filter(|name| !arguments.contains_key(*name))
            .cloned()
            .collect()
    }

    /// Renders the schema as a native function-calling tool definition.
    #[must_use]
    pub fn to_function_tool(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// Builder for [`StructuredSchema`].
#[derive(Debug)]
pub struct StructuredSchemaBuilder {
    name: String,
    description: String,
    parameters: ObjectParameters,
}

impl StructuredSchemaBuilder {
    /// Sets the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Declares a property, marking it required when `required` is set.
    #[must_use]
    pub fn property(mut self, name: impl Into<String>, spec: PropertySpec, required: bool) -> Self {
        let name = name.into();
        if required {
            self.parameters.required.insert(name.clone());
        } else {
            self.parameters.required.remove(&name);
        }
        self.parameters.properties.insert(name, spec);
        self
    }

    /// Finalises the schema.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCapability`] when the name is empty, too long,
    /// or contains unsupported characters.
    pub fn build(self) -> Result<StructuredSchema> {
        let schema = StructuredSchema {
            name: self.name,
            description: self.description,
            parameters: self.parameters,
        };
        schema.validate()?;
        Ok(schema)
    }
}

/// Parameter declared by an inline-dialect schema.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineParameter {
    name: String,
    #[serde(rename = "type")]
    kind: PropertyType,
    #[serde(default)]
    description: String,
    #[serde(default)]
    required: bool,
}

impl InlineParameter {
    /// Creates a parameter declaration.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        kind: PropertyType,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            required,
        }
    }

    /// Parameter name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Expected value type.
    #[must_use]
    pub const fn kind(&self) -> PropertyType {
        self.kind
    }

    /// Human-readable description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Whether the parameter must be present.
    #[must_use]
    pub const fn required(&self) -> bool {
        self.required
    }
}

/// Inline-dialect schema: a tag recognised inside generated text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineSchema {
    tag: String,
    description: String,
    parameters: Vec<InlineParameter>,
    example: String,
}

impl InlineSchema {
    /// Starts building an inline schema for `tag`.
    #[must_use]
    pub fn builder(tag: impl Into<String>) -> InlineSchemaBuilder {
        InlineSchemaBuilder {
            tag: tag.into(),
            description: String::new(),
            parameters: Vec::new(),
            example: None,
        }
    }

    /// Inline tag the schema is recognised by.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Human-readable description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Declared parameters in declaration order.
    #[must_use]
    pub fn parameters(&self) -> &[InlineParameter] {
        &self.parameters
    }

    /// Usage example shown to the model.
    #[must_use]
    pub fn example(&self) -> &str {
        &self.example
    }

    /// Returns required parameter names absent from `arguments`, in
    /// declaration order.
    #[must_use]
    pub fn missing_required(&self, arguments: &Map<String, Value>) -> Vec<String> {
        self.parameters
            .iter()
            .filter(|param| param.required && !arguments.contains_key(&param.name))
            .map(|param| param.name.clone())
            .collect()
    }
}

/// Builder for [`InlineSchema`].
#[derive(Debug)]
pub struct InlineSchemaBuilder {
    tag: String,
    description: String,
    parameters: Vec<InlineParameter>,
    example: Option<String>,
}

impl InlineSchemaBuilder {
    /// Sets the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Appends a parameter declaration.
    #[must_use]
    pub fn parameter(mut self, parameter: InlineParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Sets the usage example. When omitted, one is generated from the
    /// declared parameters using the default grammar tags.
    #[must_use]
    pub fn example(mut self, example: impl Into<String>) -> Self {
        self.example = Some(example.into());
        self
    }

    /// Finalises the schema.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCapability`] when the tag or a parameter name
    /// is invalid, or a parameter name is declared twice.
    pub fn build(self) -> Result<InlineSchema> {
        validate_name(&self.tag)?;
        let mut seen = BTreeSet::new();
        for param in &self.parameters {
            validate_name(&param.name)?;
            if !seen.insert(param.name.as_str()) {
                return Err(Error::invalid_capability(format!(
                    "parameter `{}` of `{}` is declared twice",
                    param.name, self.tag
                )));
            }
        }

        let example = self.example.unwrap_or_else(|| {
            inline::render_block(
                TagNames::default(),
                &self.tag,
                self.parameters
                    .iter()
                    .map(|param| (param.name.as_str(), param.description.clone())),
            )
        });

        Ok(InlineSchema {
            tag: self.tag,
            description: self.description,
            parameters: self.parameters,
            example,
        })
    }
}

/// Schema payload in one of the two dialects.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dialect", rename_all = "lowercase")]
pub enum CapabilitySchema {
    /// Native function-calling schema.
    Structured(StructuredSchema),
    /// Inline tag schema.
    Inline(InlineSchema),
}

impl CapabilitySchema {
    /// Dialect of the payload.
    #[must_use]
    pub const fn dialect(&self) -> Dialect {
        match self {
            Self::Structured(_) => Dialect::Structured,
            Self::Inline(_) => Dialect::Inline,
        }
    }

    /// Name the schema is addressed by: the function name or the inline tag.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Structured(schema) => schema.name(),
            Self::Inline(schema) => schema.tag(),
        }
    }

    /// Required parameter names absent from `arguments`.
    #[must_use]
    pub fn missing_required(&self, arguments: &Map<String, Value>) -> Vec<String> {
        match self {
            Self::Structured(schema) => schema.missing_required(arguments),
            Self::Inline(schema) => schema.missing_required(arguments),
        }
    }
}

/// One dialect-tagged schema bound to a function of a tool type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CapabilityEntry {
    owner: ToolKind,
    function: String,
    schema: CapabilitySchema,
}

impl CapabilityEntry {
    /// Tool kind that declared the entry.
    #[must_use]
    pub fn owner(&self) -> &ToolKind {
        &self.owner
    }

    /// Function the entry dispatches to.
    #[must_use]
    pub fn function(&self) -> &str {
        &self.function
    }

    /// Dialect of the schema.
    #[must_use]
    pub const fn dialect(&self) -> Dialect {
        self.schema.dialect()
    }

    /// Schema payload.
    #[must_use]
    pub fn schema(&self) -> &CapabilitySchema {
        &self.schema
    }

    /// Returns the structured schema, if this entry is structured.
    #[must_use]
    pub fn as_structured(&self) -> Option<&StructuredSchema> {
        match &self.schema {
            CapabilitySchema::Structured(schema) => Some(schema),
            CapabilitySchema::Inline(_) => None,
        }
    }

    /// Returns the inline schema, if this entry is inline.
    #[must_use]
    pub fn as_inline(&self) -> Option<&InlineSchema> {
        match &self.schema {
            CapabilitySchema::Inline(schema) => Some(schema),
            CapabilitySchema::Structured(_) => None,
        }
    }
}

/// Static capability table of a tool type, keyed by function name.
///
/// Each function holds one entry per declared dialect.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CapabilityMap {
    owner: ToolKind,
    functions: BTreeMap<String, Vec<CapabilityEntry>>,
}

impl CapabilityMap {
    /// Starts building the capability table of `owner`.
    #[must_use]
    pub fn builder(owner: ToolKind) -> CapabilityMapBuilder {
        CapabilityMapBuilder {
            owner,
            functions: BTreeMap::new(),
        }
    }

    /// Tool kind that owns every entry.
    #[must_use]
    pub fn owner(&self) -> &ToolKind {
        &self.owner
    }

    /// Returns `true` when no function is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Number of declared functions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Declared function names in name order.
    pub fn functions(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    /// Entries declared for `function`.
    #[must_use]
    pub fn get(&self, function: &str) -> Option<&[CapabilityEntry]> {
        self.functions.get(function).map(Vec::as_slice)
    }

    /// Every entry, grouped by function in name order.
    pub fn entries(&self) -> impl Iterator<Item = &CapabilityEntry> {
        self.functions.values().flatten()
    }

    /// Returns `true` when at least one entry uses `dialect`.
    #[must_use]
    pub fn has_dialect(&self, dialect: Dialect) -> bool {
        self.entries().any(|entry| entry.dialect() == dialect)
    }

    /// Keeps only the functions named in `allowed`. Names not declared by the
    /// tool are ignored.
    pub fn retain_functions<S>(&mut self, allowed: &BTreeSet<S>)
    where
        S: std::borrow::Borrow<str> + Ord,
    {
        self.functions
            .retain(|function, _| allowed.contains(function.as_str()));
    }

    /// Checks the table invariants.
    ///
    /// Within one table every function declares a dialect at most once,
    /// structured schemas are valid, and no two functions share a structured
    /// name or an inline tag.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateDialect`] for a dialect declared twice and
    /// [`Error::InvalidCapability`] for every other violation.
    pub fn validate(&self) -> Result<()> {
        let mut claimed: BTreeMap<(Dialect, &str), &str> = BTreeMap::new();
        for (function, entries) in &self.functions {
            validate_name(function)?;
            let mut dialects = BTreeSet::new();
            for entry in entries {
                let dialect = entry.dialect();
                if !dialects.insert(dialect) {
                    return Err(Error::DuplicateDialect {
                        function: function.clone(),
                        dialect,
                    });
                }
                if let CapabilitySchema::Structured(schema) = &entry.schema {
                    schema.validate()?;
                }
                let name = entry.schema.name();
                if let Some(first) = claimed.insert((dialect, name), function.as_str()) {
                    return Err(Error::invalid_capability(format!(
                        "{dialect} name `{name}` is declared by both `{first}` and `{function}`"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Builder for [`CapabilityMap`].
#[derive(Debug)]
pub struct CapabilityMapBuilder {
    owner: ToolKind,
    functions: BTreeMap<String, Vec<CapabilitySchema>>,
}

impl CapabilityMapBuilder {
    /// Declares `function` under the structured dialect.
    #[must_use]
    pub fn structured(self, function: impl Into<String>, schema: StructuredSchema) -> Self {
        self.declare(function, CapabilitySchema::Structured(schema))
    }

    /// Declares `function` under the inline dialect.
    #[must_use]
    pub fn inline(self, function: impl Into<String>, schema: InlineSchema) -> Self {
        self.declare(function, CapabilitySchema::Inline(schema))
    }

    /// Declares `function` with an already tagged schema.
    #[must_use]
    pub fn declare(mut self, function: impl Into<String>, schema: CapabilitySchema) -> Self {
        self.functions
            .entry(function.into())
            .or_default()
            .push(schema);
        self
    }

    /// Finalises the table.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`CapabilityMap::validate`].
    pub fn build(self) -> Result<CapabilityMap> {
        let owner = self.owner;
        let functions: BTreeMap<String, Vec<CapabilityEntry>> = self
            .functions
            .into_iter()
            .map(|(function, schemas)| {
                let entries = schemas
                    .into_iter()
                    .map(|schema| CapabilityEntry {
                        owner: owner.clone(),
                        function: function.clone(),
                        schema,
                    })
                    .collect();
                (function, entries)
            })
            .collect();
        let map = CapabilityMap { owner, functions };
        map.validate()?;
        Ok(map)
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::invalid_capability("name cannot be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(Error::invalid_capability(format!(
            "name length must be <= {MAX_NAME_LEN}"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(Error::invalid_capability(format!(
            "name `{name}` must contain ASCII alphanumeric, dash, underscore, or dot"
        )));
    }
    Ok(())
}
