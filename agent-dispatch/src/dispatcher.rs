//! Invocation execution pipeline.

use std::fmt;
use std::sync::Arc;

use agent_invocation::{
    ArgumentsError, InvocationParser, ParseOutcome, ParsedInvocation, validate_invocation,
};
use agent_primitives::ResultEnvelope;
use agent_tools::{CapabilityRegistry, ResolvedCapability};
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{DispatchConfig, ExecutionStrategy};

/// Result alias for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Errors preventing an invocation from reaching its tool.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The invocation has no target name or no source text.
    #[error("invocation `{name}` is incomplete")]
    InvalidInvocation {
        /// Name carried by the invocation, possibly empty.
        name: String,
    },

    /// No registered tool declares the target.
    #[error("no registered capability named `{name}`")]
    UnknownCapability {
        /// Requested tag or function name.
        name: String,
    },

    /// Required parameters were absent.
    #[error("invocation `{name}` is missing required parameters: {}", .missing.join(", "))]
    MissingParameters {
        /// Requested tag or function name.
        name: String,
        /// Names of the absent parameters.
        missing: Vec<String>,
    },

    /// Native function-call arguments could not be converted.
    #[error(transparent)]
    InvalidArguments(#[from] ArgumentsError),
}

/// One invocation of a turn and the envelope it produced.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DispatchRecord {
    invocation: ParsedInvocation,
    envelope: ResultEnvelope,
}

impl DispatchRecord {
    /// The dispatched invocation.
    #[must_use]
    pub fn invocation(&self) -> &ParsedInvocation {
        &self.invocation
    }

    /// Envelope returned by the tool, or a failure envelope when dispatch
    /// itself failed.
    #[must_use]
    pub fn envelope(&self) -> &ResultEnvelope {
        &self.envelope
    }
}

/// Everything produced while processing one turn of generated text.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TurnOutcome {
    parse: ParseOutcome,
    records: Vec<DispatchRecord>,
}

impl TurnOutcome {
    /// Parser output for the turn.
    #[must_use]
    pub fn parse(&self) -> &ParseOutcome {
        &self.parse
    }

    /// Dispatch records in document order.
    #[must_use]
    pub fn records(&self) -> &[DispatchRecord] {
        &self.records
    }

    /// Returns `true` when parsing was clean and every envelope succeeded.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.parse.overall_ok() && self.records.iter().all(|record| record.envelope.succeeded())
    }
}

/// Resolves invocations against a registry and executes them.
pub struct InvocationDispatcher {
    registry: Arc<CapabilityRegistry>,
    parser: InvocationParser,
    config: DispatchConfig,
}

impl fmt::Debug for InvocationDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationDispatcher")
            .field("registry", &self.registry)
            .field("parser", &self.parser.config())
            .field("config", &self.config)
            .finish()
    }
}

impl InvocationDispatcher {
    /// Creates a dispatcher with the default grammar and configuration.
    #[must_use]
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self {
            registry,
            parser: InvocationParser::default(),
            config: DispatchConfig::default(),
        }
    }

    /// Replaces the parser used by [`InvocationDispatcher::process_turn`].
    #[must_use]
    pub fn with_parser(mut self, parser: InvocationParser) -> Self {
        self.parser = parser;
        self
    }

    /// Replaces the dispatch configuration.
    #[must_use]
    pub fn with_config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the registry invocations are resolved against.
    #[must_use]
    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    /// Returns the parser.
    #[must_use]
    pub fn parser(&self) -> &InvocationParser {
        &self.parser
    }

    /// Resolves an inline invocation: by inline tag first, then by structured
    /// function name.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::UnknownCapability`] when neither lookup
    /// matches.
    pub fn resolve(&self, invocation: &ParsedInvocation) -> DispatchResult<ResolvedCapability> {
        let name = invocation.name();
        self.registry
            .resolve_tag(name)
            .or_else(|| self.registry.resolve_function(name))
            .ok_or_else(|| DispatchError::UnknownCapability {
                name: name.to_owned(),
            })
    }

    /// Executes a parsed invocation.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] when the invocation is incomplete, cannot be
    /// resolved, or lacks required parameters. Tool failures are reported in
    /// the returned envelope.
    pub async fn dispatch(&self, invocation: &ParsedInvocation) -> DispatchResult<ResultEnvelope> {
        if !validate_invocation(invocation) {
            return Err(DispatchError::InvalidInvocation {
                name: invocation.name().to_owned(),
            });
        }
        let resolved = self.resolve(invocation)?;
        self.execute(&resolved, invocation).await
    }

    /// Executes a native function-call payload against structured schemas.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidArguments`] for malformed arguments,
    /// and otherwise the same errors as [`InvocationDispatcher::dispatch`].
    pub async fn dispatch_function_call(
        &self,
        name: &str,
        arguments: &Value,
    ) -> DispatchResult<ResultEnvelope> {
        let invocation = ParsedInvocation::from_function_call(name, arguments)?;
        let resolved = self.registry.resolve_function(name).ok_or_else(|| {
            DispatchError::UnknownCapability {
                name: name.to_owned(),
            }
        })?;
        self.execute(&resolved, &invocation).await
    }

    async fn execute(
        &self,
        resolved: &ResolvedCapability,
        invocation: &ParsedInvocation,
    ) -> DispatchResult<ResultEnvelope> {
        if self.config.enforce_required() {
            let missing = resolved
                .entry()
                .schema()
                .missing_required(invocation.parameters());
            if !missing.is_empty() {
                return Err(DispatchError::MissingParameters {
                    name: invocation.name().to_owned(),
                    missing,
                });
            }
        }

        debug!(
            kind = %resolved.kind(),
            function = resolved.function(),
            dialect = %resolved.entry().dialect(),
            "dispatching invocation"
        );
        let envelope = resolved
            .tool()
            .invoke(resolved.function(), invocation.parameters().clone())
            .await;
        if !envelope.succeeded() {
            warn!(
                kind = %resolved.kind(),
                function = resolved.function(),
                error = envelope.error_message().unwrap_or_default(),
                "tool reported failure"
            );
        }
        Ok(envelope.with_metadata("tool_kind", resolved.kind().as_str()))
    }

    async fn dispatch_record(&self, invocation: &ParsedInvocation) -> DispatchRecord {
        let envelope = match self.dispatch(invocation).await {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(invocation = invocation.name(), %err, "dispatch failed");
                ResultEnvelope::failure(err.to_string())
            }
        };
        DispatchRecord {
            invocation: invocation.clone(),
            envelope,
        }
    }

    /// Parses one turn of generated text and dispatches every invocation.
    ///
    /// Dispatch errors become failure envelopes so the remaining invocations
    /// still run.
    pub async fn process_turn(&self, text: &str) -> TurnOutcome {
        let parse = self.parser.parse(text);
        let invocations = parse.invocations();

        let records = match self.config.strategy() {
            ExecutionStrategy::Sequential => {
                let mut records = Vec::with_capacity(invocations.len());
                for invocation in invocations {
                    records.push(self.dispatch_record(invocation).await);
                }
                records
            }
            ExecutionStrategy::Parallel => {
                join_all(invocations.iter().map(|invocation| self.dispatch_record(invocation)))
                    .await
            }
        };

        info!(
            invocations = records.len(),
            parse_errors = parse.errors().len(),
            failed = records
                .iter()
                .filter(|record| !record.envelope.succeeded())
                .count(),
            "turn processed"
        );
        TurnOutcome { parse, records }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use agent_primitives::{
        CapabilityMap, InlineParameter, InlineSchema, PropertySpec, PropertyType,
        StructuredSchema,
    };
    use agent_tools::{Tool, ToolResult, ToolType};
    use async_trait::async_trait;
    use serde_json::{Map, json};

    struct Calculator;

    #[async_trait]
    impl Tool for Calculator {
        async fn invoke(&self, function: &str, arguments: Map<String, Value>) -> ResultEnvelope {
            match function {
                "add" => {
                    let a = arguments.get("a").and_then(Value::as_f64);
                    let b = arguments.get("b").and_then(Value::as_f64);
                    match (a, b) {
                        (Some(a), Some(b)) => ResultEnvelope::success(a + b),
                        _ => ResultEnvelope::failure("operands must be numbers"),
                    }
                }
                other => ResultEnvelope::failure(format!("unknown function `{other}`")),
            }
        }
    }

    impl ToolType for Calculator {
        const KIND: &'static str = "Calculator";
        type Args = ();

        fn construct((): ()) -> ToolResult<Self> {
            Ok(Self)
        }

        fn capabilities() -> ToolResult<CapabilityMap> {
            Ok(CapabilityMap::builder(Self::kind()?)
                .structured(
                    "add",
                    StructuredSchema::builder("add")
                        .property("a", PropertySpec::new(PropertyType::Number), true)
                        .property("b", PropertySpec::new(PropertyType::Number), true)
                        .build()?,
                )
                .inline(
                    "add",
                    InlineSchema::builder("calc-add")
                        .parameter(InlineParameter::new("a", PropertyType::Number, "", true))
                        .parameter(InlineParameter::new("b", PropertyType::Number, "", true))
                        .build()?,
                )
                .build()?)
        }
    }

    fn dispatcher() -> InvocationDispatcher {
        let registry = Arc::new(CapabilityRegistry::new());
        registry.register::<Calculator>(()).unwrap();
        InvocationDispatcher::new(registry)
    }

    fn invocation(name: &str, parameters: Value) -> ParsedInvocation {
        let Value::Object(parameters) = parameters else {
            panic!("parameters must be an object");
        };
        ParsedInvocation::new(name, parameters, "<invoke/>")
    }

    #[tokio::test]
    async fn dispatches_by_tag_and_function_name() {
        let dispatcher = dispatcher();

        let by_tag = dispatcher
            .dispatch(&invocation("calc-add", json!({"a": 1, "b": 2})))
            .await
            .unwrap();
        assert_eq!(by_tag.output(), Some(&json!(3.0)));
        assert_eq!(by_tag.metadata().unwrap()["tool_kind"], "Calculator");

        let by_name = dispatcher
            .dispatch(&invocation("add", json!({"a": 1.5, "b": 2})))
            .await
            .unwrap();
        assert_eq!(by_name.output(), Some(&json!(3.5)));
    }

    #[tokio::test]
    async fn unknown_and_incomplete_invocations_error() {
        let dispatcher = dispatcher();

        let err = dispatcher
            .dispatch(&invocation("divide", json!({})))
            .await
            .expect_err("unknown capability");
        assert!(matches!(err, DispatchError::UnknownCapability { name } if name == "divide"));

        let err = dispatcher
            .dispatch(&ParsedInvocation::new("add", Map::new(), ""))
            .await
            .expect_err("missing source");
        assert!(matches!(err, DispatchError::InvalidInvocation { .. }));
    }

    #[tokio::test]
    async fn required_parameters_are_enforced_unless_disabled() {
        let err = dispatcher()
            .dispatch(&invocation("calc-add", json!({"a": 1})))
            .await
            .expect_err("missing b");
        assert!(matches!(
            &err,
            DispatchError::MissingParameters { missing, .. } if missing == &vec!["b".to_owned()]
        ));
        assert_eq!(
            err.to_string(),
            "invocation `calc-add` is missing required parameters: b"
        );

        let lenient =
            dispatcher().with_config(DispatchConfig::default().with_enforce_required(false));
        let envelope = lenient
            .dispatch(&invocation("calc-add", json!({"a": 1})))
            .await
            .unwrap();
        assert!(!envelope.succeeded());
        assert_eq!(envelope.error_message(), Some("operands must be numbers"));
    }

    #[tokio::test]
    async fn function_calls_use_structured_schemas_only() {
        let dispatcher = dispatcher();

        let envelope = dispatcher
            .dispatch_function_call("add", &json!("{\"a\": 2, \"b\": 2}"))
            .await
            .unwrap();
        assert_eq!(envelope.output(), Some(&json!(4.0)));

        let err = dispatcher
            .dispatch_function_call("calc-add", &json!({"a": 2, "b": 2}))
            .await
            .expect_err("inline tag is not a function");
        assert!(matches!(err, DispatchError::UnknownCapability { .. }));

        let err = dispatcher
            .dispatch_function_call("add", &json!([1, 2]))
            .await
            .expect_err("array arguments");
        assert!(matches!(err, DispatchError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn process_turn_converts_errors_into_failure_envelopes() {
        let text = "Working on it.\n<function_calls>\
                    <invoke name=\"calc-add\"><parameter name=\"a\">2</parameter>\
                    <parameter name=\"b\">3</parameter></invoke>\
                    <invoke name=\"divide\"><parameter name=\"a\">1</parameter></invoke>\
                    <invoke name=\"calc-add\"><parameter name=\"a\">1</parameter>\
                    </function_calls>";
        let outcome = dispatcher().process_turn(text).await;

        assert_eq!(outcome.parse().leftover_text(), "Working on it.");
        assert_eq!(outcome.parse().errors().len(), 1);
        assert_eq!(outcome.records().len(), 2);
        assert_eq!(outcome.records()[0].envelope().output(), Some(&json!(5.0)));
        assert_eq!(outcome.records()[1].invocation().name(), "divide");
        assert_eq!(
            outcome.records()[1].envelope().error_message(),
            Some("no registered capability named `divide`")
        );
        assert!(!outcome.all_succeeded());
    }
}
