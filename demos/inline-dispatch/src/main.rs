//! Inline dispatch demo: registers a small note-taking tool, prints the
//! prompt material a model would receive, then processes a canned reply.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use agent_toolcall::dispatch::{DispatchConfig, ExecutionStrategy, InvocationDispatcher};
use agent_toolcall::primitives::{
    CapabilityMap, InlineParameter, InlineSchema, PropertySpec, PropertyType, ResultEnvelope,
    StructuredSchema,
};
use agent_toolcall::telemetry::{self, TelemetryConfig};
use agent_toolcall::tools::{CapabilityRegistry, Tool, ToolResult, ToolType};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::info;

const MODEL_REPLY: &str = r#"Let me write that down and check what we have.
<function_calls>
<invoke name="note-add">
<parameter name="title">groceries</parameter>
<parameter name="body">eggs, milk, coffee</parameter>
<parameter name="pinned">true</parameter>
</invoke>
<invoke name="note-list">
</invoke>
<invoke name="note-delete">
<parameter name="title">groceries</parameter>
</invoke>
</function_calls>"#;

#[derive(Default)]
struct Notebook {
    notes: Mutex<BTreeMap<String, (String, bool)>>,
}

#[async_trait]
impl Tool for Notebook {
    async fn invoke(&self, function: &str, arguments: Map<String, Value>) -> ResultEnvelope {
        let mut notes = self.notes.lock().unwrap_or_else(PoisonError::into_inner);
        match function {
            "add_note" => {
                let Some(title) = arguments.get("title").and_then(Value::as_str) else {
                    return ResultEnvelope::failure("title must be a string");
                };
                let body = arguments
                    .get("body")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let pinned = arguments
                    .get("pinned")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                notes.insert(title.to_owned(), (body.to_owned(), pinned));
                ResultEnvelope::success(json!({ "stored": title }))
            }
            "list_notes" => ResultEnvelope::success(
                notes
                    .iter()
                    .map(|(title, (body, pinned))| json!({"title": title, "body": body, "pinned": pinned}))
                    .collect::<Vec<_>>(),
            ),
            other => ResultEnvelope::failure(format!("notebook has no function `{other}`")),
        }
    }
}

impl ToolType for Notebook {
    const KIND: &'static str = "Notebook";
    type Args = ();

    fn construct((): ()) -> ToolResult<Self> {
        Ok(Self::default())
    }

    fn capabilities() -> ToolResult<CapabilityMap> {
        Ok(CapabilityMap::builder(Self::kind()?)
            .structured(
                "add_note",
                StructuredSchema::builder("add_note")
                    .description("Store a note under a title")
                    .property("title", PropertySpec::string("Note title"), true)
                    .property("body", PropertySpec::string("Note text"), true)
                    .property(
                        "pinned",
                        PropertySpec::boolean("Keep at the top").with_default(false),
                        false,
                    )
                    .build()?,
            )
            .inline(
                "add_note",
                InlineSchema::builder("note-add")
                    .description("Store a note under a title")
                    .parameter(InlineParameter::new(
                        "title",
                        PropertyType::String,
                        "Note title",
                        true,
                    ))
                    .parameter(InlineParameter::new(
                        "body",
                        PropertyType::String,
                        "Note text",
                        true,
                    ))
                    .parameter(InlineParameter::new(
                        "pinned",
                        PropertyType::Boolean,
                        "Keep at the top",
                        false,
                    ))
                    .build()?,
            )
            .inline(
                "list_notes",
                InlineSchema::builder("note-list")
                    .description("List every stored note")
                    .build()?,
            )
            .build()?)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init(&TelemetryConfig::new().with_target(false))?;

    let registry = Arc::new(CapabilityRegistry::new());
    registry.register::<Notebook>(())?;
    info!(tools = registry.stats().total_tools, "registry ready");

    println!("--- inline usage prompt ---\n{}\n", registry.inline_usage_prompt());
    println!(
        "--- structured definitions ---\n{}\n",
        serde_json::to_string_pretty(&registry.structured_tool_definitions())?
    );

    let dispatcher = InvocationDispatcher::new(Arc::clone(&registry))
        .with_config(DispatchConfig::default().with_strategy(ExecutionStrategy::Sequential));
    let turn = dispatcher.process_turn(MODEL_REPLY).await;

    println!("--- leftover text ---\n{}\n", turn.parse().leftover_text());
    for record in turn.records() {
        println!(
            "{} => {}",
            record.invocation().name(),
            serde_json::to_string(record.envelope())?
        );
    }

    let native = dispatcher
        .dispatch_function_call("list_notes", &json!({}))
        .await;
    match native {
        Ok(envelope) => println!("native list_notes => {}", serde_json::to_string(&envelope)?),
        Err(err) => println!("native list_notes rejected: {err}"),
    }
    Ok(())
}
