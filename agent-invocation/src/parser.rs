//! Tag scanner extracting invocations from generated text.

use std::collections::HashSet;

use agent_primitives::inline;
use regex::{Match, Regex};
use serde_json::{Map, Number, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{ParserConfig, ParserResult};
use crate::invocation::{ParseOutcome, ParsedInvocation};

const SNIPPET_CHARS: usize = 60;

/// Failure to parse a single invoke block.
///
/// Its `Display` output is the diagnostic recorded in
/// [`ParseOutcome::errors`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockError {
    /// The invoke block has no `name` attribute.
    #[error("invoke block without a name attribute near `{snippet}`")]
    MissingName {
        /// Leading part of the offending block.
        snippet: String,
    },

    /// The invoke block has no closing tag.
    #[error("invoke block `{name}` is never closed")]
    Unclosed {
        /// Name of the unclosed invoke block.
        name: String,
    },

    /// The invoke block has no closing tag and no name.
    #[error("unnamed invoke block is never closed near `{snippet}`")]
    UnclosedUnnamed {
        /// Leading part of the offending block.
        snippet: String,
    },

    /// A parameter block has no `name` attribute.
    #[error("parameter without a name attribute in invoke `{invoke}` near `{snippet}`")]
    ParameterMissingName {
        /// Enclosing invoke block.
        invoke: String,
        /// Leading part of the offending parameter.
        snippet: String,
    },

    /// A parameter block has no closing tag.
    #[error("parameter `{parameter}` in invoke `{invoke}` is never closed")]
    UnclosedParameter {
        /// Enclosing invoke block.
        invoke: String,
        /// Name of the unclosed parameter.
        parameter: String,
    },
}

#[derive(Debug, Clone)]
struct TagPatterns {
    open: Regex,
    close: Regex,
}

impl TagPatterns {
    fn new(tag: &str) -> ParserResult<Self> {
        let tag = regex::escape(tag);
        Ok(Self {
            open: Regex::new(&format!(r"<{tag}(?:\s[^>]*)?/?>"))?,
            close: Regex::new(&format!(r"</{tag}\s*>"))?,
        })
    }
}

/// Extracts inline invocations from free-form text.
///
/// Parsing never fails as a whole: malformed invoke blocks are reported in
/// [`ParseOutcome::errors`] and skipped, keeping every sibling invocation.
#[derive(Debug, Clone)]
pub struct InvocationParser {
    config: ParserConfig,
    container: Regex,
    invoke: TagPatterns,
    parameter: TagPatterns,
    attribute: Regex,
}

impl Default for InvocationParser {
    fn default() -> Self {
        Self::new(ParserConfig::default()).expect("default grammar tags are valid")
    }
}

impl InvocationParser {
    /// Builds a parser for the configured grammar.
    ///
    /// # Errors
    ///
    /// Returns [`ParserError`](crate::ParserError) when the configuration is
    /// invalid.
    pub fn new(config: ParserConfig) -> ParserResult<Self> {
        config.validate()?;
        let tags = config.tags();
        let container = regex::escape(tags.container);
        let container = Regex::new(&format!(r"(?s)<{container}(?:\s[^>]*)?>(.*?)</{container}\s*>"))?;
        let invoke = TagPatterns::new(tags.invoke)?;
        let parameter = TagPatterns::new(tags.parameter)?;
        // key, then an optional double-quoted, single-quoted or bare value
        let attribute =
            Regex::new(r#"([^\s=/>"']+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>"']+)))?"#)?;
        Ok(Self {
            config,
            container,
            invoke,
            parameter,
            attribute,
        })
    }

    /// Returns the grammar configuration.
    #[must_use]
    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Parses every invocation contained in `text`.
    ///
    /// Text without a container block yields an empty, successful outcome
    /// whose leftover text is the input unchanged.
    #[must_use]
    pub fn parse(&self, text: &str) -> ParseOutcome {
        let mut invocations = Vec::new();
        let mut errors = Vec::new();
        let mut containers = 0usize;

        for captures in self.container.captures_iter(text) {
            containers += 1;
            if let Some(content) = captures.get(1) {
                self.parse_container(content.as_str(), &mut invocations, &mut errors);
            }
        }

        if containers == 0 {
            return ParseOutcome::new(invocations, errors, text.to_owned());
        }

        let leftover = self.container.replace_all(text, "").trim().to_owned();
        debug!(
            containers,
            invocations = invocations.len(),
            errors = errors.len(),
            "parsed inline invocations"
        );
        ParseOutcome::new(invocations, errors, leftover)
    }

    fn parse_container(
        &self,
        content: &str,
        invocations: &mut Vec<ParsedInvocation>,
        errors: &mut Vec<String>,
    ) {
        let mut cursor = 0;
        while let Some(open) = self.invoke.open.find_at(content, cursor) {
            let name = self.attribute_name(open.as_str());

            if is_self_closing(&open) {
                cursor = open.end();
                match name {
                    Some(name) => {
                        invocations.push(ParsedInvocation::new(name, Map::new(), open.as_str()));
                    }
                    None => record(
                        errors,
                        &BlockError::MissingName {
                            snippet: snippet(open.as_str()),
                        },
                    ),
                }
                continue;
            }

            let body_start = open.end();
            let Some(close) = self.invoke_close(content, body_start) else {
                let error = match name {
                    Some(name) => BlockError::Unclosed { name },
                    None => BlockError::UnclosedUnnamed {
                        snippet: snippet(&content[open.start()..]),
                    },
                };
                record(errors, &error);
                cursor = body_start;
                continue;
            };

            let raw = &content[open.start()..close.end()];
            let body = &content[body_start..close.start()];
            cursor = close.end();

            let Some(name) = name else {
                record(errors, &BlockError::MissingName { snippet: snippet(raw) });
                continue;
            };
            match self.parse_parameters(&name, body) {
                Ok(parameters) => {
                    debug!(invocation = %name, parameters = parameters.len(), "parsed invoke block");
                    invocations.push(ParsedInvocation::new(name, parameters, raw));
                }
                Err(error) => record(errors, &error),
            }
        }
    }

    fn parse_parameters(&self, invoke: &str, body: &str) -> Result<Map<String, Value>, BlockError> {
        let mut parameters = Map::new();
        let mut cursor = 0;
        while let Some(open) = self.parameter.open.find_at(body, cursor) {
            let Some(name) = self.attribute_name(open.as_str()) else {
                return Err(BlockError::ParameterMissingName {
                    invoke: invoke.to_owned(),
                    snippet: snippet(&body[open.start()..]),
                });
            };

            if is_self_closing(&open) {
                parameters.insert(name, coerce_value(""));
                cursor = open.end();
                continue;
            }

            let value_start = open.end();
            let Some(close) = balanced_close(&self.parameter, body, value_start) else {
                return Err(BlockError::UnclosedParameter {
                    invoke: invoke.to_owned(),
                    parameter: name,
                });
            };

            parameters.insert(name, coerce_value(&body[value_start..close.start()]));
            cursor = close.end();
        }
        Ok(parameters)
    }

    /// Finds the close tag of the invoke block whose body starts at
    /// `body_start`.
    ///
    /// Parameter blocks are skipped whole, so markup inside a value never
    /// ends or splits the enclosing block. Returns `None` when another invoke
    /// opens before this one closes.
    fn invoke_close<'h>(&self, content: &'h str, body_start: usize) -> Option<Match<'h>> {
        let mut cursor = body_start;
        loop {
            let close = self.invoke.close.find_at(content, cursor)?;
            let before_close = |found: &Match<'_>| found.start() < close.start();
            let next_invoke = self.invoke.open.find_at(content, cursor).filter(before_close);
            let next_parameter = self
                .parameter
                .open
                .find_at(content, cursor)
                .filter(before_close);

            match (next_parameter, next_invoke) {
                (Some(parameter), invoke)
                    if invoke.is_none_or(|invoke| parameter.start() < invoke.start()) =>
                {
                    // an unclosed parameter is reported by `parse_parameters`
                    cursor = if is_self_closing(&parameter) {
                        parameter.end()
                    } else {
                        balanced_close(&self.parameter, content, parameter.end())
                            .map_or(parameter.end(), |value_close| value_close.end())
                    };
                }
                (_, Some(_)) => return None,
                _ => return Some(close),
            }
        }
    }

    /// Value of the `name` attribute of an open tag.
    ///
    /// Attributes are tokenized left to right, so neither a longer key such
    /// as `data-name` nor `name=` text inside another attribute's quoted
    /// value is taken for it. Only a quoted, non-blank value counts.
    fn attribute_name(&self, tag: &str) -> Option<String> {
        let attributes = tag
            .get(1..)?
            .split_once(char::is_whitespace)
            .map_or("", |(_, rest)| rest);
        let captures = self
            .attribute
            .captures_iter(attributes)
            .find(|captures| &captures[1] == "name")?;
        captures
            .get(2)
            .or_else(|| captures.get(3))
            .map(|value| value.as_str().trim().to_owned())
            .filter(|value| !value.is_empty())
    }

    /// Names of every invoke block in `text`, deduplicated in first-seen
    /// order.
    ///
    /// Invoke tags are matched anywhere, with or without an enclosing
    /// container or closing tag.
    #[must_use]
    pub fn extract_tool_names(&self, text: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        self.invoke
            .open
            .find_iter(text)
            .filter_map(|open| self.attribute_name(open.as_str()))
            .filter(|name| seen.insert(name.clone()))
            .collect()
    }

    /// Renders `invocation` in this parser's grammar.
    ///
    /// String values are written verbatim; other values as compact JSON.
    #[must_use]
    pub fn format_invocation(&self, invocation: &ParsedInvocation) -> String {
        inline::render_block(
            self.config.tags(),
            invocation.name(),
            invocation
                .parameters()
                .iter()
                .map(|(key, value)| (key.as_str(), render_value(value))),
        )
    }
}

/// Converts a raw parameter value into a typed JSON value.
///
/// The trimmed text is tried, in order, as a JSON document, a
/// case-insensitive `true`/`false`, and a finite number; otherwise it is kept
/// as a string.
#[must_use]
pub fn coerce_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return value;
    }
    if trimmed.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if let Some(number) = parse_number(trimmed) {
        return Value::Number(number);
    }
    Value::String(trimmed.to_owned())
}

fn parse_number(text: &str) -> Option<Number> {
    if let Ok(integer) = text.parse::<i64>() {
        return Some(Number::from(integer));
    }
    let float = text.parse::<f64>().ok()?;
    // from_f64 rejects NaN and infinities
    Number::from_f64(float)
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Close tag matching an open tag that ends at `from`, counting nested
/// open tags of the same kind.
fn balanced_close<'h>(tags: &TagPatterns, text: &'h str, from: usize) -> Option<Match<'h>> {
    let mut depth = 1usize;
    let mut cursor = from;
    loop {
        let close = tags.close.find_at(text, cursor)?;
        match tags.open.find_at(text, cursor) {
            Some(open) if open.start() < close.start() => {
                if !is_self_closing(&open) {
                    depth += 1;
                }
                cursor = open.end();
            }
            _ => {
                depth -= 1;
                if depth == 0 {
                    return Some(close);
                }
                cursor = close.end();
            }
        }
    }
}

fn is_self_closing(open: &Match<'_>) -> bool {
    open.as_str().ends_with("/>")
}

fn snippet(text: &str) -> String {
    let mut snippet: String = text.chars().take(SNIPPET_CHARS).collect();
    if text.chars().nth(SNIPPET_CHARS).is_some() {
        snippet.push_str("...");
    }
    snippet
}

fn record(errors: &mut Vec<String>, error: &BlockError) {
    warn!(%error, "skipping malformed invoke block");
    errors.push(error.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parser() -> InvocationParser {
        InvocationParser::default()
    }

    #[test]
    fn parses_single_invocation_and_keeps_prose() {
        let text = "Let me look that up.\n<function_calls>\n<invoke name=\"web-search\">\n\
                    <parameter name=\"query\">cats</parameter>\n</invoke>\n</function_calls>\n\
                    Back soon.";
        let outcome = parser().parse(text);

        assert!(outcome.overall_ok());
        assert!(outcome.errors().is_empty());
        assert_eq!(outcome.invocations().len(), 1);
        let invocation = &outcome.invocations()[0];
        assert_eq!(invocation.name(), "web-search");
        assert_eq!(invocation.parameters()["query"], json!("cats"));
        assert!(invocation.raw_source().starts_with("<invoke name=\"web-search\">"));
        assert!(invocation.raw_source().ends_with("</invoke>"));
        assert_eq!(outcome.leftover_text(), "Let me look that up.\n\nBack soon.");
    }

    #[test]
    fn preserves_document_order() {
        let text = "<function_calls>\
                    <invoke name=\"first\"><parameter name=\"n\">1</parameter></invoke>\
                    <invoke name=\"second\"><parameter name=\"n\">2</parameter></invoke>\
                    <invoke name=\"third\"></invoke>\
                    </function_calls>";
        let outcome = parser().parse(text);

        let names: Vec<_> = outcome.invocations().iter().map(ParsedInvocation::name).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
        assert_eq!(outcome.invocations()[1].parameters()["n"], json!(2));
        assert!(outcome.invocations()[2].parameters().is_empty());
        assert_eq!(outcome.leftover_text(), "");
    }

    #[test]
    fn text_without_container_is_returned_untouched() {
        let text = "  nothing to call here  ";
        let outcome = parser().parse(text);
        assert!(outcome.overall_ok());
        assert!(outcome.invocations().is_empty());
        assert!(outcome.errors().is_empty());
        assert_eq!(outcome.leftover_text(), text);
    }

    #[test]
    fn removes_every_container() {
        let text = "a <function_calls><invoke name=\"x\"></invoke></function_calls> b \
                    <function_calls><invoke name=\"y\"></invoke></function_calls> c";
        let outcome = parser().parse(text);
        assert_eq!(outcome.invocations().len(), 2);
        assert_eq!(outcome.leftover_text(), "a  b  c");
    }

    #[test]
    #[allow(clippy::approx_constant)]
    fn coerces_parameter_values() {
        assert_eq!(coerce_value("true"), json!(true));
        assert_eq!(coerce_value("FALSE"), json!(false));
        assert_eq!(coerce_value("True"), json!(true));
        assert_eq!(coerce_value("42"), json!(42));
        assert_eq!(coerce_value("3.14"), json!(3.14));
        assert_eq!(coerce_value(r#"{"a":1}"#), json!({"a": 1}));
        assert_eq!(coerce_value("[1, \"two\"]"), json!([1, "two"]));
        assert_eq!(coerce_value("null"), Value::Null);
        assert_eq!(coerce_value("\"quoted\""), json!("quoted"));
        assert_eq!(coerce_value("hello"), json!("hello"));
        assert_eq!(coerce_value(""), json!(""));
        assert_eq!(coerce_value("  padded  "), json!("padded"));
        assert_eq!(coerce_value("+7"), json!(7));
        assert_eq!(coerce_value(".5"), json!(0.5));
        assert_eq!(coerce_value("NaN"), json!("NaN"));
        assert_eq!(coerce_value("inf"), json!("inf"));
        assert_eq!(coerce_value("1 2"), json!("1 2"));
    }

    #[test]
    fn malformed_block_does_not_discard_siblings() {
        let text = "<function_calls>\
                    <invoke name=\"broken\"><parameter name=\"x\">1</parameter>\
                    <invoke name=\"good\"><parameter name=\"q\">ok</parameter></invoke>\
                    </function_calls>";
        let outcome = parser().parse(text);

        assert!(!outcome.overall_ok());
        assert_eq!(outcome.errors().len(), 1);
        assert!(outcome.errors()[0].contains("broken"));
        assert_eq!(outcome.invocations().len(), 1);
        assert_eq!(outcome.invocations()[0].name(), "good");
        assert_eq!(outcome.invocations()[0].parameters()["q"], json!("ok"));
    }

    #[test]
    fn reports_unclosed_parameter_and_missing_names() {
        let text = "<function_calls>\
                    <invoke name=\"a\"><parameter name=\"x\">1</invoke>\
                    <invoke><parameter name=\"q\">v</parameter></invoke>\
                    <invoke name=\"b\"><parameter>v</parameter></invoke>\
                    <invoke name=\"c\"><parameter name=\"q\">fine</parameter></invoke>\
                    </function_calls>";
        let outcome = parser().parse(text);

        assert!(!outcome.overall_ok());
        assert_eq!(outcome.errors().len(), 3);
        assert!(outcome.errors()[0].contains("parameter `x` in invoke `a`"));
        assert!(outcome.errors()[1].contains("<invoke><parameter"));
        assert!(outcome.errors()[2].contains("invoke `b`"));
        assert_eq!(outcome.invocations().len(), 1);
        assert_eq!(outcome.invocations()[0].name(), "c");
    }

    #[test]
    fn accepts_single_quotes_extra_attributes_and_self_closing_tags() {
        let text = "<function_calls>\
                    <invoke name='ping' id=\"7\"/>\
                    <invoke id=\"8\" name=\"fetch\"><parameter name=\"url\">https://x.test</parameter>\
                    <parameter name=\"verbose\"/></invoke>\
                    </function_calls>";
        let outcome = parser().parse(text);

        assert!(outcome.overall_ok());
        assert_eq!(outcome.invocations().len(), 2);
        assert_eq!(outcome.invocations()[0].name(), "ping");
        assert!(outcome.invocations()[0].parameters().is_empty());
        let fetch = &outcome.invocations()[1];
        assert_eq!(fetch.parameters()["url"], json!("https://x.test"));
        assert_eq!(fetch.parameters()["verbose"], json!(""));
    }

    #[test]
    fn multiline_values_are_trimmed_and_kept() {
        let text = "<function_calls><invoke name=\"write\">\
                    <parameter name=\"body\">\n  line one\n  line two\n</parameter>\
                    </invoke></function_calls>";
        let outcome = parser().parse(text);
        assert_eq!(
            outcome.invocations()[0].parameters()["body"],
            json!("line one\n  line two")
        );
    }

    #[test]
    fn tag_names_are_case_sensitive() {
        let text = "<FUNCTION_CALLS><invoke name=\"x\"></invoke></FUNCTION_CALLS>";
        let outcome = parser().parse(text);
        assert!(outcome.invocations().is_empty());
        assert_eq!(outcome.leftover_text(), text);
    }

    #[test]
    fn custom_grammar_tags() {
        let parser =
            InvocationParser::new(ParserConfig::default().with_container_tag("outer")).unwrap();
        let text = "<outer><invoke name=\"web-search\"><parameter name=\"query\">cats</parameter>\
                    </invoke></outer>";
        let outcome = parser.parse(text);
        assert_eq!(outcome.invocations().len(), 1);
        assert_eq!(outcome.invocations()[0].name(), "web-search");
        assert_eq!(outcome.invocations()[0].parameters()["query"], json!("cats"));

        assert!(InvocationParser::new(ParserConfig::default().with_invoke_tag("")).is_err());
    }

    #[test]
    fn name_comes_from_the_name_attribute_only() {
        let text = "<function_calls>\
                    <invoke data-name=\"decoy\" name=\"real\">\
                    <parameter title=\"name='q'\" name=\"x\">1</parameter></invoke>\
                    <invoke label='name=\"ghost\"'></invoke>\
                    </function_calls>";
        let outcome = parser().parse(text);

        assert_eq!(outcome.invocations().len(), 1);
        let invocation = &outcome.invocations()[0];
        assert_eq!(invocation.name(), "real");
        assert_eq!(invocation.parameters(), json!({"x": 1}).as_object().unwrap());
        assert_eq!(outcome.errors().len(), 1);
        assert!(outcome.errors()[0].starts_with("invoke block without a name attribute"));

        assert_eq!(parser().extract_tool_names(text), vec!["real"]);
    }

    #[test]
    fn markup_inside_parameter_values_stays_opaque() {
        let example = "Example: <invoke name=\"shell\">\
                       <parameter name=\"cmd\">rm -rf /</parameter></invoke>";
        let text = format!(
            "<function_calls>\
             <invoke name=\"write_file\"><parameter name=\"path\">README.md</parameter>\
             <parameter name=\"content\">{example}</parameter></invoke>\
             <invoke name=\"read_file\"><parameter name=\"path\">README.md</parameter></invoke>\
             </function_calls>"
        );
        let outcome = parser().parse(&text);

        assert!(outcome.overall_ok(), "errors: {:?}", outcome.errors());
        let names: Vec<_> = outcome.invocations().iter().map(ParsedInvocation::name).collect();
        assert_eq!(names, vec!["write_file", "read_file"]);
        assert_eq!(outcome.invocations()[0].parameters()["content"], json!(example));
        assert_eq!(outcome.invocations()[0].parameters()["path"], json!("README.md"));
    }

    #[test]
    fn extract_tool_names_deduplicates_in_order() {
        let text = "<invoke name=\"search\"></invoke> then \
                    <function_calls><invoke name=\"fetch\"></invoke>\
                    <invoke name=\"search\"></invoke></function_calls>\
                    <invoke name=\"search\">";
        assert_eq!(parser().extract_tool_names(text), vec!["search", "fetch"]);
        assert!(parser().extract_tool_names("no calls").is_empty());
    }

    #[test]
    fn formatted_invocation_parses_back() {
        let mut parameters = Map::new();
        parameters.insert("query".into(), json!("cats"));
        parameters.insert("limit".into(), json!(5));
        parameters.insert("filters".into(), json!({"safe": true}));
        let invocation = ParsedInvocation::new("web-search", parameters.clone(), "source");

        let rendered = parser().format_invocation(&invocation);
        assert!(rendered.starts_with("<function_calls>\n<invoke name=\"web-search\">"));

        let outcome = parser().parse(&rendered);
        assert_eq!(outcome.invocations()[0].parameters(), &parameters);
    }

    #[test]
    fn error_snippets_are_bounded() {
        let long = "x".repeat(200);
        let text = format!("<function_calls><invoke data=\"{long}\"></invoke></function_calls>");
        let outcome = parser().parse(&text);
        assert_eq!(outcome.errors().len(), 1);
        assert!(outcome.errors()[0].ends_with("...`"));
        assert!(outcome.errors()[0].len() < 150);
    }

    #[test]
    fn parser_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<InvocationParser>();

        let parser = parser();
        std::thread::scope(|scope| {
            for n in 0..4 {
                let parser = &parser;
                scope.spawn(move || {
                    let text = format!(
                        "<function_calls><invoke name=\"t{n}\"></invoke></function_calls>"
                    );
                    let outcome = parser.parse(&text);
                    assert_eq!(outcome.invocations()[0].name(), format!("t{n}"));
                });
            }
        });
    }
}
