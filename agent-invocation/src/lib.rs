//! Inline invocation parsing.
//!
//! Models emit tool calls inside generated text using a three-level tag
//! grammar:
//!
//! ```text
//! <function_calls>
//! <invoke name="web-search">
//! <parameter name="query">cats</parameter>
//! </invoke>
//! </function_calls>
//! ```
//!
//! [`InvocationParser`] extracts every invocation from such text, collects
//! per-block errors without aborting the scan, and returns the surrounding
//! prose. The parser holds no mutable state and can be shared across threads.

#![warn(missing_docs, clippy::pedantic)]

mod config;
mod invocation;
mod parser;

pub use config::{ParserConfig, ParserError, ParserResult};
pub use invocation::{ArgumentsError, ParseOutcome, ParsedInvocation, validate_invocation};
pub use parser::{BlockError, InvocationParser, coerce_value};
