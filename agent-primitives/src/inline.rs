//! Tag names and rendering for the inline invocation grammar.
//!
//! The grammar has three levels: a container tag enclosing invoke blocks,
//! each invoke block naming its target through a `name` attribute, and
//! parameter blocks (also named by attribute) wrapping raw text values.

/// Default container tag enclosing invoke blocks.
pub const DEFAULT_CONTAINER_TAG: &str = "function_calls";
/// Default tag of an invoke block.
pub const DEFAULT_INVOKE_TAG: &str = "invoke";
/// Default tag of a parameter block.
pub const DEFAULT_PARAMETER_TAG: &str = "parameter";

/// Tag names used when rendering or recognising inline invocations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TagNames<'a> {
    /// Container tag.
    pub container: &'a str,
    /// Invoke block tag.
    pub invoke: &'a str,
    /// Parameter block tag.
    pub parameter: &'a str,
}

impl Default for TagNames<'static> {
    fn default() -> Self {
        Self {
            container: DEFAULT_CONTAINER_TAG,
            invoke: DEFAULT_INVOKE_TAG,
            parameter: DEFAULT_PARAMETER_TAG,
        }
    }
}

/// Renders a single invoke block wrapped in its container.
///
/// Parameter values are written verbatim; callers decide how typed values are
/// stringified.
#[must_use]
pub fn render_block<'p, I>(tags: TagNames<'_>, name: &str, parameters: I) -> String
where
    I: IntoIterator<Item = (&'p str, String)>,
{
    let TagNames {
        container,
        invoke,
        parameter,
    } = tags;
    let mut out = format!("<{container}>\n<{invoke} name=\"{name}\">\n");
    for (key, value) in parameters {
        out.push_str(&format!("<{parameter} name=\"{key}\">{value}</{parameter}>\n"));
    }
    out.push_str(&format!("</{invoke}>\n</{container}>"));
    out
}
