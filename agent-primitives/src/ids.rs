//! Tool kind identifiers.

use std::borrow::Borrow;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const MAX_KIND_LEN: usize = 64;

/// Identifier of a tool type, unique within a registry.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ToolKind(String);

impl ToolKind {
    /// Creates a tool kind after validating its format.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidToolKind`] if the identifier is empty, too long,
    /// or contains characters other than ASCII alphanumerics, dash,
    /// underscore, or dot.
    pub fn new(kind: impl Into<String>) -> Result<Self> {
        let kind = kind.into();
        validate_kind(&kind)?;
        Ok(Self(kind))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn validate_kind(kind: &str) -> Result<()> {
    if kind.is_empty() {
        return Err(Error::InvalidToolKind {
            kind: String::new(),
            reason: "identifier cannot be empty".into(),
        });
    }

    if kind.len() > MAX_KIND_LEN {
        return Err(Error::InvalidToolKind {
            kind: kind.into(),
            reason: format!("identifier length must be <= {MAX_KIND_LEN}"),
        });
    }

    if !kind
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(Error::InvalidToolKind {
            kind: kind.into(),
            reason: "identifier must contain ASCII alphanumeric, dash, underscore, or dot".into(),
        });
    }

    Ok(())
}

impl Display for ToolKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ToolKind {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ToolKind {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl FromStr for ToolKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for ToolKind {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ToolKind> for String {
    fn from(value: ToolKind) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_mixed_case_identifiers() {
        let kind = ToolKind::new("Search").expect("kind");
        assert_eq!(kind.as_str(), "Search");
        assert_eq!(kind.to_string(), "Search");
    }

    #[test]
    fn rejects_invalid_identifiers() {
        assert!(matches!(
            ToolKind::new(""),
            Err(Error::InvalidToolKind { .. })
        ));
        assert!(matches!(
            "web search".parse::<ToolKind>(),
            Err(Error::InvalidToolKind { .. })
        ));
        assert!(ToolKind::new("x".repeat(MAX_KIND_LEN + 1)).is_err());
    }

    #[test]
    fn deserialization_validates() {
        let kind: ToolKind = serde_json::from_str("\"files.v2\"").expect("deserialize");
        assert_eq!(kind.as_str(), "files.v2");
        assert!(serde_json::from_str::<ToolKind>("\"bad kind\"").is_err());
    }
}
