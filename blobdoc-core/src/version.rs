use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque version token handed out by the blob API (a content hash or
/// ETag). It is only ever compared for equality and passed back verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionToken(String);

impl VersionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The token of a document that does not exist yet.
    pub fn empty() -> Self {
        Self(String::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `None` for the empty token, which the blob API must not receive as
    /// an expected version.
    pub fn as_expected(&self) -> Option<&VersionToken> {
        if self.is_empty() { None } else { Some(self) }
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for VersionToken {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl From<&str> for VersionToken {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}
