//! Security context value type

use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque security context string, e.g. `system_u:object_r:etc_t:s0`.
///
/// The string is carried as-is; its components mean nothing to this crate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecurityContext(String);

impl SecurityContext {
    /// Wrap an already-decoded context string
    pub fn new(context: impl Into<String>) -> Self {
        Self(context.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for SecurityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SecurityContext {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
