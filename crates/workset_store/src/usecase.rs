//! Usecase metadata attached to sessions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Execution-context metadata attached to a session.
///
/// A usecase names what a session is doing ("checkout", "nightly-import").
/// The session core treats it as opaque; it shows up in store handles,
/// conflict reports and tracing output so operators can tell sessions
/// apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Usecase {
    name: String,
}

impl Usecase {
    /// Creates a usecase with the given name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Returns the usecase name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Default for Usecase {
    fn default() -> Self {
        Self::named("anonymous")
    }
}

impl fmt::Display for Usecase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_anonymous() {
        assert_eq!(Usecase::default().name(), "anonymous");
    }

    #[test]
    fn named_usecase() {
        let usecase = Usecase::named("checkout");
        assert_eq!(usecase.name(), "checkout");
        assert_eq!(format!("{usecase}"), "checkout");
    }
}
