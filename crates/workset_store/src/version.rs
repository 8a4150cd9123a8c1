//! Entity versions for optimistic concurrency.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Version of one entity's stored state.
///
/// The version is captured when a session first reads an entity and is
/// compared against the store's current version at prepare time. A mismatch
/// means another session committed in between; that is the
/// optimistic-concurrency conflict this layer detects and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityVersion(pub u64);

impl EntityVersion {
    /// Creates a version from its raw value.
    #[must_use]
    pub const fn new(version: u64) -> Self {
        Self(version)
    }

    /// Returns the version a freshly created entity starts at.
    #[must_use]
    pub const fn initial() -> Self {
        Self(0)
    }

    /// Returns the raw version value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the next version.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for EntityVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v:{}", self.0)
    }
}
