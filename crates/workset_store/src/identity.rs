//! Entity identities and identity generation.

use crate::descriptor::EntityType;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque identity of one entity.
///
/// Identities are:
/// - Globally unique within an assembly
/// - Immutable once assigned
/// - Never reused
///
/// The textual form is opaque to this crate; stores and finders treat it as
/// a plain key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Creates an identity from its textual form.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the textual form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Generates identities for newly created entities.
///
/// One generator is configured per module; entity creation without an
/// explicit identity asks the module's generator. The entity type is passed
/// so generators may emit type-tagged identities.
pub trait IdentityGenerator: Send + Sync {
    /// Produces a fresh identity for an entity of the given type.
    fn generate(&self, entity_type: &EntityType) -> Identity;
}

/// Identity generator backed by random UUIDs (v4).
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl UuidGenerator {
    /// Creates a new UUID generator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl IdentityGenerator for UuidGenerator {
    fn generate(&self, _entity_type: &EntityType) -> Identity {
        Identity::new(Uuid::new_v4().to_string())
    }
}
