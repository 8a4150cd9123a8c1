//! Entity references.

use crate::identity::Identity;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Globally unique, type-independent reference to one entity.
///
/// A reference is the identity-map key: each session holds at most one
/// entity instance per reference. References carry no type information;
/// resolving a reference to a concrete entity type is the session's job.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityReference(Identity);

impl EntityReference {
    /// Creates a reference to the entity with the given identity.
    #[must_use]
    pub const fn new(identity: Identity) -> Self {
        Self(identity)
    }

    /// Parses a reference from its textual form.
    #[must_use]
    pub fn parse(value: impl Into<String>) -> Self {
        Self(Identity::new(value))
    }

    /// Returns the referenced identity.
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.0
    }
}

impl fmt::Display for EntityReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Identity> for EntityReference {
    fn from(identity: Identity) -> Self {
        Self(identity)
    }
}

impl From<&Identity> for EntityReference {
    fn from(identity: &Identity) -> Self {
        Self(identity.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_wraps_identity() {
        let reference = EntityReference::new(Identity::new("person-1"));
        assert_eq!(reference.identity().as_str(), "person-1");
        assert_eq!(format!("{reference}"), "person-1");
    }

    #[test]
    fn parse_and_new_agree() {
        let parsed = EntityReference::parse("order-9");
        let built = EntityReference::new(Identity::new("order-9"));
        assert_eq!(parsed, built);
    }

    #[test]
    fn references_hash_by_identity() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(EntityReference::parse("a"));
        set.insert(EntityReference::parse("a"));
        set.insert(EntityReference::parse("b"));
        assert_eq!(set.len(), 2);
    }
}
