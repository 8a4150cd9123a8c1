//! Entity state as vended by store handles.

use crate::descriptor::{AssociationArity, EntityType};
use crate::reference::EntityReference;
use crate::version::EntityVersion;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Lifecycle status of an entity within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityStatus {
    /// Created in this session, not yet persisted.
    New,
    /// Fetched from the store, unmodified.
    Loaded,
    /// Fetched from the store and mutated.
    Updated,
    /// Marked for deletion.
    Removed,
}

/// Value of one association slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssociationValue {
    /// A single optional reference.
    One(Option<EntityReference>),
    /// An ordered list of references.
    Many(Vec<EntityReference>),
    /// References keyed by name.
    Named(BTreeMap<String, EntityReference>),
}

impl AssociationValue {
    /// Returns the empty value for the given arity.
    #[must_use]
    pub fn empty_of(arity: AssociationArity) -> Self {
        match arity {
            AssociationArity::One => Self::One(None),
            AssociationArity::Many => Self::Many(Vec::new()),
            AssociationArity::Named => Self::Named(BTreeMap::new()),
        }
    }

    /// Returns the arity this value belongs to.
    #[must_use]
    pub fn arity(&self) -> AssociationArity {
        match self {
            Self::One(_) => AssociationArity::One,
            Self::Many(_) => AssociationArity::Many,
            Self::Named(_) => AssociationArity::Named,
        }
    }

    /// Returns every reference held by this value.
    #[must_use]
    pub fn references(&self) -> Vec<EntityReference> {
        match self {
            Self::One(reference) => reference.iter().cloned().collect(),
            Self::Many(references) => references.clone(),
            Self::Named(references) => references.values().cloned().collect(),
        }
    }
}

struct StateData {
    reference: EntityReference,
    entity_type: EntityType,
    version: EntityVersion,
    status: EntityStatus,
    properties: BTreeMap<String, Value>,
    associations: BTreeMap<String, AssociationValue>,
}

/// Shared handle to one entity's field values.
///
/// A store handle vends exactly one `EntityState` per fetch or allocation
/// and keeps a clone of the handle for itself; the session's entity
/// instance wraps the same shared state. Mutations made through the session
/// are therefore visible to the store handle at prepare time without any
/// copying.
///
/// The first mutation of a `Loaded` state flips its status to `Updated`;
/// stores use the status to decide what to write at prepare time.
///
/// States are confined to the session's execution context and are not
/// `Send`; the stores that vend them are the shared, thread-safe side.
#[derive(Clone)]
pub struct EntityState {
    inner: Rc<RefCell<StateData>>,
}

impl EntityState {
    /// Creates the state of a freshly allocated entity.
    ///
    /// Status starts at [`EntityStatus::New`] and the version at
    /// [`EntityVersion::initial`]; properties and associations are empty
    /// until the caller seeds them.
    #[must_use]
    pub fn new_entity(reference: EntityReference, entity_type: EntityType) -> Self {
        Self {
            inner: Rc::new(RefCell::new(StateData {
                reference,
                entity_type,
                version: EntityVersion::initial(),
                status: EntityStatus::New,
                properties: BTreeMap::new(),
                associations: BTreeMap::new(),
            })),
        }
    }

    /// Creates the state of an entity fetched from a store.
    ///
    /// The version must be the store's current version of the entity; it is
    /// what conflict detection compares against at prepare time.
    #[must_use]
    pub fn loaded(
        reference: EntityReference,
        entity_type: EntityType,
        version: EntityVersion,
        properties: BTreeMap<String, Value>,
        associations: BTreeMap<String, AssociationValue>,
    ) -> Self {
        Self {
            inner: Rc::new(RefCell::new(StateData {
                reference,
                entity_type,
                version,
                status: EntityStatus::Loaded,
                properties,
                associations,
            })),
        }
    }

    /// Returns the entity reference.
    #[must_use]
    pub fn reference(&self) -> EntityReference {
        self.inner.borrow().reference.clone()
    }

    /// Returns the concrete entity type this state was stored as.
    #[must_use]
    pub fn entity_type(&self) -> EntityType {
        self.inner.borrow().entity_type.clone()
    }

    /// Returns the version captured when this state was read.
    #[must_use]
    pub fn version(&self) -> EntityVersion {
        self.inner.borrow().version
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> EntityStatus {
        self.inner.borrow().status
    }

    /// Returns the value of a property, if present.
    #[must_use]
    pub fn property_of(&self, name: &str) -> Option<Value> {
        self.inner.borrow().properties.get(name).cloned()
    }

    /// Sets a property value.
    ///
    /// Flips a `Loaded` state to `Updated`.
    pub fn set_property(&self, name: impl Into<String>, value: Value) {
        let mut data = self.inner.borrow_mut();
        data.properties.insert(name.into(), value);
        if data.status == EntityStatus::Loaded {
            data.status = EntityStatus::Updated;
        }
    }

    /// Returns the value of an association slot, if present.
    #[must_use]
    pub fn association_of(&self, name: &str) -> Option<AssociationValue> {
        self.inner.borrow().associations.get(name).cloned()
    }

    /// Sets an association slot.
    ///
    /// Flips a `Loaded` state to `Updated`.
    pub fn set_association(&self, name: impl Into<String>, value: AssociationValue) {
        let mut data = self.inner.borrow_mut();
        data.associations.insert(name.into(), value);
        if data.status == EntityStatus::Loaded {
            data.status = EntityStatus::Updated;
        }
    }

    /// Marks the entity for deletion.
    pub fn mark_removed(&self) {
        self.inner.borrow_mut().status = EntityStatus::Removed;
    }

    /// Returns a copy of all property values.
    #[must_use]
    pub fn properties(&self) -> BTreeMap<String, Value> {
        self.inner.borrow().properties.clone()
    }

    /// Returns a copy of all association slots.
    #[must_use]
    pub fn associations(&self) -> BTreeMap<String, AssociationValue> {
        self.inner.borrow().associations.clone()
    }

    /// Returns true if both handles point at the same shared state.
    #[must_use]
    pub fn same_state(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }
}

impl fmt::Debug for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.inner.borrow();
        f.debug_struct("EntityState")
            .field("reference", &data.reference)
            .field("entity_type", &data.entity_type)
            .field("version", &data.version)
            .field("status", &data.status)
            .finish_non_exhaustive()
    }
}
