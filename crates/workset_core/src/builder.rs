//! Staged construction of new entities.

use crate::entity::Entity;
use crate::error::{UowError, UowResult};
use crate::module::EntityBinding;
use crate::session::UnitOfWork;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use workset_store::{AssociationArity, AssociationValue, EntityReference};

/// Batch source of initial values for an entity under construction.
///
/// Resolver values are applied after descriptor defaults and before
/// explicit builder sets. [`EntitySnapshot`](crate::EntitySnapshot)
/// implements this trait so snapshots can be replayed into a session.
pub trait StateResolver {
    /// Returns the initial value for a property, if the resolver has one.
    fn property_value(&self, name: &str) -> Option<Value>;

    /// Returns the initial value for an association slot, if the resolver
    /// has one.
    fn association_value(&self, name: &str) -> Option<AssociationValue>;
}

/// Staged construction of one new entity.
///
/// Obtained from the session, which fixes the reference up front (the
/// identity generator runs at builder creation). `build` allocates store
/// state, layers values in order (descriptor defaults, resolver batch,
/// explicit sets), runs the `on_create` hook and inserts the instance into
/// the identity map with status `New`.
pub struct EntityBuilder<'a> {
    uow: &'a UnitOfWork,
    binding: EntityBinding,
    reference: EntityReference,
    resolved_properties: BTreeMap<String, Value>,
    resolved_associations: BTreeMap<String, AssociationValue>,
    properties: BTreeMap<String, Value>,
    associations: BTreeMap<String, AssociationValue>,
}

impl<'a> EntityBuilder<'a> {
    pub(crate) fn new(
        uow: &'a UnitOfWork,
        binding: EntityBinding,
        reference: EntityReference,
        resolver: Option<&dyn StateResolver>,
    ) -> UowResult<Self> {
        let mut resolved_properties = BTreeMap::new();
        let mut resolved_associations = BTreeMap::new();
        if let Some(resolver) = resolver {
            for property in binding.descriptor().properties() {
                if let Some(value) = resolver.property_value(property.name()) {
                    resolved_properties.insert(property.name().to_string(), value);
                }
            }
            for association in binding.descriptor().associations() {
                if let Some(value) = resolver.association_value(association.name()) {
                    if value.arity() != association.arity() {
                        return Err(UowError::no_such_association(
                            binding.descriptor().entity_type().clone(),
                            association.name(),
                        ));
                    }
                    resolved_associations.insert(association.name().to_string(), value);
                }
            }
        }
        Ok(Self {
            uow,
            binding,
            reference,
            resolved_properties,
            resolved_associations,
            properties: BTreeMap::new(),
            associations: BTreeMap::new(),
        })
    }

    /// Returns the reference the entity will be created under.
    #[must_use]
    pub fn reference(&self) -> &EntityReference {
        &self.reference
    }

    /// Stages a property value, overriding defaults and resolver values.
    ///
    /// # Errors
    ///
    /// [`UowError::NoSuchProperty`] for undeclared names,
    /// [`UowError::PropertyCodec`] when the value cannot be serialized.
    pub fn property(mut self, name: &str, value: impl Serialize) -> UowResult<Self> {
        self.declared_property(name)?;
        let value = serde_json::to_value(value)
            .map_err(|err| UowError::property_codec(name, err.to_string()))?;
        self.properties.insert(name.to_string(), value);
        Ok(self)
    }

    /// Stages a one-arity association target.
    ///
    /// # Errors
    ///
    /// [`UowError::NoSuchAssociation`] for undeclared names or arity
    /// mismatch.
    pub fn association(mut self, name: &str, target: EntityReference) -> UowResult<Self> {
        self.declared_association(name, AssociationArity::One)?;
        self.associations
            .insert(name.to_string(), AssociationValue::One(Some(target)));
        Ok(self)
    }

    /// Stages a many-arity association list.
    ///
    /// # Errors
    ///
    /// [`UowError::NoSuchAssociation`] for undeclared names or arity
    /// mismatch.
    pub fn many_association(
        mut self,
        name: &str,
        targets: Vec<EntityReference>,
    ) -> UowResult<Self> {
        self.declared_association(name, AssociationArity::Many)?;
        self.associations
            .insert(name.to_string(), AssociationValue::Many(targets));
        Ok(self)
    }

    /// Stages a named-arity association map.
    ///
    /// # Errors
    ///
    /// [`UowError::NoSuchAssociation`] for undeclared names or arity
    /// mismatch.
    pub fn named_association(
        mut self,
        name: &str,
        entries: BTreeMap<String, EntityReference>,
    ) -> UowResult<Self> {
        self.declared_association(name, AssociationArity::Named)?;
        self.associations
            .insert(name.to_string(), AssociationValue::Named(entries));
        Ok(self)
    }

    /// Finalizes the entity.
    ///
    /// # Errors
    ///
    /// [`UowError::EntityAlreadyExists`] if the reference is already in the
    /// identity map or the store, [`UowError::Lifecycle`] if the `on_create`
    /// hook aborts (the pending allocation is dropped), or a store error.
    pub fn build(self) -> UowResult<Entity> {
        let descriptor = self.binding.descriptor();

        let mut properties = BTreeMap::new();
        for property in descriptor.properties() {
            if let Some(default) = property.default_value() {
                properties.insert(property.name().to_string(), default.clone());
            }
        }
        properties.extend(self.resolved_properties);
        properties.extend(self.properties);

        let mut associations = BTreeMap::new();
        for association in descriptor.associations() {
            associations.insert(
                association.name().to_string(),
                AssociationValue::empty_of(association.arity()),
            );
        }
        associations.extend(self.resolved_associations);
        associations.extend(self.associations);

        self.uow
            .finalize_new_entity(self.binding, self.reference, properties, associations)
    }

    fn declared_property(&self, name: &str) -> UowResult<()> {
        if self.binding.descriptor().property(name).is_none() {
            return Err(UowError::no_such_property(
                self.binding.descriptor().entity_type().clone(),
                name,
            ));
        }
        Ok(())
    }

    fn declared_association(&self, name: &str, arity: AssociationArity) -> UowResult<()> {
        match self.binding.descriptor().association(name) {
            Some(declared) if declared.arity() == arity => Ok(()),
            _ => Err(UowError::no_such_association(
                self.binding.descriptor().entity_type().clone(),
                name,
            )),
        }
    }
}

impl fmt::Debug for EntityBuilder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityBuilder")
            .field("reference", &self.reference)
            .field("entity_type", self.binding.descriptor().entity_type())
            .finish_non_exhaustive()
    }
}
