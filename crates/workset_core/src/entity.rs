//! Live entity handles and their typed state accessors.

use crate::callback::EntityLifecycle;
use crate::error::{UowError, UowResult};
use crate::session::UowFlags;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use workset_store::{
    AssociationArity, AssociationValue, EntityDescriptor, EntityReference, EntityState,
    EntityStatus, EntityStore, EntityType,
};

struct EntityInstance {
    descriptor: Arc<EntityDescriptor>,
    state: EntityState,
    lifecycle: Option<Arc<dyn EntityLifecycle>>,
    store: Arc<dyn EntityStore>,
    flags: Rc<UowFlags>,
}

/// A live handle onto one entity inside one session.
///
/// Handles are cheap to clone; all clones share the same instance, and the
/// identity map guarantees at most one instance per reference per session.
/// [`Entity::same`] compares instance identity.
///
/// Property and association access requires the owning session to be open
/// and the entity not removed; `reference`, `entity_type`, `status` and
/// `is_removed` stay readable after the session closes.
#[derive(Clone)]
pub struct Entity {
    inner: Rc<EntityInstance>,
}

impl Entity {
    pub(crate) fn new(
        descriptor: Arc<EntityDescriptor>,
        state: EntityState,
        lifecycle: Option<Arc<dyn EntityLifecycle>>,
        store: Arc<dyn EntityStore>,
        flags: Rc<UowFlags>,
    ) -> Self {
        Self {
            inner: Rc::new(EntityInstance {
                descriptor,
                state,
                lifecycle,
                store,
                flags,
            }),
        }
    }

    pub(crate) fn state(&self) -> &EntityState {
        &self.inner.state
    }

    pub(crate) fn store(&self) -> &Arc<dyn EntityStore> {
        &self.inner.store
    }

    pub(crate) fn lifecycle_hooks(&self) -> Option<&Arc<dyn EntityLifecycle>> {
        self.inner.lifecycle.as_ref()
    }

    /// Returns the entity's reference.
    #[must_use]
    pub fn reference(&self) -> EntityReference {
        self.inner.state.reference()
    }

    /// Returns the concrete type the entity is stored as.
    #[must_use]
    pub fn entity_type(&self) -> EntityType {
        self.inner.state.entity_type()
    }

    /// Returns the descriptor the instance was resolved with.
    #[must_use]
    pub fn descriptor(&self) -> &EntityDescriptor {
        &self.inner.descriptor
    }

    /// Returns the entity's lifecycle status within its session.
    #[must_use]
    pub fn status(&self) -> EntityStatus {
        self.inner.state.status()
    }

    /// Returns true if the entity was removed in its session.
    #[must_use]
    pub fn is_removed(&self) -> bool {
        self.status() == EntityStatus::Removed
    }

    /// Returns true if both handles point at the same instance.
    #[must_use]
    pub fn same(a: &Entity, b: &Entity) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }

    /// Reads a property and converts it to `T`.
    ///
    /// An unset property reads as JSON null, so optional properties
    /// deserialize cleanly into `Option<T>`.
    ///
    /// # Errors
    ///
    /// [`UowError::NoSuchProperty`] for undeclared names,
    /// [`UowError::PropertyCodec`] when the stored value does not fit `T`,
    /// plus the access errors described on [`Entity`].
    pub fn property<T: DeserializeOwned>(&self, name: &str) -> UowResult<T> {
        self.ensure_accessible()?;
        self.declared_property(name)?;
        let value = self.inner.state.property_of(name).unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|err| UowError::property_codec(name, err.to_string()))
    }

    /// Reads a property as its raw JSON value.
    ///
    /// # Errors
    ///
    /// [`UowError::NoSuchProperty`] for undeclared names, plus the access
    /// errors described on [`Entity`].
    pub fn property_value(&self, name: &str) -> UowResult<Option<Value>> {
        self.ensure_accessible()?;
        self.declared_property(name)?;
        Ok(self.inner.state.property_of(name))
    }

    /// Writes a property, converting from any serializable value.
    ///
    /// Flips a `Loaded` entity to `Updated`.
    ///
    /// # Errors
    ///
    /// [`UowError::NoSuchProperty`] for undeclared names,
    /// [`UowError::PropertyCodec`] when the value cannot be serialized,
    /// plus the access errors described on [`Entity`].
    pub fn set_property(&self, name: &str, value: impl Serialize) -> UowResult<()> {
        self.ensure_accessible()?;
        self.declared_property(name)?;
        let value = serde_json::to_value(value)
            .map_err(|err| UowError::property_codec(name, err.to_string()))?;
        self.inner.state.set_property(name, value);
        Ok(())
    }

    /// Reads a one-arity association.
    ///
    /// # Errors
    ///
    /// [`UowError::NoSuchAssociation`] for undeclared names or arity
    /// mismatch, plus the access errors described on [`Entity`].
    pub fn association(&self, name: &str) -> UowResult<Option<EntityReference>> {
        self.ensure_accessible()?;
        match self.association_slot(name, AssociationArity::One)? {
            AssociationValue::One(target) => Ok(target),
            _ => Err(self.bad_association(name)),
        }
    }

    /// Writes a one-arity association; `None` clears it.
    ///
    /// # Errors
    ///
    /// [`UowError::NoSuchAssociation`] for undeclared names or arity
    /// mismatch, plus the access errors described on [`Entity`].
    pub fn set_association(&self, name: &str, target: Option<EntityReference>) -> UowResult<()> {
        self.ensure_accessible()?;
        self.declared_association(name, AssociationArity::One)?;
        self.inner.state.set_association(name, AssociationValue::One(target));
        Ok(())
    }

    /// Reads a many-arity association as an ordered list.
    ///
    /// # Errors
    ///
    /// [`UowError::NoSuchAssociation`] for undeclared names or arity
    /// mismatch, plus the access errors described on [`Entity`].
    pub fn many_association(&self, name: &str) -> UowResult<Vec<EntityReference>> {
        self.ensure_accessible()?;
        match self.association_slot(name, AssociationArity::Many)? {
            AssociationValue::Many(references) => Ok(references),
            _ => Err(self.bad_association(name)),
        }
    }

    /// Appends a reference to a many-arity association.
    ///
    /// Returns false (and leaves the list unchanged) if the reference is
    /// already present.
    ///
    /// # Errors
    ///
    /// [`UowError::NoSuchAssociation`] for undeclared names or arity
    /// mismatch, plus the access errors described on [`Entity`].
    pub fn add_many_association(&self, name: &str, reference: EntityReference) -> UowResult<bool> {
        let mut references = self.many_association(name)?;
        if references.contains(&reference) {
            return Ok(false);
        }
        references.push(reference);
        self.inner.state.set_association(name, AssociationValue::Many(references));
        Ok(true)
    }

    /// Removes a reference from a many-arity association.
    ///
    /// Returns true if the reference was present.
    ///
    /// # Errors
    ///
    /// [`UowError::NoSuchAssociation`] for undeclared names or arity
    /// mismatch, plus the access errors described on [`Entity`].
    pub fn remove_many_association(
        &self,
        name: &str,
        reference: &EntityReference,
    ) -> UowResult<bool> {
        let mut references = self.many_association(name)?;
        let before = references.len();
        references.retain(|held| held != reference);
        let removed = references.len() != before;
        if removed {
            self.inner.state.set_association(name, AssociationValue::Many(references));
        }
        Ok(removed)
    }

    /// Empties a many-arity association.
    ///
    /// # Errors
    ///
    /// [`UowError::NoSuchAssociation`] for undeclared names or arity
    /// mismatch, plus the access errors described on [`Entity`].
    pub fn clear_many_association(&self, name: &str) -> UowResult<()> {
        self.ensure_accessible()?;
        self.declared_association(name, AssociationArity::Many)?;
        self.inner
            .state
            .set_association(name, AssociationValue::Many(Vec::new()));
        Ok(())
    }

    /// Reads a named-arity association as a key-to-reference map.
    ///
    /// # Errors
    ///
    /// [`UowError::NoSuchAssociation`] for undeclared names or arity
    /// mismatch, plus the access errors described on [`Entity`].
    pub fn named_association(&self, name: &str) -> UowResult<BTreeMap<String, EntityReference>> {
        self.ensure_accessible()?;
        match self.association_slot(name, AssociationArity::Named)? {
            AssociationValue::Named(references) => Ok(references),
            _ => Err(self.bad_association(name)),
        }
    }

    /// Inserts a keyed reference into a named-arity association.
    ///
    /// Returns the reference previously held under the key, if any.
    ///
    /// # Errors
    ///
    /// [`UowError::NoSuchAssociation`] for undeclared names or arity
    /// mismatch, plus the access errors described on [`Entity`].
    pub fn put_named_association(
        &self,
        name: &str,
        key: impl Into<String>,
        reference: EntityReference,
    ) -> UowResult<Option<EntityReference>> {
        let mut references = self.named_association(name)?;
        let previous = references.insert(key.into(), reference);
        self.inner.state.set_association(name, AssociationValue::Named(references));
        Ok(previous)
    }

    /// Removes a keyed reference from a named-arity association.
    ///
    /// Returns the removed reference, if the key was present.
    ///
    /// # Errors
    ///
    /// [`UowError::NoSuchAssociation`] for undeclared names or arity
    /// mismatch, plus the access errors described on [`Entity`].
    pub fn remove_named_association(
        &self,
        name: &str,
        key: &str,
    ) -> UowResult<Option<EntityReference>> {
        let mut references = self.named_association(name)?;
        let removed = references.remove(key);
        if removed.is_some() {
            self.inner.state.set_association(name, AssociationValue::Named(references));
        }
        Ok(removed)
    }

    pub(crate) fn apply_association_value(
        &self,
        name: &str,
        value: AssociationValue,
    ) -> UowResult<()> {
        self.ensure_accessible()?;
        self.declared_association(name, value.arity())?;
        self.inner.state.set_association(name, value);
        Ok(())
    }

    fn ensure_accessible(&self) -> UowResult<()> {
        if !self.inner.flags.is_open() {
            return Err(UowError::illegal_state("unit of work is closed"));
        }
        if self.inner.state.status() == EntityStatus::Removed {
            return Err(UowError::no_such_entity(self.reference()));
        }
        Ok(())
    }

    fn declared_property(&self, name: &str) -> UowResult<()> {
        if self.inner.descriptor.property(name).is_none() {
            return Err(UowError::no_such_property(self.entity_type(), name));
        }
        Ok(())
    }

    fn declared_association(&self, name: &str, arity: AssociationArity) -> UowResult<()> {
        match self.inner.descriptor.association(name) {
            Some(declared) if declared.arity() == arity => Ok(()),
            _ => Err(self.bad_association(name)),
        }
    }

    fn association_slot(&self, name: &str, arity: AssociationArity) -> UowResult<AssociationValue> {
        self.declared_association(name, arity)?;
        Ok(self
            .inner
            .state
            .association_of(name)
            .unwrap_or_else(|| AssociationValue::empty_of(arity)))
    }

    fn bad_association(&self, name: &str) -> UowError {
        UowError::no_such_association(self.entity_type(), name)
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("reference", &self.reference())
            .field("entity_type", &self.entity_type())
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::Module;
    use crate::session::UnitOfWork;
    use crate::stack::UnitOfWorkFactory;
    use serde_json::json;
    use workset_store::{MemoryEntityStore, UuidGenerator};

    fn person_descriptor() -> EntityDescriptor {
        EntityDescriptor::builder("Person", "people")
            .property("name")
            .property_with_default("age", json!(0))
            .association("spouse", AssociationArity::One)
            .association("friends", AssociationArity::Many)
            .association("roles", AssociationArity::Named)
            .build()
    }

    fn factory() -> UnitOfWorkFactory {
        let store = Arc::new(MemoryEntityStore::new("people"));
        let module = Module::builder("people")
            .entity(person_descriptor(), store)
            .identity_generator(Arc::new(UuidGenerator::new()))
            .build();
        UnitOfWorkFactory::new(module)
    }

    fn open_session() -> UnitOfWork {
        factory().new_unit_of_work()
    }

    #[test]
    fn typed_property_round_trip() {
        let uow = open_session();
        let person = uow.new_entity(&EntityType::new("Person")).unwrap();

        person.set_property("name", "Alice").unwrap();
        assert_eq!(person.property::<String>("name").unwrap(), "Alice");
    }

    #[test]
    fn descriptor_default_is_seeded() {
        let uow = open_session();
        let person = uow.new_entity(&EntityType::new("Person")).unwrap();

        assert_eq!(person.property::<i64>("age").unwrap(), 0);
    }

    #[test]
    fn unset_property_reads_as_none() {
        let uow = open_session();
        let person = uow.new_entity(&EntityType::new("Person")).unwrap();

        assert_eq!(person.property::<Option<String>>("name").unwrap(), None);
    }

    #[test]
    fn undeclared_property_is_reported() {
        let uow = open_session();
        let person = uow.new_entity(&EntityType::new("Person")).unwrap();

        let err = person.set_property("shoe_size", 43).unwrap_err();
        assert!(matches!(err, UowError::NoSuchProperty { .. }));
    }

    #[test]
    fn type_mismatch_is_a_codec_error() {
        let uow = open_session();
        let person = uow.new_entity(&EntityType::new("Person")).unwrap();
        person.set_property("name", "Alice").unwrap();

        let err = person.property::<i64>("name").unwrap_err();
        assert!(matches!(err, UowError::PropertyCodec { .. }));
    }

    #[test]
    fn one_association_set_and_clear() {
        let uow = open_session();
        let person = uow.new_entity(&EntityType::new("Person")).unwrap();
        let spouse = uow.new_entity(&EntityType::new("Person")).unwrap();

        person.set_association("spouse", Some(spouse.reference())).unwrap();
        assert_eq!(person.association("spouse").unwrap(), Some(spouse.reference()));

        person.set_association("spouse", None).unwrap();
        assert_eq!(person.association("spouse").unwrap(), None);
    }

    #[test]
    fn many_association_add_is_set_like() {
        let uow = open_session();
        let person = uow.new_entity(&EntityType::new("Person")).unwrap();
        let friend = uow.new_entity(&EntityType::new("Person")).unwrap();

        assert!(person.add_many_association("friends", friend.reference()).unwrap());
        assert!(!person.add_many_association("friends", friend.reference()).unwrap());
        assert_eq!(person.many_association("friends").unwrap().len(), 1);

        assert!(person.remove_many_association("friends", &friend.reference()).unwrap());
        assert!(person.many_association("friends").unwrap().is_empty());
    }

    #[test]
    fn named_association_put_and_remove() {
        let uow = open_session();
        let person = uow.new_entity(&EntityType::new("Person")).unwrap();
        let boss = uow.new_entity(&EntityType::new("Person")).unwrap();

        assert_eq!(
            person.put_named_association("roles", "manager", boss.reference()).unwrap(),
            None
        );
        assert_eq!(
            person.named_association("roles").unwrap().get("manager"),
            Some(&boss.reference())
        );
        assert_eq!(
            person.remove_named_association("roles", "manager").unwrap(),
            Some(boss.reference())
        );
    }

    #[test]
    fn arity_mismatch_is_reported() {
        let uow = open_session();
        let person = uow.new_entity(&EntityType::new("Person")).unwrap();

        let err = person.association("friends").unwrap_err();
        assert!(matches!(err, UowError::NoSuchAssociation { .. }));
    }

    #[test]
    fn access_after_discard_fails_but_metadata_survives() {
        let uow = open_session();
        let person = uow.new_entity(&EntityType::new("Person")).unwrap();
        let reference = person.reference();
        uow.discard();

        assert!(matches!(
            person.property::<String>("name").unwrap_err(),
            UowError::IllegalState { .. }
        ));
        assert_eq!(person.reference(), reference);
        assert_eq!(person.entity_type(), EntityType::new("Person"));
    }

    #[test]
    fn removed_entity_refuses_state_access() {
        let factory = factory();
        let uow = factory.new_unit_of_work();
        let person = uow.new_entity(&EntityType::new("Person")).unwrap();
        person.set_property("name", "Alice").unwrap();
        let reference = person.reference();
        uow.complete().unwrap();

        let uow = factory.new_unit_of_work();
        let person = uow.get(&EntityType::new("Person"), &reference).unwrap();
        uow.remove(&person).unwrap();

        assert!(person.is_removed());
        assert!(matches!(
            person.property::<String>("name").unwrap_err(),
            UowError::NoSuchEntity { .. }
        ));
    }

    #[test]
    fn clones_share_one_instance() {
        let uow = open_session();
        let person = uow.new_entity(&EntityType::new("Person")).unwrap();
        let other = person.clone();

        assert!(Entity::same(&person, &other));
    }
}
