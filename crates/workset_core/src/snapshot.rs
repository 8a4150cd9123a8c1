//! Detached value copies of entity state.

use crate::builder::StateResolver;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use workset_store::{AssociationValue, EntityReference, EntityType};

/// A detached, serializable copy of one entity's state.
///
/// Snapshots carry no session affinity. They can be held across sessions,
/// serialized, or handed to another thread, and later replayed with
/// [`UnitOfWork::merge_snapshot`](crate::UnitOfWork::merge_snapshot). The
/// copy reflects the session state at capture time, including uncommitted
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    reference: EntityReference,
    entity_type: EntityType,
    properties: BTreeMap<String, Value>,
    associations: BTreeMap<String, AssociationValue>,
}

impl EntitySnapshot {
    pub(crate) fn new(
        reference: EntityReference,
        entity_type: EntityType,
        properties: BTreeMap<String, Value>,
        associations: BTreeMap<String, AssociationValue>,
    ) -> Self {
        Self {
            reference,
            entity_type,
            properties,
            associations,
        }
    }

    /// Returns the reference of the captured entity.
    #[must_use]
    pub fn reference(&self) -> &EntityReference {
        &self.reference
    }

    /// Returns the concrete type of the captured entity.
    #[must_use]
    pub fn entity_type(&self) -> &EntityType {
        &self.entity_type
    }

    /// Returns the captured value of a property, if it was set.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Returns the captured value of an association slot.
    #[must_use]
    pub fn association(&self, name: &str) -> Option<&AssociationValue> {
        self.associations.get(name)
    }

    /// Returns all captured properties.
    #[must_use]
    pub fn properties(&self) -> &BTreeMap<String, Value> {
        &self.properties
    }

    /// Returns all captured association slots.
    #[must_use]
    pub fn associations(&self) -> &BTreeMap<String, AssociationValue> {
        &self.associations
    }
}

impl StateResolver for EntitySnapshot {
    fn property_value(&self, name: &str) -> Option<Value> {
        self.properties.get(name).cloned()
    }

    fn association_value(&self, name: &str) -> Option<AssociationValue> {
        self.associations.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::Module;
    use crate::stack::UnitOfWorkFactory;
    use serde_json::json;
    use std::sync::Arc;
    use workset_store::{
        AssociationArity, EntityDescriptor, EntityType, MemoryEntityStore, UuidGenerator,
    };

    fn factory() -> UnitOfWorkFactory {
        let descriptor = EntityDescriptor::builder("Person", "people")
            .property("name")
            .property("age")
            .association("spouse", AssociationArity::One)
            .build();
        let module = Module::builder("people")
            .entity(descriptor, Arc::new(MemoryEntityStore::new("people")))
            .identity_generator(Arc::new(UuidGenerator::new()))
            .build();
        UnitOfWorkFactory::new(module)
    }

    #[test]
    fn snapshot_captures_uncommitted_state() {
        let factory = factory();
        let uow = factory.new_unit_of_work();
        let person = uow.new_entity(&EntityType::new("Person")).unwrap();
        person.set_property("name", "Astrid").unwrap();

        let snapshot = uow.snapshot_of(&person).unwrap();

        assert_eq!(snapshot.reference(), &person.reference());
        assert_eq!(snapshot.entity_type(), &EntityType::new("Person"));
        assert_eq!(snapshot.property("name"), Some(&json!("Astrid")));
        assert_eq!(
            snapshot.association("spouse"),
            Some(&AssociationValue::One(None))
        );
        uow.discard();
    }

    #[test]
    fn snapshot_survives_serialization() {
        let factory = factory();
        let uow = factory.new_unit_of_work();
        let person = uow.new_entity(&EntityType::new("Person")).unwrap();
        person.set_property("age", 42).unwrap();
        let snapshot = uow.snapshot_of(&person).unwrap();
        uow.discard();

        let encoded = serde_json::to_string(&snapshot).unwrap();
        let decoded: EntitySnapshot = serde_json::from_str(&encoded).unwrap();

        assert_eq!(decoded, snapshot);
    }

    #[test]
    fn merge_updates_an_existing_entity() {
        let factory = factory();
        let entity_type = EntityType::new("Person");

        let uow = factory.new_unit_of_work();
        let person = uow.new_entity(&entity_type).unwrap();
        person.set_property("name", "before").unwrap();
        let reference = person.reference();
        uow.complete().unwrap();

        let uow = factory.new_unit_of_work();
        let person = uow.get(&entity_type, &reference).unwrap();
        person.set_property("name", "after").unwrap();
        let snapshot = uow.snapshot_of(&person).unwrap();
        uow.discard();

        let uow = factory.new_unit_of_work();
        let merged = uow.merge_snapshot(&snapshot).unwrap();
        assert_eq!(merged.property::<String>("name").unwrap(), "after");
        uow.complete().unwrap();

        let uow = factory.new_unit_of_work();
        let person = uow.get(&entity_type, &reference).unwrap();
        assert_eq!(person.property::<String>("name").unwrap(), "after");
        uow.discard();
    }

    #[test]
    fn merge_creates_a_missing_entity() {
        let factory = factory();
        let entity_type = EntityType::new("Person");

        let uow = factory.new_unit_of_work();
        let person = uow.new_entity(&entity_type).unwrap();
        person.set_property("name", "detached").unwrap();
        let snapshot = uow.snapshot_of(&person).unwrap();
        uow.discard();

        let uow = factory.new_unit_of_work();
        let merged = uow.merge_snapshot(&snapshot).unwrap();
        assert_eq!(merged.reference(), snapshot.reference().clone());
        assert_eq!(merged.property::<String>("name").unwrap(), "detached");
        uow.complete().unwrap();

        let uow = factory.new_unit_of_work();
        let person = uow.get(&entity_type, snapshot.reference()).unwrap();
        assert_eq!(person.property::<String>("name").unwrap(), "detached");
        uow.discard();
    }
}
