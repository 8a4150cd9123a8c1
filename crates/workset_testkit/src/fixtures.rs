//! Pre-wired modules and descriptors for session tests.
//!
//! Provides a small shop domain (people and orders) assembled over
//! in-memory stores, so tests can open sessions without repeating module
//! wiring.

use serde_json::json;
use std::sync::Arc;
use workset_core::{EntityLifecycle, Module, UnitOfWorkFactory};
use workset_store::{
    AssociationArity, EntityDescriptor, EntityReference, EntityStore, EntityType,
    MemoryEntityFinder, MemoryEntityStore, UuidGenerator,
};

/// The descriptor for the fixture's `Person` type.
///
/// Declares `name` and `age` properties (with a default age), a one-arity
/// `spouse`, a many-arity `friends` and a named-arity `roles` association,
/// and exposes the extra `Nameable` type.
pub fn person_descriptor() -> EntityDescriptor {
    EntityDescriptor::builder("Person", "shop")
        .exposes("Nameable")
        .property("name")
        .property_with_default("age", json!(0))
        .association("spouse", AssociationArity::One)
        .association("friends", AssociationArity::Many)
        .association("roles", AssociationArity::Named)
        .build()
}

/// The descriptor for the fixture's `Order` type.
pub fn order_descriptor() -> EntityDescriptor {
    EntityDescriptor::builder("Order", "shop")
        .property_with_default("total", json!(0))
        .property("note")
        .association("placed_by", AssociationArity::One)
        .build()
}

/// Returns the `Person` entity type.
pub fn person_type() -> EntityType {
    EntityType::new("Person")
}

/// Returns the `Order` entity type.
pub fn order_type() -> EntityType {
    EntityType::new("Order")
}

/// A ready-to-use shop domain over in-memory stores.
///
/// Exposes the raw stores so tests can assert on committed state, and the
/// factory so they can open sessions.
pub struct ShopFixture {
    /// Factory over the assembled module.
    pub factory: UnitOfWorkFactory,
    /// The store backing `Person` entities.
    pub people: Arc<MemoryEntityStore>,
    /// The store backing `Order` entities.
    pub orders: Arc<MemoryEntityStore>,
}

impl ShopFixture {
    /// Assembles the domain with both entity types on one store.
    pub fn single_store() -> Self {
        let store = Arc::new(MemoryEntityStore::new("shop"));
        Self::assemble(Arc::clone(&store), store)
    }

    /// Assembles the domain with each entity type on its own store.
    pub fn two_stores() -> Self {
        let people = Arc::new(MemoryEntityStore::new("people"));
        let orders = Arc::new(MemoryEntityStore::new("orders"));
        Self::assemble(people, orders)
    }

    /// Assembles the domain with lifecycle hooks on the `Person` binding.
    pub fn with_person_lifecycle(hooks: Arc<dyn EntityLifecycle>) -> Self {
        let people = Arc::new(MemoryEntityStore::new("people"));
        let orders = Arc::new(MemoryEntityStore::new("orders"));
        let finder = MemoryEntityFinder::for_stores([people.as_ref(), orders.as_ref()]);
        let module = Module::builder("shop")
            .entity_with_lifecycle(
                person_descriptor(),
                Arc::clone(&people) as Arc<dyn EntityStore>,
                hooks,
            )
            .entity(order_descriptor(), Arc::clone(&orders) as Arc<dyn EntityStore>)
            .identity_generator(Arc::new(UuidGenerator::new()))
            .finder(Arc::new(finder))
            .build();
        Self {
            factory: UnitOfWorkFactory::new(module),
            people,
            orders,
        }
    }

    fn assemble(people: Arc<MemoryEntityStore>, orders: Arc<MemoryEntityStore>) -> Self {
        let finder = MemoryEntityFinder::for_stores([people.as_ref(), orders.as_ref()]);
        let module = Module::builder("shop")
            .entity(person_descriptor(), Arc::clone(&people) as Arc<dyn EntityStore>)
            .entity(order_descriptor(), Arc::clone(&orders) as Arc<dyn EntityStore>)
            .identity_generator(Arc::new(UuidGenerator::new()))
            .finder(Arc::new(finder))
            .build();
        Self {
            factory: UnitOfWorkFactory::new(module),
            people,
            orders,
        }
    }

    /// Creates and commits a person, returning its reference.
    pub fn seed_person(&self, name: &str, age: i64) -> EntityReference {
        let uow = self.factory.new_unit_of_work();
        let person = uow
            .new_entity(&person_type())
            .expect("failed to create person");
        person.set_property("name", name).expect("failed to set name");
        person.set_property("age", age).expect("failed to set age");
        let reference = person.reference();
        uow.complete().expect("failed to commit person");
        reference
    }

    /// Creates and commits an order, returning its reference.
    pub fn seed_order(&self, total: i64) -> EntityReference {
        let uow = self.factory.new_unit_of_work();
        let order = uow
            .new_entity(&order_type())
            .expect("failed to create order");
        order.set_property("total", total).expect("failed to set total");
        let reference = order.reference();
        uow.complete().expect("failed to commit order");
        reference
    }
}
