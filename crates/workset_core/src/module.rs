//! Module assembly: entity bindings, identity generation, finder lookup.

use crate::callback::EntityLifecycle;
use std::fmt;
use std::sync::Arc;
use workset_store::{
    EntityDescriptor, EntityFinder, EntityStore, EntityType, IdentityGenerator, ModuleName,
};

/// One entity type wired to its owning store.
///
/// A binding pairs a descriptor with the store that holds its state and,
/// optionally, lifecycle hooks invoked by sessions. Bindings are consulted
/// in registration order; the first binding exposing a type wins.
#[derive(Clone)]
pub struct EntityBinding {
    descriptor: Arc<EntityDescriptor>,
    store: Arc<dyn EntityStore>,
    lifecycle: Option<Arc<dyn EntityLifecycle>>,
}

impl EntityBinding {
    /// Returns the bound descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &Arc<EntityDescriptor> {
        &self.descriptor
    }

    /// Returns the store owning entities of this type.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    /// Returns the lifecycle hooks for this type, if any.
    #[must_use]
    pub fn lifecycle(&self) -> Option<&Arc<dyn EntityLifecycle>> {
        self.lifecycle.as_ref()
    }
}

impl fmt::Debug for EntityBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityBinding")
            .field("descriptor", &self.descriptor)
            .field("store", &self.store.name())
            .finish_non_exhaustive()
    }
}

/// A named assembly of entity bindings over one or more stores.
///
/// Modules are immutable after build and shared (`Arc`) between the
/// factories of every execution context. Sessions read them to resolve
/// which store owns a type, how identities are generated, and which finder
/// executes queries.
pub struct Module {
    name: ModuleName,
    bindings: Vec<EntityBinding>,
    identity_generator: Option<Arc<dyn IdentityGenerator>>,
    finder: Option<Arc<dyn EntityFinder>>,
}

impl Module {
    /// Starts building a module with the given name.
    #[must_use]
    pub fn builder(name: impl Into<ModuleName>) -> ModuleBuilder {
        ModuleBuilder {
            name: name.into(),
            bindings: Vec::new(),
            identity_generator: None,
            finder: None,
        }
    }

    /// Returns the module name.
    #[must_use]
    pub fn name(&self) -> &ModuleName {
        &self.name
    }

    /// Returns every binding in registration order.
    #[must_use]
    pub fn bindings(&self) -> &[EntityBinding] {
        &self.bindings
    }

    /// Returns every binding exposing the given type, in registration
    /// order.
    #[must_use]
    pub fn bindings_for(&self, entity_type: &EntityType) -> Vec<&EntityBinding> {
        self.bindings
            .iter()
            .filter(|binding| binding.descriptor.has_type(entity_type))
            .collect()
    }

    /// Returns the binding whose primary type matches exactly.
    #[must_use]
    pub fn binding_of(&self, entity_type: &EntityType) -> Option<&EntityBinding> {
        self.bindings
            .iter()
            .find(|binding| binding.descriptor.entity_type() == entity_type)
    }

    /// Returns the identity generator, if one was assembled.
    #[must_use]
    pub fn identity_generator(&self) -> Option<&Arc<dyn IdentityGenerator>> {
        self.identity_generator.as_ref()
    }

    /// Returns the finder, if one was assembled.
    #[must_use]
    pub fn finder(&self) -> Option<&Arc<dyn EntityFinder>> {
        self.finder.as_ref()
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("bindings", &self.bindings.len())
            .field("has_identity_generator", &self.identity_generator.is_some())
            .field("has_finder", &self.finder.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Module`].
pub struct ModuleBuilder {
    name: ModuleName,
    bindings: Vec<EntityBinding>,
    identity_generator: Option<Arc<dyn IdentityGenerator>>,
    finder: Option<Arc<dyn EntityFinder>>,
}

impl ModuleBuilder {
    /// Binds an entity type to its owning store.
    #[must_use]
    pub fn entity(mut self, descriptor: EntityDescriptor, store: Arc<dyn EntityStore>) -> Self {
        self.bindings.push(EntityBinding {
            descriptor: Arc::new(descriptor),
            store,
            lifecycle: None,
        });
        self
    }

    /// Binds an entity type with lifecycle hooks.
    #[must_use]
    pub fn entity_with_lifecycle(
        mut self,
        descriptor: EntityDescriptor,
        store: Arc<dyn EntityStore>,
        lifecycle: Arc<dyn EntityLifecycle>,
    ) -> Self {
        self.bindings.push(EntityBinding {
            descriptor: Arc::new(descriptor),
            store,
            lifecycle: Some(lifecycle),
        });
        self
    }

    /// Sets the identity generator used when builders allocate identities.
    #[must_use]
    pub fn identity_generator(mut self, generator: Arc<dyn IdentityGenerator>) -> Self {
        self.identity_generator = Some(generator);
        self
    }

    /// Sets the finder queries execute against.
    #[must_use]
    pub fn finder(mut self, finder: Arc<dyn EntityFinder>) -> Self {
        self.finder = Some(finder);
        self
    }

    /// Finalizes the module.
    #[must_use]
    pub fn build(self) -> Arc<Module> {
        Arc::new(Module {
            name: self.name,
            bindings: self.bindings,
            identity_generator: self.identity_generator,
            finder: self.finder,
        })
    }
}

impl fmt::Debug for ModuleBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleBuilder")
            .field("name", &self.name)
            .field("bindings", &self.bindings.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use workset_store::MemoryEntityStore;

    fn person() -> EntityDescriptor {
        EntityDescriptor::builder("Person", "people")
            .exposes("Nameable")
            .property("name")
            .build()
    }

    fn company() -> EntityDescriptor {
        EntityDescriptor::builder("Company", "people")
            .exposes("Nameable")
            .property("name")
            .build()
    }

    #[test]
    fn bindings_for_matches_exposed_types_in_order() {
        let store: Arc<dyn EntityStore> = Arc::new(MemoryEntityStore::new("people"));
        let module = Module::builder("people")
            .entity(person(), Arc::clone(&store))
            .entity(company(), Arc::clone(&store))
            .build();

        let nameable = module.bindings_for(&EntityType::new("Nameable"));
        assert_eq!(nameable.len(), 2);
        assert_eq!(nameable[0].descriptor().entity_type(), &EntityType::new("Person"));

        let person_only = module.bindings_for(&EntityType::new("Person"));
        assert_eq!(person_only.len(), 1);
    }

    #[test]
    fn binding_of_matches_primary_type_only() {
        let store: Arc<dyn EntityStore> = Arc::new(MemoryEntityStore::new("people"));
        let module = Module::builder("people").entity(person(), store).build();

        assert!(module.binding_of(&EntityType::new("Person")).is_some());
        assert!(module.binding_of(&EntityType::new("Nameable")).is_none());
    }

    #[test]
    fn generator_and_finder_default_to_absent() {
        let module = Module::builder("empty").build();
        assert!(module.identity_generator().is_none());
        assert!(module.finder().is_none());
        assert!(module.bindings().is_empty());
    }
}
