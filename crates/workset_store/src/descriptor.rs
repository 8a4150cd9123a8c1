//! Static entity-type metadata.
//!
//! Descriptors describe the state shape of an entity type (properties and
//! associations) and which module owns it. They are assembled once at
//! startup and only read by sessions and stores afterwards.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Name of an entity type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityType(String);

impl EntityType {
    /// Creates an entity type name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the type name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EntityType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Name of a module (an assembly of entity types and services).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleName(String);

impl ModuleName {
    /// Creates a module name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the module name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ModuleName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Describes one property of an entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    /// Property name, unique within the entity type.
    name: String,
    /// Default value seeded into freshly created entities.
    default: Option<Value>,
}

impl PropertyDescriptor {
    /// Creates a property descriptor without a default value.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
        }
    }

    /// Creates a property descriptor with a default value.
    #[must_use]
    pub fn with_default(name: impl Into<String>, default: Value) -> Self {
        Self {
            name: name.into(),
            default: Some(default),
        }
    }

    /// Returns the property name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the default value, if any.
    #[must_use]
    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }
}

/// Arity of an association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssociationArity {
    /// At most one referenced entity.
    One,
    /// An ordered list of referenced entities.
    Many,
    /// Referenced entities keyed by name.
    Named,
}

/// Describes one association of an entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationDescriptor {
    /// Association name, unique within the entity type.
    name: String,
    /// How many entities the association may reference.
    arity: AssociationArity,
}

impl AssociationDescriptor {
    /// Creates an association descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>, arity: AssociationArity) -> Self {
        Self {
            name: name.into(),
            arity,
        }
    }

    /// Returns the association name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the association arity.
    #[must_use]
    pub fn arity(&self) -> AssociationArity {
        self.arity
    }
}

/// Static metadata for one entity type.
///
/// A descriptor names the type, the module that owns it, the extra types it
/// is exposed as (so `get` can resolve an entity through an interface-like
/// type), and the shape of its state. Sessions only read descriptors; they
/// are built once during assembly.
///
/// # Example
///
/// ```rust
/// use workset_store::{AssociationArity, EntityDescriptor};
/// use serde_json::json;
///
/// let person = EntityDescriptor::builder("Person", "people")
///     .exposes("Nameable")
///     .property("name")
///     .property_with_default("active", json!(true))
///     .association("spouse", AssociationArity::One)
///     .association("friends", AssociationArity::Many)
///     .build();
///
/// assert!(person.has_type(&"Nameable".into()));
/// assert!(person.property("name").is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    /// Primary entity type.
    entity_type: EntityType,
    /// Module that owns this type.
    module: ModuleName,
    /// All types this entity is visible as (primary type first).
    types: Vec<EntityType>,
    /// Property descriptors.
    properties: Vec<PropertyDescriptor>,
    /// Association descriptors.
    associations: Vec<AssociationDescriptor>,
}

impl EntityDescriptor {
    /// Starts building a descriptor for the given primary type and module.
    #[must_use]
    pub fn builder(
        entity_type: impl Into<EntityType>,
        module: impl Into<ModuleName>,
    ) -> EntityDescriptorBuilder {
        EntityDescriptorBuilder::new(entity_type.into(), module.into())
    }

    /// Returns the primary entity type.
    #[must_use]
    pub fn entity_type(&self) -> &EntityType {
        &self.entity_type
    }

    /// Returns the owning module name.
    #[must_use]
    pub fn module(&self) -> &ModuleName {
        &self.module
    }

    /// Returns all types this entity is visible as, primary type first.
    #[must_use]
    pub fn types(&self) -> &[EntityType] {
        &self.types
    }

    /// Returns true if this entity is visible as the given type.
    #[must_use]
    pub fn has_type(&self, entity_type: &EntityType) -> bool {
        self.types.contains(entity_type)
    }

    /// Returns all property descriptors.
    #[must_use]
    pub fn properties(&self) -> &[PropertyDescriptor] {
        &self.properties
    }

    /// Returns all association descriptors.
    #[must_use]
    pub fn associations(&self) -> &[AssociationDescriptor] {
        &self.associations
    }

    /// Looks up a property descriptor by name.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name() == name)
    }

    /// Looks up an association descriptor by name.
    #[must_use]
    pub fn association(&self, name: &str) -> Option<&AssociationDescriptor> {
        self.associations.iter().find(|a| a.name() == name)
    }
}

impl fmt::Display for EntityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.entity_type)
    }
}

/// Builder for [`EntityDescriptor`].
#[derive(Debug)]
pub struct EntityDescriptorBuilder {
    entity_type: EntityType,
    module: ModuleName,
    extra_types: Vec<EntityType>,
    properties: Vec<PropertyDescriptor>,
    associations: Vec<AssociationDescriptor>,
}

impl EntityDescriptorBuilder {
    fn new(entity_type: EntityType, module: ModuleName) -> Self {
        Self {
            entity_type,
            module,
            extra_types: Vec::new(),
            properties: Vec::new(),
            associations: Vec::new(),
        }
    }

    /// Exposes the entity under an additional type name.
    #[must_use]
    pub fn exposes(mut self, entity_type: impl Into<EntityType>) -> Self {
        self.extra_types.push(entity_type.into());
        self
    }

    /// Adds a property without a default value.
    #[must_use]
    pub fn property(mut self, name: impl Into<String>) -> Self {
        self.properties.push(PropertyDescriptor::new(name));
        self
    }

    /// Adds a property with a default value.
    #[must_use]
    pub fn property_with_default(mut self, name: impl Into<String>, default: Value) -> Self {
        self.properties
            .push(PropertyDescriptor::with_default(name, default));
        self
    }

    /// Adds an association of the given arity.
    #[must_use]
    pub fn association(mut self, name: impl Into<String>, arity: AssociationArity) -> Self {
        self.associations
            .push(AssociationDescriptor::new(name, arity));
        self
    }

    /// Finishes the descriptor.
    #[must_use]
    pub fn build(self) -> EntityDescriptor {
        let mut types = Vec::with_capacity(1 + self.extra_types.len());
        types.push(self.entity_type.clone());
        types.extend(self.extra_types);
        EntityDescriptor {
            entity_type: self.entity_type,
            module: self.module,
            types,
            properties: self.properties,
            associations: self.associations,
        }
    }
}
