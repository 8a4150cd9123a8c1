//! Error types for the session layer.

use crate::entity::Entity;
use thiserror::Error;
use workset_store::{EntityReference, EntityType, FinderError, ModuleName, StoreError};

/// Convenience alias for session-layer results.
pub type UowResult<T> = Result<T, UowError>;

/// Failure raised by a user-supplied lifecycle hook or callback.
///
/// Hooks abort the surrounding operation by returning this; the message is
/// carried into [`UowError::Lifecycle`].
#[derive(Debug, Error)]
#[error("{message}")]
pub struct LifecycleError {
    message: String,
}

impl LifecycleError {
    /// Creates a lifecycle failure with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors raised by units of work.
#[derive(Debug, Error)]
pub enum UowError {
    /// No binding in the module exposes the requested entity type.
    #[error("no entity type `{entity_type}` in module `{module}`")]
    NoSuchEntityType {
        /// The requested type.
        entity_type: EntityType,
        /// The module that was searched.
        module: ModuleName,
    },

    /// The entity does not exist, or was removed in this session.
    #[error("no entity for reference {reference}")]
    NoSuchEntity {
        /// The unresolvable reference.
        reference: EntityReference,
    },

    /// An entity with this reference already exists.
    #[error("entity {reference} already exists")]
    EntityAlreadyExists {
        /// The duplicated reference.
        reference: EntityReference,
    },

    /// Another session committed the listed entities since this session
    /// loaded them.
    #[error("concurrent modification of {} entities", .entities.len())]
    ConcurrentModification {
        /// Live handles for every conflicting entity, so callers can see
        /// exactly what to reload. The session stays open.
        entities: Vec<Entity>,
    },

    /// A store failed while preparing or committing the session.
    #[error("completion failed: {source}")]
    CompletionFailure {
        /// The underlying store failure.
        #[source]
        source: StoreError,
    },

    /// The session is in the wrong state for the operation.
    #[error("illegal session state: {message}")]
    IllegalState {
        /// What was attempted and why it was refused.
        message: String,
    },

    /// Entity creation needed an identity but the module has no generator.
    #[error("module `{module}` has no identity generator")]
    MissingIdentityGenerator {
        /// The module missing a generator.
        module: ModuleName,
    },

    /// The descriptor does not declare this property.
    #[error("no property `{name}` on entity type `{entity_type}`")]
    NoSuchProperty {
        /// The entity type that was accessed.
        entity_type: EntityType,
        /// The unknown property name.
        name: String,
    },

    /// The descriptor does not declare this association with this arity.
    #[error("no association `{name}` on entity type `{entity_type}`")]
    NoSuchAssociation {
        /// The entity type that was accessed.
        entity_type: EntityType,
        /// The unknown or wrongly-shaped association name.
        name: String,
    },

    /// A property value could not be converted to or from its typed form.
    #[error("property `{name}`: {message}")]
    PropertyCodec {
        /// The property being converted.
        name: String,
        /// The conversion failure.
        message: String,
    },

    /// A lifecycle hook or callback aborted the operation.
    #[error("lifecycle hook failed: {source}")]
    Lifecycle {
        /// The hook's failure.
        #[from]
        source: LifecycleError,
    },

    /// The module has no finder to execute queries against.
    #[error("module `{module}` has no entity finder")]
    NoFinder {
        /// The module missing a finder.
        module: ModuleName,
    },

    /// The finder failed to execute a query.
    #[error("query failed: {source}")]
    Query {
        /// The finder's failure.
        #[from]
        source: FinderError,
    },

    /// A store operation failed outside the completion protocol.
    #[error("store failure: {source}")]
    Store {
        /// The underlying store failure.
        #[from]
        source: StoreError,
    },
}

impl UowError {
    /// Creates a [`UowError::NoSuchEntityType`] error.
    pub fn no_such_entity_type(entity_type: EntityType, module: ModuleName) -> Self {
        Self::NoSuchEntityType {
            entity_type,
            module,
        }
    }

    /// Creates a [`UowError::NoSuchEntity`] error.
    pub fn no_such_entity(reference: EntityReference) -> Self {
        Self::NoSuchEntity { reference }
    }

    /// Creates a [`UowError::EntityAlreadyExists`] error.
    pub fn already_exists(reference: EntityReference) -> Self {
        Self::EntityAlreadyExists { reference }
    }

    /// Creates a [`UowError::ConcurrentModification`] error.
    pub fn concurrent_modification(entities: Vec<Entity>) -> Self {
        Self::ConcurrentModification { entities }
    }

    /// Creates a [`UowError::CompletionFailure`] error.
    pub fn completion_failure(source: StoreError) -> Self {
        Self::CompletionFailure { source }
    }

    /// Creates a [`UowError::IllegalState`] error.
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState {
            message: message.into(),
        }
    }

    /// Creates a [`UowError::MissingIdentityGenerator`] error.
    pub fn missing_identity_generator(module: ModuleName) -> Self {
        Self::MissingIdentityGenerator { module }
    }

    /// Creates a [`UowError::NoSuchProperty`] error.
    pub fn no_such_property(entity_type: EntityType, name: impl Into<String>) -> Self {
        Self::NoSuchProperty {
            entity_type,
            name: name.into(),
        }
    }

    /// Creates a [`UowError::NoSuchAssociation`] error.
    pub fn no_such_association(entity_type: EntityType, name: impl Into<String>) -> Self {
        Self::NoSuchAssociation {
            entity_type,
            name: name.into(),
        }
    }

    /// Creates a [`UowError::PropertyCodec`] error.
    pub fn property_codec(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PropertyCodec {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates a [`UowError::NoFinder`] error.
    pub fn no_finder(module: ModuleName) -> Self {
        Self::NoFinder { module }
    }

    /// Returns true for [`UowError::ConcurrentModification`], the error
    /// retry loops branch on.
    #[must_use]
    pub fn is_concurrent_modification(&self) -> bool {
        matches!(self, Self::ConcurrentModification { .. })
    }

    /// Returns true for [`UowError::NoSuchEntity`].
    #[must_use]
    pub fn is_no_such_entity(&self) -> bool {
        matches!(self, Self::NoSuchEntity { .. })
    }
}
