//! # Workset Store
//!
//! Store contracts and the shared entity data model for workset sessions.
//!
//! This crate defines what a backing store must provide so the session
//! layer in `workset_core` can run units of work against it: identities,
//! references, versioned entity state, the store and finder traits, and
//! the query grammar finders interpret.
//!
//! ## Design Principles
//!
//! - Stores hold versioned state and never interpret property values
//! - Handles are per-session and transactional: prepare, then commit or
//!   cancel
//! - Conflict detection is optimistic, keyed on the version captured at
//!   load time
//! - Finders return references, never live entities
//! - Stores and finders must be `Send + Sync`; handles are per-session
//!
//! ## Available Implementations
//!
//! - [`MemoryEntityStore`] / [`MemoryEntityFinder`] - in-memory reference
//!   implementation for tests and ephemeral data
//!
//! ## Example
//!
//! ```rust
//! use std::time::SystemTime;
//! use workset_store::{
//!     EntityDescriptor, EntityReference, EntityStore, MemoryEntityStore, ModuleName, Usecase,
//! };
//!
//! let store = MemoryEntityStore::new("people");
//! let descriptor = EntityDescriptor::builder("Person", "people")
//!     .property("name")
//!     .build();
//!
//! let mut handle =
//!     store.new_unit_of_work(&ModuleName::new("people"), &Usecase::default(), SystemTime::now());
//! let state = handle
//!     .new_entity_state(&descriptor, &EntityReference::parse("p1"))
//!     .unwrap();
//! state.set_property("name", serde_json::json!("Alice"));
//! handle.prepare().unwrap().commit().unwrap();
//!
//! assert!(store.contains(&EntityReference::parse("p1")));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod descriptor;
mod error;
mod finder;
mod identity;
mod memory;
mod query;
mod reference;
mod state;
mod store;
mod usecase;
mod version;

pub use descriptor::{
    AssociationArity, AssociationDescriptor, EntityDescriptor, EntityDescriptorBuilder,
    EntityType, ModuleName, PropertyDescriptor,
};
pub use error::{FinderError, StoreError, StoreResult};
pub use finder::EntityFinder;
pub use identity::{Identity, IdentityGenerator, UuidGenerator};
pub use memory::{MemoryEntityFinder, MemoryEntityStore};
pub use query::{CompareOp, Direction, Operand, OrderBy, Predicate, Variables};
pub use reference::EntityReference;
pub use state::{AssociationValue, EntityState, EntityStatus};
pub use store::{Committer, EntityStore, StoreHandle};
pub use usecase::Usecase;
pub use version::EntityVersion;
