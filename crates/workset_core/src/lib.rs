//! # Workset Core
//!
//! Transactional working-set sessions over pluggable entity stores.
//!
//! This crate provides:
//! - Unit of work sessions with an identity-mapped entity cache
//! - Two-phase completion (prepare all, then commit all or cancel all)
//! - Optimistic-concurrency conflict reporting with live entity handles
//! - Pause/resume with an explicit per-context session stack
//! - Entity builders, lifecycle hooks and completion callbacks
//! - Detached entity snapshots for bulk import/export
//! - Deferred queries resolved through the session's identity map
//!
//! ## Architecture
//!
//! A [`UnitOfWork`] is a bounded working set: entities read or created
//! through it enter an identity map, so one reference maps to one live
//! instance for the session's lifetime. Each distinct backing store
//! touched gets one lazily-opened transactional handle. `complete` drives
//! the **prepare-then-commit** protocol across every handle; any prepare
//! failure cancels the prepared change sets and leaves the session open
//! for retry, with version conflicts translated into the live entity
//! handles that went stale.
//!
//! Sessions are confined to one logical execution context and handed out
//! as cheap clones; stores and finders are `Send + Sync` and shared.
//!
//! ## Key Invariants
//!
//! - At most one entity instance per reference per session
//! - The store-handle set only grows until the session closes
//! - A removed instance is never returned by a later lookup
//! - The session stack tracks exactly the open, non-paused sessions
//! - No store commit is applied unless every store prepared
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use workset_core::{Module, UnitOfWorkFactory};
//! use workset_store::{EntityDescriptor, EntityType, MemoryEntityStore, UuidGenerator};
//!
//! # fn main() -> Result<(), workset_core::UowError> {
//! let descriptor = EntityDescriptor::builder("Person", "people")
//!     .property("name")
//!     .build();
//! let module = Module::builder("people")
//!     .entity(descriptor, Arc::new(MemoryEntityStore::new("people")))
//!     .identity_generator(Arc::new(UuidGenerator::new()))
//!     .build();
//! let factory = UnitOfWorkFactory::new(module);
//!
//! let uow = factory.new_unit_of_work();
//! let person = uow.new_entity(&EntityType::new("Person"))?;
//! person.set_property("name", "Astrid")?;
//! let reference = person.reference();
//! uow.complete()?;
//!
//! let uow = factory.new_unit_of_work();
//! let person = uow.get(&EntityType::new("Person"), &reference)?;
//! assert_eq!(person.property::<String>("name")?, "Astrid");
//! uow.discard();
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod builder;
mod callback;
mod entity;
mod error;
mod module;
mod options;
mod query;
mod session;
mod snapshot;
mod stack;

pub use builder::{EntityBuilder, StateResolver};
pub use callback::{CompletionStatus, EntityLifecycle, UnitOfWorkCallback};
pub use entity::Entity;
pub use error::{LifecycleError, UowError, UowResult};
pub use module::{EntityBinding, Module, ModuleBuilder};
pub use options::UnitOfWorkOptions;
pub use query::{Query, QueryBuilder, QueryStream};
pub use session::UnitOfWork;
pub use snapshot::EntitySnapshot;
pub use stack::{UnitOfWorkFactory, UnitOfWorkStack};
