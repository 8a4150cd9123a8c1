//! Entity store contracts.

use crate::descriptor::{EntityDescriptor, ModuleName};
use crate::error::StoreResult;
use crate::reference::EntityReference;
use crate::state::EntityState;
use crate::usecase::Usecase;
use std::time::SystemTime;

/// A persistent backing store for entities.
///
/// A store is the durable side of the system: sessions open one
/// [`StoreHandle`] per store they touch and funnel every read and write
/// through it. Stores do not interpret property values beyond holding them.
///
/// # Invariants
///
/// - `new_unit_of_work` returns an isolated handle: nothing the handle does
///   is visible to other handles before its committer is applied
/// - Stores must be `Send + Sync`; one store serves many sessions across
///   many execution contexts
/// - Durability is entirely the store's concern; the session layer only
///   sequences prepare/commit/cancel
///
/// # Implementors
///
/// - [`crate::MemoryEntityStore`] - the in-memory reference store
pub trait EntityStore: Send + Sync {
    /// Returns the store name, used in diagnostics.
    fn name(&self) -> &str;

    /// Opens a transactional handle for one session.
    ///
    /// `owner` is the module the session belongs to, `usecase` and
    /// `current_time` are the session's execution metadata and fixed time
    /// snapshot. Stores may record them for diagnostics or time-stamping.
    fn new_unit_of_work(
        &self,
        owner: &ModuleName,
        usecase: &Usecase,
        current_time: SystemTime,
    ) -> Box<dyn StoreHandle>;
}

/// Per-session transactional handle onto one store.
///
/// A handle accumulates every state it vended; at prepare time it turns the
/// modified ones into a [`Committer`]. Handles are confined to the session's
/// execution context and may block on I/O in `entity_state_of`, `prepare`
/// and `discard`.
pub trait StoreHandle {
    /// Fetches the current state of an entity.
    ///
    /// Every call performs a fresh read; the session's identity map is what
    /// prevents duplicate loads. The returned state has status `Loaded` and
    /// carries the store's current version.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::NotFound`] if the store holds no state
    /// for the reference.
    fn entity_state_of(&mut self, reference: &EntityReference) -> StoreResult<EntityState>;

    /// Allocates state for a new entity.
    ///
    /// The returned state has status `New`. The allocation is pending: it
    /// becomes durable only when the handle's committer is applied.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::AlreadyExists`] if the store already
    /// holds state for the reference, or if the reference was already
    /// allocated through this handle.
    fn new_entity_state(
        &mut self,
        descriptor: &EntityDescriptor,
        reference: &EntityReference,
    ) -> StoreResult<EntityState>;

    /// Drops a pending allocation.
    ///
    /// Used when a `New` entity is removed before completion. Unknown
    /// references are ignored.
    fn forget(&mut self, reference: &EntityReference);

    /// Prepares all accumulated changes.
    ///
    /// On success the returned [`Committer`] will apply (or cancel) exactly
    /// the changes visible in the handle's states at this point; later
    /// mutations are not picked up.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::VersionConflict`] naming every entity
    /// whose stored version no longer matches the version captured at load
    /// time, or another error if the store cannot prepare.
    fn prepare(&mut self) -> StoreResult<Box<dyn Committer>>;

    /// Abandons the handle and every pending change.
    fn discard(self: Box<Self>);
}

/// A prepared, not-yet-applied change set from one store.
pub trait Committer {
    /// Applies the prepared changes.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails to apply; the change set is
    /// consumed either way.
    fn commit(self: Box<Self>) -> StoreResult<()>;

    /// Abandons the prepared changes.
    fn cancel(self: Box<Self>);
}

impl std::fmt::Debug for dyn Committer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Committer")
    }
}
