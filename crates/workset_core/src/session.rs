//! The unit of work session.
//!
//! A [`UnitOfWork`] is the aggregate root of this crate: it owns the
//! identity map, opens one transactional handle per backing store touched,
//! and drives the prepare/commit/cancel protocol across all of them when
//! the session completes. Sessions are confined to one logical execution
//! context and are handed out as cheap-clone handles.

use crate::builder::{EntityBuilder, StateResolver};
use crate::callback::{CompletionStatus, UnitOfWorkCallback};
use crate::entity::Entity;
use crate::error::{UowError, UowResult};
use crate::module::{EntityBinding, Module};
use crate::options::UnitOfWorkOptions;
use crate::snapshot::EntitySnapshot;
use crate::stack::UnitOfWorkStack;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use tracing::{debug, warn};
use workset_store::{
    AssociationValue, Committer, EntityReference, EntityStatus, EntityStore, EntityType, Identity,
    StoreError, StoreHandle, Usecase,
};

/// Lifecycle flags shared between a session and its entity instances.
///
/// Instances hold an `Rc` to the flags rather than to the session itself,
/// so closing the session invalidates every handle without a reference
/// cycle.
pub(crate) struct UowFlags {
    open: Cell<bool>,
    paused: Cell<bool>,
}

impl UowFlags {
    fn new() -> Self {
        Self {
            open: Cell::new(true),
            paused: Cell::new(false),
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open.get()
    }

    fn is_paused(&self) -> bool {
        self.paused.get()
    }

    fn close(&self) {
        self.open.set(false);
    }

    fn set_paused(&self, paused: bool) {
        self.paused.set(paused);
    }
}

struct StoreSlot {
    store: Arc<dyn EntityStore>,
    handle: Box<dyn StoreHandle>,
}

struct UowInner {
    module: Arc<Module>,
    usecase: Usecase,
    current_time: SystemTime,
    started: Instant,
    options: UnitOfWorkOptions,
    flags: Rc<UowFlags>,
    cache: RefCell<HashMap<EntityReference, Entity>>,
    stores: RefCell<Vec<StoreSlot>>,
    callbacks: RefCell<Vec<Rc<dyn UnitOfWorkCallback>>>,
    stack: UnitOfWorkStack,
}

/// A transactional working-set session over the entities of one module.
///
/// Entities read or created through the session enter an identity map, so
/// one reference resolves to one instance for the session's whole lifetime.
/// Each distinct backing store touched gets one lazily-opened
/// [`StoreHandle`]; `complete` prepares every handle, then applies every
/// prepared change set, or cancels them all.
///
/// The handle is a cheap clone; all clones drive the same session.
/// Sessions are context-confined and deliberately not `Send`.
#[derive(Clone)]
pub struct UnitOfWork {
    inner: Rc<UowInner>,
}

impl UnitOfWork {
    pub(crate) fn open(
        module: Arc<Module>,
        usecase: Usecase,
        options: UnitOfWorkOptions,
        stack: UnitOfWorkStack,
    ) -> Self {
        let uow = Self {
            inner: Rc::new(UowInner {
                module,
                usecase,
                current_time: SystemTime::now(),
                started: Instant::now(),
                options,
                flags: Rc::new(UowFlags::new()),
                cache: RefCell::new(HashMap::new()),
                stores: RefCell::new(Vec::new()),
                callbacks: RefCell::new(Vec::new()),
                stack: stack.clone(),
            }),
        };
        debug!(
            module = %uow.inner.module.name(),
            usecase = %uow.inner.usecase,
            "unit of work opened"
        );
        stack.push(uow.clone());
        uow
    }

    /// Returns the module the session operates on.
    #[must_use]
    pub fn module(&self) -> &Arc<Module> {
        &self.inner.module
    }

    /// Returns the usecase the session was opened under.
    #[must_use]
    pub fn usecase(&self) -> &Usecase {
        &self.inner.usecase
    }

    /// Returns the wall-clock time snapshot taken when the session opened.
    ///
    /// The value is fixed for the session's lifetime so every store sees
    /// the same notion of "now".
    #[must_use]
    pub fn current_time(&self) -> SystemTime {
        self.inner.current_time
    }

    /// Returns the options the session was opened with.
    #[must_use]
    pub fn options(&self) -> UnitOfWorkOptions {
        self.inner.options
    }

    /// Returns true until the session completes or is discarded.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.inner.flags.is_open()
    }

    /// Returns true while the session is paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.inner.flags.is_paused()
    }

    /// Returns true if both handles drive the same session.
    #[must_use]
    pub fn same(a: &UnitOfWork, b: &UnitOfWork) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }

    /// Fetches the entity behind a reference, loading it on first access.
    ///
    /// Candidate bindings are tried in module registration order; the first
    /// store that yields state wins. The loaded instance enters the
    /// identity map, so repeated calls for the same reference return the
    /// same instance.
    ///
    /// # Errors
    ///
    /// [`UowError::NoSuchEntityType`] if no binding exposes the requested
    /// type, or if the stored state's concrete type is not exposed under
    /// it. [`UowError::NoSuchEntity`] if no candidate store holds the
    /// reference, or the instance was removed in this session.
    /// [`UowError::IllegalState`] on a closed session.
    pub fn get(&self, entity_type: &EntityType, reference: &EntityReference) -> UowResult<Entity> {
        self.ensure_open()?;
        let cached = self.inner.cache.borrow().get(reference).cloned();
        if let Some(cached) = cached {
            if cached.is_removed() {
                return Err(UowError::no_such_entity(reference.clone()));
            }
            return Ok(cached);
        }

        let candidates = self.inner.module.bindings_for(entity_type);
        if candidates.is_empty() {
            return Err(UowError::no_such_entity_type(
                entity_type.clone(),
                self.inner.module.name().clone(),
            ));
        }

        let mut found = None;
        for binding in &candidates {
            match self.with_store_handle(binding.store(), |handle| {
                handle.entity_state_of(reference)
            }) {
                Ok(state) => {
                    found = Some((state, Arc::clone(binding.store())));
                    break;
                }
                Err(err) if err.is_not_found() => continue,
                Err(err) => return Err(err.into()),
            }
        }
        let Some((state, store)) = found else {
            return Err(UowError::no_such_entity(reference.clone()));
        };

        let stored_type = state.entity_type();
        let Some(binding) = candidates
            .iter()
            .find(|binding| binding.descriptor().entity_type() == &stored_type)
        else {
            return Err(UowError::no_such_entity_type(
                stored_type,
                self.inner.module.name().clone(),
            ));
        };

        let entity = Entity::new(
            Arc::clone(binding.descriptor()),
            state,
            binding.lifecycle().cloned(),
            store,
            Rc::clone(&self.inner.flags),
        );
        self.inner
            .cache
            .borrow_mut()
            .insert(reference.clone(), entity.clone());
        Ok(entity)
    }

    /// Creates an entity with generated identity and default state.
    ///
    /// Shorthand for [`UnitOfWork::new_entity_builder`] plus `build`.
    ///
    /// # Errors
    ///
    /// As [`UnitOfWork::new_entity_builder`] and
    /// [`EntityBuilder::build`](crate::EntityBuilder::build).
    pub fn new_entity(&self, entity_type: &EntityType) -> UowResult<Entity> {
        self.new_entity_builder(entity_type)?.build()
    }

    /// Starts building an entity; its identity comes from the module's
    /// generator.
    ///
    /// The first binding (in registration order) whose descriptor exposes
    /// the requested type owns the new entity, so building an exposed
    /// secondary type yields that binding's primary type.
    ///
    /// # Errors
    ///
    /// [`UowError::NoSuchEntityType`] if no binding exposes the type,
    /// [`UowError::MissingIdentityGenerator`] if the module has no
    /// generator, [`UowError::IllegalState`] on a closed session.
    pub fn new_entity_builder(&self, entity_type: &EntityType) -> UowResult<EntityBuilder<'_>> {
        self.builder_with(entity_type, None, None)
    }

    /// Starts building an entity under a caller-supplied identity.
    ///
    /// # Errors
    ///
    /// [`UowError::NoSuchEntityType`] if no binding exposes the type,
    /// [`UowError::IllegalState`] on a closed session.
    pub fn new_entity_builder_with_identity(
        &self,
        entity_type: &EntityType,
        identity: Identity,
    ) -> UowResult<EntityBuilder<'_>> {
        self.builder_with(entity_type, Some(identity), None)
    }

    /// Starts building an entity pre-populated from a [`StateResolver`].
    ///
    /// Used by bulk import flows and [`UnitOfWork::merge_snapshot`];
    /// resolver values override descriptor defaults and are overridden by
    /// explicit builder sets.
    ///
    /// # Errors
    ///
    /// As [`UnitOfWork::new_entity_builder`], plus
    /// [`UowError::NoSuchAssociation`] if the resolver supplies an
    /// association value whose shape does not match the descriptor.
    pub fn new_entity_builder_with_state(
        &self,
        entity_type: &EntityType,
        identity: Option<Identity>,
        resolver: &dyn StateResolver,
    ) -> UowResult<EntityBuilder<'_>> {
        self.builder_with(entity_type, identity, Some(resolver))
    }

    fn builder_with<'a>(
        &'a self,
        entity_type: &EntityType,
        identity: Option<Identity>,
        resolver: Option<&dyn StateResolver>,
    ) -> UowResult<EntityBuilder<'a>> {
        self.ensure_open()?;
        let binding = self
            .inner
            .module
            .bindings_for(entity_type)
            .into_iter()
            .next()
            .cloned()
            .ok_or_else(|| {
                UowError::no_such_entity_type(
                    entity_type.clone(),
                    self.inner.module.name().clone(),
                )
            })?;
        let identity = match identity {
            Some(identity) => identity,
            None => {
                let generator = self.inner.module.identity_generator().ok_or_else(|| {
                    UowError::missing_identity_generator(self.inner.module.name().clone())
                })?;
                generator.generate(binding.descriptor().entity_type())
            }
        };
        EntityBuilder::new(self, binding, EntityReference::new(identity), resolver)
    }

    pub(crate) fn finalize_new_entity(
        &self,
        binding: EntityBinding,
        reference: EntityReference,
        properties: BTreeMap<String, Value>,
        associations: BTreeMap<String, AssociationValue>,
    ) -> UowResult<Entity> {
        self.ensure_open()?;
        if self.inner.cache.borrow().contains_key(&reference) {
            return Err(UowError::already_exists(reference));
        }

        let state = self
            .with_store_handle(binding.store(), |handle| {
                handle.new_entity_state(binding.descriptor(), &reference)
            })
            .map_err(|err| match err {
                StoreError::AlreadyExists { reference } => UowError::already_exists(reference),
                other => other.into(),
            })?;
        for (name, value) in properties {
            state.set_property(name, value);
        }
        for (name, value) in associations {
            state.set_association(name, value);
        }

        let entity = Entity::new(
            Arc::clone(binding.descriptor()),
            state,
            binding.lifecycle().cloned(),
            Arc::clone(binding.store()),
            Rc::clone(&self.inner.flags),
        );
        if let Some(hooks) = entity.lifecycle_hooks() {
            if let Err(err) = hooks.on_create(&entity) {
                self.with_store_handle(binding.store(), |handle| handle.forget(&reference));
                return Err(err.into());
            }
        }
        self.inner
            .cache
            .borrow_mut()
            .insert(reference, entity.clone());
        Ok(entity)
    }

    /// Removes an entity from the working set.
    ///
    /// `New` instances leave the identity map and their pending store
    /// allocation is dropped; `Loaded` and `Updated` instances are marked
    /// `Removed` in place, so later lookups consistently report not-found
    /// and completion deletes them from the store.
    ///
    /// # Errors
    ///
    /// [`UowError::IllegalState`] if the session is closed, the entity does
    /// not belong to this session, or it is already removed.
    /// [`UowError::Lifecycle`] if the `on_remove` hook aborts; the entity
    /// is left untouched.
    pub fn remove(&self, entity: &Entity) -> UowResult<()> {
        self.ensure_open()?;
        let reference = entity.reference();
        let cached = self.inner.cache.borrow().get(&reference).cloned();
        let belongs = cached.as_ref().is_some_and(|held| Entity::same(held, entity));
        if !belongs {
            return Err(UowError::illegal_state(
                "entity does not belong to this unit of work",
            ));
        }
        if entity.is_removed() {
            return Err(UowError::illegal_state("entity is already removed"));
        }
        if let Some(hooks) = entity.lifecycle_hooks() {
            hooks.on_remove(entity)?;
        }
        if entity.status() == EntityStatus::New {
            self.with_store_handle(entity.store(), |handle| handle.forget(&reference));
            self.inner.cache.borrow_mut().remove(&reference);
        } else {
            entity.state().mark_removed();
        }
        Ok(())
    }

    /// Suspends the session and pops it off the stack.
    ///
    /// With [`UnitOfWorkOptions::prune_on_pause`] set, every unmodified
    /// (`Loaded`) instance is evicted from the identity map; modified
    /// instances always survive.
    ///
    /// # Errors
    ///
    /// [`UowError::IllegalState`] if the session is closed or already
    /// paused.
    pub fn pause(&self) -> UowResult<()> {
        self.ensure_open()?;
        if self.inner.flags.is_paused() {
            return Err(UowError::illegal_state("unit of work is already paused"));
        }
        self.inner.flags.set_paused(true);
        self.inner.stack.remove(self);
        if self.inner.options.prunes_on_pause() {
            let mut cache = self.inner.cache.borrow_mut();
            let before = cache.len();
            cache.retain(|_, entity| entity.status() != EntityStatus::Loaded);
            let evicted = before - cache.len();
            if evicted > 0 {
                debug!(evicted, "pruned unmodified instances on pause");
            }
        }
        Ok(())
    }

    /// Reactivates a paused session and pushes it back onto the stack.
    ///
    /// # Errors
    ///
    /// [`UowError::IllegalState`] if the session is closed or not paused.
    pub fn resume(&self) -> UowResult<()> {
        self.ensure_open()?;
        if !self.inner.flags.is_paused() {
            return Err(UowError::illegal_state("unit of work is not paused"));
        }
        self.inner.flags.set_paused(false);
        self.inner.stack.push(self.clone());
        Ok(())
    }

    /// Registers a completion callback on this session.
    ///
    /// The callback list is snapshotted when completion starts, so
    /// registration during completion affects only later sessions.
    pub fn register_callback(&self, callback: Rc<dyn UnitOfWorkCallback>) {
        self.inner.callbacks.borrow_mut().push(callback);
    }

    /// Unregisters a previously registered callback, by identity.
    pub fn unregister_callback(&self, callback: &Rc<dyn UnitOfWorkCallback>) {
        self.inner
            .callbacks
            .borrow_mut()
            .retain(|held| !Rc::ptr_eq(held, callback));
    }

    /// Captures a detached snapshot of an entity's current state.
    ///
    /// The snapshot reflects uncommitted changes and has no session
    /// affinity.
    ///
    /// # Errors
    ///
    /// [`UowError::NoSuchEntity`] if the entity was removed,
    /// [`UowError::IllegalState`] on a closed session.
    pub fn snapshot_of(&self, entity: &Entity) -> UowResult<EntitySnapshot> {
        self.ensure_open()?;
        if entity.is_removed() {
            return Err(UowError::no_such_entity(entity.reference()));
        }
        let state = entity.state();
        Ok(EntitySnapshot::new(
            state.reference(),
            state.entity_type(),
            state.properties(),
            state.associations(),
        ))
    }

    /// Replays a snapshot into this session.
    ///
    /// If the snapshot's reference resolves, the live instance is
    /// overwritten with the snapshot's declared properties and
    /// associations; otherwise a new entity is created from the snapshot.
    ///
    /// # Errors
    ///
    /// Lookup and creation errors as [`UnitOfWork::get`] and
    /// [`EntityBuilder::build`](crate::EntityBuilder::build).
    pub fn merge_snapshot(&self, snapshot: &EntitySnapshot) -> UowResult<Entity> {
        self.ensure_open()?;
        match self.get(snapshot.entity_type(), snapshot.reference()) {
            Ok(entity) => {
                for property in entity.descriptor().properties() {
                    if let Some(value) = snapshot.property(property.name()) {
                        entity.set_property(property.name(), value.clone())?;
                    }
                }
                for association in entity.descriptor().associations() {
                    if let Some(value) = snapshot.association(association.name()) {
                        entity.apply_association_value(association.name(), value.clone())?;
                    }
                }
                Ok(entity)
            }
            Err(err) if err.is_no_such_entity() => {
                let identity = snapshot.reference().identity().clone();
                self.new_entity_builder_with_state(
                    snapshot.entity_type(),
                    Some(identity),
                    snapshot,
                )?
                .build()
            }
            Err(err) => Err(err),
        }
    }

    /// Commits every accumulated change atomically across all touched
    /// stores.
    ///
    /// Every store handle prepares first; only when all prepares and the
    /// before-completion hooks succeed are the prepared change sets
    /// applied, in store-handle creation order. On success the session
    /// closes and after-completion hooks run with
    /// [`CompletionStatus::Completed`]; their errors are logged and
    /// swallowed.
    ///
    /// # Errors
    ///
    /// [`UowError::ConcurrentModification`] if a store detected stale
    /// versions; carries the live handles of every conflicting entity in
    /// the working set. [`UowError::CompletionFailure`] for any other
    /// prepare or commit failure. [`UowError::Lifecycle`] if a
    /// before-completion hook aborted; every prepared change set is
    /// cancelled. In all three cases the session stays open, so the caller
    /// can reload and retry, or discard.
    pub fn complete(&self) -> UowResult<()> {
        self.ensure_open()?;
        let callbacks: Vec<Rc<dyn UnitOfWorkCallback>> = self.inner.callbacks.borrow().clone();
        let entities: Vec<Entity> = self.inner.cache.borrow().values().cloned().collect();

        let mut committers: Vec<Box<dyn Committer>> = Vec::new();
        let mut failure = None;
        {
            let mut stores = self.inner.stores.borrow_mut();
            for slot in stores.iter_mut() {
                match slot.handle.prepare() {
                    Ok(committer) => committers.push(committer),
                    Err(err) => {
                        failure = Some(err);
                        break;
                    }
                }
            }
        }
        if let Some(err) = failure {
            for committer in committers {
                committer.cancel();
            }
            return Err(self.translate_prepare_failure(err));
        }

        if let Err(err) = self.notify_before_completion(&callbacks, &entities) {
            for committer in committers {
                committer.cancel();
            }
            return Err(err);
        }

        let mut committers = committers.into_iter();
        while let Some(committer) = committers.next() {
            if let Err(err) = committer.commit() {
                for remaining in committers.by_ref() {
                    remaining.cancel();
                }
                warn!(
                    usecase = %self.inner.usecase,
                    error = %err,
                    "commit failed; remaining change sets cancelled"
                );
                return Err(UowError::completion_failure(err));
            }
        }

        self.close();
        self.notify_after_completion(&callbacks, &entities, CompletionStatus::Completed);
        debug!(
            module = %self.inner.module.name(),
            usecase = %self.inner.usecase,
            entities = entities.len(),
            elapsed_ms = self.inner.started.elapsed().as_millis() as u64,
            "unit of work completed"
        );
        Ok(())
    }

    /// Abandons the session and every accumulated change.
    ///
    /// Every store handle is discarded, the session closes, and
    /// after-completion hooks run with [`CompletionStatus::Discarded`].
    /// Idempotent: discarding a closed session is a no-op.
    pub fn discard(&self) {
        if !self.inner.flags.is_open() {
            return;
        }
        let callbacks: Vec<Rc<dyn UnitOfWorkCallback>> = self.inner.callbacks.borrow().clone();
        let entities: Vec<Entity> = self.inner.cache.borrow().values().cloned().collect();
        let slots: Vec<StoreSlot> = self.inner.stores.borrow_mut().drain(..).collect();
        for slot in slots {
            slot.handle.discard();
        }
        self.close();
        self.notify_after_completion(&callbacks, &entities, CompletionStatus::Discarded);
        debug!(
            module = %self.inner.module.name(),
            usecase = %self.inner.usecase,
            elapsed_ms = self.inner.started.elapsed().as_millis() as u64,
            "unit of work discarded"
        );
    }

    pub(crate) fn ensure_open(&self) -> UowResult<()> {
        if !self.inner.flags.is_open() {
            return Err(UowError::illegal_state("unit of work is closed"));
        }
        Ok(())
    }

    /// Runs `f` against the handle for `store`, opening it on first touch.
    ///
    /// Handles are deduplicated by store allocation identity; their
    /// creation order is the commit order.
    fn with_store_handle<T>(
        &self,
        store: &Arc<dyn EntityStore>,
        f: impl FnOnce(&mut dyn StoreHandle) -> T,
    ) -> T {
        let mut stores = self.inner.stores.borrow_mut();
        if let Some(slot) = stores
            .iter_mut()
            .find(|slot| Arc::ptr_eq(&slot.store, store))
        {
            return f(slot.handle.as_mut());
        }
        debug!(store = store.name(), "opening store handle");
        let mut handle = store.new_unit_of_work(
            self.inner.module.name(),
            &self.inner.usecase,
            self.inner.current_time,
        );
        let result = f(handle.as_mut());
        stores.push(StoreSlot {
            store: Arc::clone(store),
            handle,
        });
        result
    }

    fn translate_prepare_failure(&self, err: StoreError) -> UowError {
        match err {
            StoreError::VersionConflict { references } => {
                let cache = self.inner.cache.borrow();
                let entities: Vec<Entity> = references
                    .iter()
                    .filter_map(|reference| cache.get(reference).cloned())
                    .collect();
                warn!(
                    usecase = %self.inner.usecase,
                    conflicts = entities.len(),
                    "completion hit concurrent modification"
                );
                UowError::concurrent_modification(entities)
            }
            other => UowError::completion_failure(other),
        }
    }

    fn notify_before_completion(
        &self,
        callbacks: &[Rc<dyn UnitOfWorkCallback>],
        entities: &[Entity],
    ) -> UowResult<()> {
        for callback in callbacks {
            callback.before_completion()?;
        }
        for entity in entities {
            if entity.is_removed() {
                continue;
            }
            if let Some(hooks) = entity.lifecycle_hooks() {
                hooks.before_completion(entity)?;
            }
        }
        Ok(())
    }

    fn notify_after_completion(
        &self,
        callbacks: &[Rc<dyn UnitOfWorkCallback>],
        entities: &[Entity],
        status: CompletionStatus,
    ) {
        for callback in callbacks {
            if let Err(err) = callback.after_completion(status) {
                warn!(error = %err, ?status, "after-completion callback failed; ignored");
            }
        }
        for entity in entities {
            if entity.is_removed() {
                continue;
            }
            if let Some(hooks) = entity.lifecycle_hooks() {
                if let Err(err) = hooks.after_completion(entity, status) {
                    warn!(
                        error = %err,
                        reference = %entity.reference(),
                        "after-completion hook failed; ignored"
                    );
                }
            }
        }
    }

    fn close(&self) {
        self.inner.flags.close();
        if !self.inner.flags.is_paused() {
            self.inner.stack.remove(self);
        }
        self.inner.cache.borrow_mut().clear();
        self.inner.stores.borrow_mut().clear();
        self.inner.callbacks.borrow_mut().clear();
    }
}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("module", self.inner.module.name())
            .field("usecase", &self.inner.usecase)
            .field("open", &self.is_open())
            .field("paused", &self.is_paused())
            .field("cached", &self.inner.cache.borrow().len())
            .finish_non_exhaustive()
    }
}
