//! Scripted store doubles for completion-protocol tests.
//!
//! Each double wraps an in-memory store, so sessions load and create
//! entities normally; only the protocol step under test is altered.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use workset_store::{
    Committer, EntityDescriptor, EntityReference, EntityState, EntityStore, MemoryEntityStore,
    ModuleName, StoreError, StoreHandle, StoreResult, Usecase,
};

/// Shared, append-only log of store interactions.
///
/// A cheap-clone handle; clones share one log. Doubles record entries as
/// `"{store}:{event}"`, so one log threaded through several stores shows
/// the exact interleaving of the completion protocol.
#[derive(Clone, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one entry.
    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    /// Returns a snapshot of all entries in order.
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Returns the entries ending in `suffix`, in order.
    pub fn entries_matching(&self, suffix: &str) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|entry| entry.ends_with(suffix))
            .cloned()
            .collect()
    }

    /// Discards all recorded entries.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl fmt::Debug for CallLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallLog")
            .field("entries", &self.entries.lock().len())
            .finish()
    }
}

/// Wraps a store and records every call against a shared [`CallLog`].
pub struct RecordingStore {
    inner: Arc<dyn EntityStore>,
    log: CallLog,
}

impl RecordingStore {
    /// Wraps `inner`; calls are recorded as `"{inner name}:{event}"`.
    pub fn new(inner: Arc<dyn EntityStore>, log: CallLog) -> Self {
        Self { inner, log }
    }
}

impl EntityStore for RecordingStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn new_unit_of_work(
        &self,
        owner: &ModuleName,
        usecase: &Usecase,
        current_time: SystemTime,
    ) -> Box<dyn StoreHandle> {
        self.log.record(format!("{}:open", self.inner.name()));
        Box::new(RecordingHandle {
            name: self.inner.name().to_string(),
            inner: self.inner.new_unit_of_work(owner, usecase, current_time),
            log: self.log.clone(),
        })
    }
}

impl fmt::Debug for RecordingStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingStore")
            .field("name", &self.inner.name())
            .finish_non_exhaustive()
    }
}

struct RecordingHandle {
    name: String,
    inner: Box<dyn StoreHandle>,
    log: CallLog,
}

impl StoreHandle for RecordingHandle {
    fn entity_state_of(&mut self, reference: &EntityReference) -> StoreResult<EntityState> {
        self.log.record(format!("{}:fetch {reference}", self.name));
        self.inner.entity_state_of(reference)
    }

    fn new_entity_state(
        &mut self,
        descriptor: &EntityDescriptor,
        reference: &EntityReference,
    ) -> StoreResult<EntityState> {
        self.log.record(format!("{}:new {reference}", self.name));
        self.inner.new_entity_state(descriptor, reference)
    }

    fn forget(&mut self, reference: &EntityReference) {
        self.log.record(format!("{}:forget {reference}", self.name));
        self.inner.forget(reference);
    }

    fn prepare(&mut self) -> StoreResult<Box<dyn Committer>> {
        self.log.record(format!("{}:prepare", self.name));
        let inner = self.inner.prepare()?;
        Ok(Box::new(RecordingCommitter {
            name: self.name.clone(),
            inner,
            log: self.log.clone(),
        }))
    }

    fn discard(self: Box<Self>) {
        self.log.record(format!("{}:discard", self.name));
        self.inner.discard();
    }
}

struct RecordingCommitter {
    name: String,
    inner: Box<dyn Committer>,
    log: CallLog,
}

impl Committer for RecordingCommitter {
    fn commit(self: Box<Self>) -> StoreResult<()> {
        self.log.record(format!("{}:commit", self.name));
        self.inner.commit()
    }

    fn cancel(self: Box<Self>) {
        self.log.record(format!("{}:cancel", self.name));
        self.inner.cancel();
    }
}

/// A store whose prepare step fails with a backend error while armed.
///
/// Armed by default; disarm with [`FailingPrepareStore::set_failing`] to
/// let a seeding session commit.
pub struct FailingPrepareStore {
    inner: MemoryEntityStore,
    failing: Arc<AtomicBool>,
}

impl FailingPrepareStore {
    /// Creates an armed failing store.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: MemoryEntityStore::new(name),
            failing: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Arms or disarms the injected failure. Affects handles already open.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Returns the wrapped in-memory store, for committed-state asserts.
    pub fn store(&self) -> &MemoryEntityStore {
        &self.inner
    }
}

impl EntityStore for FailingPrepareStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn new_unit_of_work(
        &self,
        owner: &ModuleName,
        usecase: &Usecase,
        current_time: SystemTime,
    ) -> Box<dyn StoreHandle> {
        Box::new(FailingPrepareHandle {
            inner: self.inner.new_unit_of_work(owner, usecase, current_time),
            failing: Arc::clone(&self.failing),
        })
    }
}

impl fmt::Debug for FailingPrepareStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailingPrepareStore")
            .field("name", &self.inner.name())
            .field("failing", &self.failing.load(Ordering::SeqCst))
            .finish()
    }
}

struct FailingPrepareHandle {
    inner: Box<dyn StoreHandle>,
    failing: Arc<AtomicBool>,
}

impl StoreHandle for FailingPrepareHandle {
    fn entity_state_of(&mut self, reference: &EntityReference) -> StoreResult<EntityState> {
        self.inner.entity_state_of(reference)
    }

    fn new_entity_state(
        &mut self,
        descriptor: &EntityDescriptor,
        reference: &EntityReference,
    ) -> StoreResult<EntityState> {
        self.inner.new_entity_state(descriptor, reference)
    }

    fn forget(&mut self, reference: &EntityReference) {
        self.inner.forget(reference);
    }

    fn prepare(&mut self) -> StoreResult<Box<dyn Committer>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::backend("injected prepare failure"));
        }
        self.inner.prepare()
    }

    fn discard(self: Box<Self>) {
        self.inner.discard();
    }
}

/// A store whose prepare step reports a version conflict on scripted
/// references.
///
/// With nothing scripted it behaves exactly like the wrapped in-memory
/// store, so tests can seed state first and script the conflict after.
pub struct ConflictingPrepareStore {
    inner: MemoryEntityStore,
    conflicts: Arc<Mutex<Vec<EntityReference>>>,
}

impl ConflictingPrepareStore {
    /// Creates a store with no scripted conflicts.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: MemoryEntityStore::new(name),
            conflicts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Scripts a reference every later prepare reports as conflicting.
    pub fn conflict_on(&self, reference: EntityReference) {
        self.conflicts.lock().push(reference);
    }

    /// Removes every scripted conflict.
    pub fn clear_conflicts(&self) {
        self.conflicts.lock().clear();
    }

    /// Returns the wrapped in-memory store, for committed-state asserts.
    pub fn store(&self) -> &MemoryEntityStore {
        &self.inner
    }
}

impl EntityStore for ConflictingPrepareStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn new_unit_of_work(
        &self,
        owner: &ModuleName,
        usecase: &Usecase,
        current_time: SystemTime,
    ) -> Box<dyn StoreHandle> {
        Box::new(ConflictingPrepareHandle {
            inner: self.inner.new_unit_of_work(owner, usecase, current_time),
            conflicts: Arc::clone(&self.conflicts),
        })
    }
}

impl fmt::Debug for ConflictingPrepareStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConflictingPrepareStore")
            .field("name", &self.inner.name())
            .field("scripted", &self.conflicts.lock().len())
            .finish()
    }
}

struct ConflictingPrepareHandle {
    inner: Box<dyn StoreHandle>,
    conflicts: Arc<Mutex<Vec<EntityReference>>>,
}

impl StoreHandle for ConflictingPrepareHandle {
    fn entity_state_of(&mut self, reference: &EntityReference) -> StoreResult<EntityState> {
        self.inner.entity_state_of(reference)
    }

    fn new_entity_state(
        &mut self,
        descriptor: &EntityDescriptor,
        reference: &EntityReference,
    ) -> StoreResult<EntityState> {
        self.inner.new_entity_state(descriptor, reference)
    }

    fn forget(&mut self, reference: &EntityReference) {
        self.inner.forget(reference);
    }

    fn prepare(&mut self) -> StoreResult<Box<dyn Committer>> {
        let scripted = self.conflicts.lock().clone();
        if !scripted.is_empty() {
            return Err(StoreError::version_conflict(scripted));
        }
        self.inner.prepare()
    }

    fn discard(self: Box<Self>) {
        self.inner.discard();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{person_descriptor, person_type};
    use workset_core::{Module, UnitOfWorkFactory, UowError};
    use workset_store::UuidGenerator;

    fn factory_over(store: Arc<dyn EntityStore>) -> UnitOfWorkFactory {
        let module = Module::builder("shop")
            .entity(person_descriptor(), store)
            .identity_generator(Arc::new(UuidGenerator::new()))
            .build();
        UnitOfWorkFactory::new(module)
    }

    #[test]
    fn recording_store_logs_the_protocol_in_order() {
        let log = CallLog::new();
        let store = Arc::new(RecordingStore::new(
            Arc::new(MemoryEntityStore::new("people")),
            log.clone(),
        ));
        let factory = factory_over(store);

        let uow = factory.new_unit_of_work();
        let reference = uow.new_entity(&person_type()).unwrap().reference();
        uow.complete().unwrap();

        assert_eq!(
            log.entries(),
            vec![
                "people:open".to_string(),
                format!("people:new {reference}"),
                "people:prepare".to_string(),
                "people:commit".to_string(),
            ]
        );
    }

    #[test]
    fn failing_prepare_surfaces_as_completion_failure() {
        let store = Arc::new(FailingPrepareStore::new("people"));
        let factory = factory_over(Arc::clone(&store) as Arc<dyn EntityStore>);

        let uow = factory.new_unit_of_work();
        uow.new_entity(&person_type()).unwrap();
        let err = uow.complete().unwrap_err();

        assert!(matches!(err, UowError::CompletionFailure { .. }));
        assert!(uow.is_open());
        assert_eq!(store.store().entity_count(), 0);
        uow.discard();
    }

    #[test]
    fn disarmed_failing_store_commits_normally() {
        let store = Arc::new(FailingPrepareStore::new("people"));
        let factory = factory_over(Arc::clone(&store) as Arc<dyn EntityStore>);

        store.set_failing(false);
        let uow = factory.new_unit_of_work();
        uow.new_entity(&person_type()).unwrap();
        uow.complete().unwrap();

        assert_eq!(store.store().entity_count(), 1);
    }

    #[test]
    fn scripted_conflict_is_reported_by_prepare() {
        let store = Arc::new(ConflictingPrepareStore::new("people"));
        let factory = factory_over(Arc::clone(&store) as Arc<dyn EntityStore>);

        let seed = factory.new_unit_of_work();
        let reference = seed.new_entity(&person_type()).unwrap().reference();
        seed.complete().unwrap();

        store.conflict_on(reference.clone());
        let uow = factory.new_unit_of_work();
        let person = uow.get(&person_type(), &reference).unwrap();
        person.set_property("name", "doomed").unwrap();
        let err = uow.complete().unwrap_err();

        assert!(err.is_concurrent_modification());
        uow.discard();
    }
}
