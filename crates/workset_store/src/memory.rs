//! In-memory store and finder implementations.

use crate::descriptor::{EntityDescriptor, EntityType, ModuleName};
use crate::error::{FinderError, StoreError, StoreResult};
use crate::finder::EntityFinder;
use crate::query::{CompareOp, Direction, Operand, OrderBy, Predicate, Variables};
use crate::reference::EntityReference;
use crate::state::{AssociationValue, EntityState, EntityStatus};
use crate::store::{Committer, EntityStore, StoreHandle};
use crate::usecase::Usecase;
use crate::version::EntityVersion;
use parking_lot::Mutex;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

type CommittedMap = BTreeMap<EntityReference, CommittedState>;
type SharedMap = Arc<Mutex<CommittedMap>>;

#[derive(Debug, Clone)]
struct CommittedState {
    entity_type: EntityType,
    version: EntityVersion,
    properties: BTreeMap<String, Value>,
    associations: BTreeMap<String, AssociationValue>,
}

/// An [`EntityStore`] keeping all committed state in process memory.
///
/// Versions are validated at prepare and revalidated under the store lock
/// at commit, so two change sets prepared against the same version cannot
/// both apply. The store is the reference implementation for the session
/// layer and the workhorse of the test suites; it is not meant for durable
/// data.
#[derive(Debug, Default)]
pub struct MemoryEntityStore {
    name: String,
    committed: SharedMap,
}

impl MemoryEntityStore {
    /// Creates an empty store with the given diagnostic name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            committed: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Returns true if committed state exists for the reference.
    #[must_use]
    pub fn contains(&self, reference: &EntityReference) -> bool {
        self.committed.lock().contains_key(reference)
    }

    /// Returns the committed version of an entity, if present.
    #[must_use]
    pub fn version_of(&self, reference: &EntityReference) -> Option<EntityVersion> {
        self.committed.lock().get(reference).map(|stored| stored.version)
    }

    /// Returns a committed property value, if present.
    #[must_use]
    pub fn committed_property(&self, reference: &EntityReference, name: &str) -> Option<Value> {
        self.committed
            .lock()
            .get(reference)
            .and_then(|stored| stored.properties.get(name).cloned())
    }

    /// Returns the number of committed entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.committed.lock().len()
    }
}

impl EntityStore for MemoryEntityStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn new_unit_of_work(
        &self,
        _owner: &ModuleName,
        _usecase: &Usecase,
        _current_time: SystemTime,
    ) -> Box<dyn StoreHandle> {
        Box::new(MemoryStoreHandle {
            committed: Arc::clone(&self.committed),
            states: Vec::new(),
        })
    }
}

struct MemoryStoreHandle {
    committed: SharedMap,
    states: Vec<EntityState>,
}

impl MemoryStoreHandle {
    fn is_tracked(&self, reference: &EntityReference) -> bool {
        self.states.iter().any(|state| state.reference() == *reference)
    }
}

impl StoreHandle for MemoryStoreHandle {
    fn entity_state_of(&mut self, reference: &EntityReference) -> StoreResult<EntityState> {
        let stored = self
            .committed
            .lock()
            .get(reference)
            .cloned()
            .ok_or_else(|| StoreError::not_found(reference.clone()))?;
        let state = EntityState::loaded(
            reference.clone(),
            stored.entity_type,
            stored.version,
            stored.properties,
            stored.associations,
        );
        self.states.push(state.clone());
        Ok(state)
    }

    fn new_entity_state(
        &mut self,
        descriptor: &EntityDescriptor,
        reference: &EntityReference,
    ) -> StoreResult<EntityState> {
        if self.committed.lock().contains_key(reference) || self.is_tracked(reference) {
            return Err(StoreError::already_exists(reference.clone()));
        }
        let state = EntityState::new_entity(reference.clone(), descriptor.entity_type().clone());
        self.states.push(state.clone());
        Ok(state)
    }

    fn forget(&mut self, reference: &EntityReference) {
        self.states.retain(|state| state.reference() != *reference);
    }

    fn prepare(&mut self) -> StoreResult<Box<dyn Committer>> {
        let committed = self.committed.lock();
        let mut conflicts = Vec::new();
        let mut ops = Vec::new();
        for state in &self.states {
            let reference = state.reference();
            match state.status() {
                EntityStatus::Loaded => {}
                EntityStatus::New => {
                    if committed.contains_key(&reference) {
                        conflicts.push(reference);
                    } else {
                        ops.push(CommitOp::Insert {
                            reference,
                            entity_type: state.entity_type(),
                            properties: state.properties(),
                            associations: state.associations(),
                        });
                    }
                }
                EntityStatus::Updated => match committed.get(&reference) {
                    Some(stored) if stored.version == state.version() => {
                        ops.push(CommitOp::Update {
                            reference,
                            expected: state.version(),
                            properties: state.properties(),
                            associations: state.associations(),
                        });
                    }
                    _ => conflicts.push(reference),
                },
                EntityStatus::Removed => match committed.get(&reference) {
                    Some(stored) if stored.version == state.version() => {
                        ops.push(CommitOp::Remove {
                            reference,
                            expected: state.version(),
                        });
                    }
                    _ => conflicts.push(reference),
                },
            }
        }
        drop(committed);

        if !conflicts.is_empty() {
            return Err(StoreError::version_conflict(conflicts));
        }
        Ok(Box::new(MemoryCommitter {
            committed: Arc::clone(&self.committed),
            ops,
        }))
    }

    fn discard(self: Box<Self>) {}
}

enum CommitOp {
    Insert {
        reference: EntityReference,
        entity_type: EntityType,
        properties: BTreeMap<String, Value>,
        associations: BTreeMap<String, AssociationValue>,
    },
    Update {
        reference: EntityReference,
        expected: EntityVersion,
        properties: BTreeMap<String, Value>,
        associations: BTreeMap<String, AssociationValue>,
    },
    Remove {
        reference: EntityReference,
        expected: EntityVersion,
    },
}

struct MemoryCommitter {
    committed: SharedMap,
    ops: Vec<CommitOp>,
}

impl Committer for MemoryCommitter {
    fn commit(self: Box<Self>) -> StoreResult<()> {
        let mut committed = self.committed.lock();

        // Another committer may have applied between prepare and commit.
        let mut conflicts = Vec::new();
        for op in &self.ops {
            match op {
                CommitOp::Insert { reference, .. } => {
                    if committed.contains_key(reference) {
                        conflicts.push(reference.clone());
                    }
                }
                CommitOp::Update { reference, expected, .. }
                | CommitOp::Remove { reference, expected, .. } => {
                    match committed.get(reference) {
                        Some(stored) if stored.version == *expected => {}
                        _ => conflicts.push(reference.clone()),
                    }
                }
            }
        }
        if !conflicts.is_empty() {
            return Err(StoreError::version_conflict(conflicts));
        }

        for op in self.ops {
            match op {
                CommitOp::Insert {
                    reference,
                    entity_type,
                    properties,
                    associations,
                } => {
                    committed.insert(
                        reference,
                        CommittedState {
                            entity_type,
                            version: EntityVersion::initial(),
                            properties,
                            associations,
                        },
                    );
                }
                CommitOp::Update {
                    reference,
                    expected,
                    properties,
                    associations,
                } => {
                    if let Some(stored) = committed.get_mut(&reference) {
                        stored.version = expected.next();
                        stored.properties = properties;
                        stored.associations = associations;
                    }
                }
                CommitOp::Remove { reference, .. } => {
                    committed.remove(&reference);
                }
            }
        }
        Ok(())
    }

    fn cancel(self: Box<Self>) {}
}

/// An [`EntityFinder`] searching one or more [`MemoryEntityStore`]s.
///
/// Only committed state is searched. An absent property matches no
/// comparison, including `Ne`. Without sort keys, results are ordered by
/// reference.
#[derive(Debug, Default)]
pub struct MemoryEntityFinder {
    maps: Vec<SharedMap>,
}

impl MemoryEntityFinder {
    /// Builds a finder over a single store.
    #[must_use]
    pub fn for_store(store: &MemoryEntityStore) -> Self {
        Self {
            maps: vec![Arc::clone(&store.committed)],
        }
    }

    /// Builds a finder over several stores.
    ///
    /// A store listed more than once is searched once, keeping results
    /// duplicate-free.
    #[must_use]
    pub fn for_stores<'a>(stores: impl IntoIterator<Item = &'a MemoryEntityStore>) -> Self {
        let mut maps: Vec<SharedMap> = Vec::new();
        for store in stores {
            if !maps.iter().any(|map| Arc::ptr_eq(map, &store.committed)) {
                maps.push(Arc::clone(&store.committed));
            }
        }
        Self { maps }
    }

    fn matching(
        &self,
        entity_type: &EntityType,
        predicate: &Predicate,
        variables: &Variables,
    ) -> Result<Vec<(EntityReference, BTreeMap<String, Value>)>, FinderError> {
        let mut matches = Vec::new();
        for map in &self.maps {
            let committed = map.lock();
            for (reference, stored) in committed.iter() {
                if stored.entity_type != *entity_type {
                    continue;
                }
                if evaluate(predicate, &stored.properties, variables)? {
                    matches.push((reference.clone(), stored.properties.clone()));
                }
            }
        }
        Ok(matches)
    }
}

impl EntityFinder for MemoryEntityFinder {
    fn find_entity(
        &self,
        entity_type: &EntityType,
        predicate: &Predicate,
        variables: &Variables,
    ) -> Result<Option<EntityReference>, FinderError> {
        let results = self.find_entities(entity_type, predicate, &[], None, Some(1), variables)?;
        Ok(results.into_iter().next())
    }

    fn find_entities(
        &self,
        entity_type: &EntityType,
        predicate: &Predicate,
        order_by: &[OrderBy],
        first: Option<usize>,
        max: Option<usize>,
        variables: &Variables,
    ) -> Result<Vec<EntityReference>, FinderError> {
        let mut matches = self.matching(entity_type, predicate, variables)?;
        sort_matches(&mut matches, order_by);

        let skipped = matches.into_iter().skip(first.unwrap_or(0));
        let references = match max {
            Some(max) => skipped.take(max).map(|(reference, _)| reference).collect(),
            None => skipped.map(|(reference, _)| reference).collect(),
        };
        Ok(references)
    }

    fn count_entities(
        &self,
        entity_type: &EntityType,
        predicate: &Predicate,
        variables: &Variables,
    ) -> Result<u64, FinderError> {
        let matches = self.matching(entity_type, predicate, variables)?;
        Ok(matches.len() as u64)
    }
}

fn evaluate(
    predicate: &Predicate,
    properties: &BTreeMap<String, Value>,
    variables: &Variables,
) -> Result<bool, FinderError> {
    match predicate {
        Predicate::All => Ok(true),
        Predicate::Compare {
            property,
            op,
            operand,
        } => {
            let expected = match operand {
                Operand::Literal(value) => value,
                Operand::Variable(name) => variables.get(name).ok_or_else(|| {
                    FinderError::unsupported(format!("unbound query variable `{name}`"))
                })?,
            };
            Ok(properties
                .get(property)
                .is_some_and(|actual| value_matches(*op, actual, expected)))
        }
        Predicate::And(inner) => {
            for predicate in inner {
                if !evaluate(predicate, properties, variables)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Predicate::Or(inner) => {
            for predicate in inner {
                if evaluate(predicate, properties, variables)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Predicate::Not(inner) => Ok(!evaluate(inner, properties, variables)?),
    }
}

fn value_matches(op: CompareOp, actual: &Value, expected: &Value) -> bool {
    match op {
        CompareOp::Eq => actual == expected,
        CompareOp::Ne => actual != expected,
        CompareOp::Gt => compare_values(actual, expected) == Some(Ordering::Greater),
        CompareOp::Ge => matches!(
            compare_values(actual, expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        CompareOp::Lt => compare_values(actual, expected) == Some(Ordering::Less),
        CompareOp::Le => matches!(
            compare_values(actual, expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
    }
}

/// Orders numbers, strings and booleans; mixed kinds have no ordering.
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn sort_matches(matches: &mut [(EntityReference, BTreeMap<String, Value>)], order_by: &[OrderBy]) {
    matches.sort_by(|a, b| {
        for key in order_by {
            let ordering = match (a.1.get(&key.property), b.1.get(&key.property)) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
            };
            let ordering = match key.direction {
                Direction::Ascending => ordering,
                Direction::Descending => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        a.0.cmp(&b.0)
    });
}
