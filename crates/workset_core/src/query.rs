//! Deferred queries executed through a session.
//!
//! Queries are composed independently of any session and bound at
//! execution time: the session's module supplies the finder, and every
//! reference the finder returns is re-resolved through the session's
//! identity map, so query results are the same instances other code in
//! the session already holds.

use crate::entity::Entity;
use crate::error::{UowError, UowResult};
use crate::session::UnitOfWork;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::trace;
use workset_store::{EntityFinder, EntityReference, EntityType, OrderBy, Predicate, Variables};

/// Composes a [`Query`] step by step.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    entity_type: EntityType,
    predicate: Predicate,
    order_by: Vec<OrderBy>,
    first_result: Option<usize>,
    max_results: Option<usize>,
    variables: Variables,
}

impl QueryBuilder {
    fn new(entity_type: EntityType) -> Self {
        Self {
            entity_type,
            predicate: Predicate::All,
            order_by: Vec::new(),
            first_result: None,
            max_results: None,
            variables: Variables::new(),
        }
    }

    /// Restricts results to entities matching the predicate.
    #[must_use]
    pub fn matching(mut self, predicate: Predicate) -> Self {
        self.predicate = predicate;
        self
    }

    /// Appends an ordering clause; earlier clauses take precedence.
    #[must_use]
    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    /// Skips the first `first` matches after ordering.
    #[must_use]
    pub fn first_result(mut self, first: usize) -> Self {
        self.first_result = Some(first);
        self
    }

    /// Caps how many matches are returned.
    #[must_use]
    pub fn max_results(mut self, max: usize) -> Self {
        self.max_results = Some(max);
        self
    }

    /// Binds a named variable referenced by the predicate.
    #[must_use]
    pub fn variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Finalizes the query.
    #[must_use]
    pub fn build(self) -> Query {
        Query {
            entity_type: self.entity_type,
            predicate: self.predicate,
            order_by: self.order_by,
            first_result: self.first_result,
            max_results: self.max_results,
            variables: self.variables,
        }
    }
}

/// A composed query, not yet bound to a session.
///
/// Execution resolves the finder from the session's module. References the
/// finder returns but the stores no longer hold are skipped rather than
/// failing the query; the finder's index is only eventually consistent
/// with store state.
#[derive(Debug, Clone)]
pub struct Query {
    entity_type: EntityType,
    predicate: Predicate,
    order_by: Vec<OrderBy>,
    first_result: Option<usize>,
    max_results: Option<usize>,
    variables: Variables,
}

impl Query {
    /// Starts composing a query for one entity type.
    #[must_use]
    pub fn of(entity_type: impl Into<EntityType>) -> QueryBuilder {
        QueryBuilder::new(entity_type.into())
    }

    /// Returns the entity type the query targets.
    #[must_use]
    pub fn entity_type(&self) -> &EntityType {
        &self.entity_type
    }

    /// Returns the query's predicate.
    #[must_use]
    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    /// Finds one matching entity, or none.
    ///
    /// # Errors
    ///
    /// [`UowError::NoFinder`] if the module has no finder,
    /// [`UowError::Query`] if the finder fails, [`UowError::IllegalState`]
    /// on a closed session.
    pub fn find(&self, uow: &UnitOfWork) -> UowResult<Option<Entity>> {
        let finder = self.finder_of(uow)?;
        let Some(reference) =
            finder.find_entity(&self.entity_type, &self.predicate, &self.variables)?
        else {
            return Ok(None);
        };
        match uow.get(&self.entity_type, &reference) {
            Ok(entity) => Ok(Some(entity)),
            Err(err) if err.is_no_such_entity() => {
                trace!(%reference, "finder returned a stale reference; skipped");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Counts matching entities.
    ///
    /// # Errors
    ///
    /// As [`Query::find`]; finder failures propagate rather than being
    /// reported as a zero count.
    pub fn count(&self, uow: &UnitOfWork) -> UowResult<u64> {
        let finder = self.finder_of(uow)?;
        Ok(finder.count_entities(&self.entity_type, &self.predicate, &self.variables)?)
    }

    /// Streams matching entities in finder order.
    ///
    /// The finder runs eagerly; entity resolution is lazy, so instances
    /// materialize in the identity map only as the stream is consumed.
    ///
    /// # Errors
    ///
    /// As [`Query::find`] for the finder call itself; per-entity resolution
    /// errors surface as stream items.
    pub fn stream<'a>(&self, uow: &'a UnitOfWork) -> UowResult<QueryStream<'a>> {
        let finder = self.finder_of(uow)?;
        let references = finder.find_entities(
            &self.entity_type,
            &self.predicate,
            &self.order_by,
            self.first_result,
            self.max_results,
            &self.variables,
        )?;
        Ok(QueryStream {
            uow,
            entity_type: self.entity_type.clone(),
            references: references.into_iter(),
        })
    }

    fn finder_of<'u>(&self, uow: &'u UnitOfWork) -> UowResult<&'u Arc<dyn EntityFinder>> {
        uow.ensure_open()?;
        uow.module()
            .finder()
            .ok_or_else(|| UowError::no_finder(uow.module().name().clone()))
    }
}

/// Lazy result sequence of one query execution.
///
/// Yields entities through the session's identity map; stale references
/// are skipped silently.
pub struct QueryStream<'a> {
    uow: &'a UnitOfWork,
    entity_type: EntityType,
    references: std::vec::IntoIter<EntityReference>,
}

impl Iterator for QueryStream<'_> {
    type Item = UowResult<Entity>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let reference = self.references.next()?;
            match self.uow.get(&self.entity_type, &reference) {
                Ok(entity) => return Some(Ok(entity)),
                Err(err) if err.is_no_such_entity() => {
                    trace!(%reference, "finder returned a stale reference; skipped");
                }
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

impl fmt::Debug for QueryStream<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryStream")
            .field("entity_type", &self.entity_type)
            .field("remaining", &self.references.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::Module;
    use crate::stack::UnitOfWorkFactory;
    use workset_store::{
        CompareOp, EntityDescriptor, EntityStore, FinderError, MemoryEntityFinder, MemoryEntityStore,
        UuidGenerator,
    };

    fn person_descriptor() -> EntityDescriptor {
        EntityDescriptor::builder("Person", "people")
            .property("name")
            .property("age")
            .build()
    }

    fn factory() -> (UnitOfWorkFactory, Arc<MemoryEntityStore>) {
        let store = Arc::new(MemoryEntityStore::new("people"));
        let module = Module::builder("people")
            .entity(person_descriptor(), Arc::clone(&store) as Arc<dyn EntityStore>)
            .identity_generator(Arc::new(UuidGenerator::new()))
            .finder(Arc::new(MemoryEntityFinder::for_store(&store)))
            .build();
        (UnitOfWorkFactory::new(module), store)
    }

    fn seed_people(factory: &UnitOfWorkFactory, people: &[(&str, i64)]) {
        let uow = factory.new_unit_of_work();
        for (name, age) in people {
            let person = uow.new_entity(&EntityType::new("Person")).unwrap();
            person.set_property("name", *name).unwrap();
            person.set_property("age", *age).unwrap();
        }
        uow.complete().unwrap();
    }

    #[test]
    fn find_returns_a_session_instance() {
        let (factory, _) = factory();
        seed_people(&factory, &[("Alice", 34), ("Bob", 27)]);

        let uow = factory.new_unit_of_work();
        let query = Query::of("Person")
            .matching(Predicate::eq("name", "Alice"))
            .build();
        let found = query.find(&uow).unwrap().unwrap();
        assert_eq!(found.property::<String>("name").unwrap(), "Alice");

        let same = uow.get(&EntityType::new("Person"), &found.reference()).unwrap();
        assert!(Entity::same(&found, &same));
        uow.discard();
    }

    #[test]
    fn repeated_execution_yields_identity_equal_results() {
        let (factory, _) = factory();
        seed_people(&factory, &[("Alice", 34), ("Bob", 27), ("Carol", 41)]);

        let uow = factory.new_unit_of_work();
        let query = Query::of("Person")
            .order_by(OrderBy::ascending("name"))
            .build();

        let first: Vec<Entity> = query
            .stream(&uow)
            .unwrap()
            .collect::<UowResult<_>>()
            .unwrap();
        let second: Vec<Entity> = query
            .stream(&uow)
            .unwrap()
            .collect::<UowResult<_>>()
            .unwrap();

        assert_eq!(first.len(), 3);
        for (a, b) in first.iter().zip(&second) {
            assert!(Entity::same(a, b));
        }
        uow.discard();
    }

    #[test]
    fn ordering_and_pagination_are_honored() {
        let (factory, _) = factory();
        seed_people(&factory, &[("Alice", 34), ("Bob", 27), ("Carol", 41), ("Dave", 19)]);

        let uow = factory.new_unit_of_work();
        let query = Query::of("Person")
            .order_by(OrderBy::ascending("age"))
            .first_result(1)
            .max_results(2)
            .build();
        let names: Vec<String> = query
            .stream(&uow)
            .unwrap()
            .map(|entity| entity.unwrap().property::<String>("name").unwrap())
            .collect();

        assert_eq!(names, vec!["Bob".to_string(), "Alice".to_string()]);
        uow.discard();
    }

    #[test]
    fn variables_bind_at_composition() {
        let (factory, _) = factory();
        seed_people(&factory, &[("Alice", 34), ("Bob", 27), ("Carol", 41)]);

        let uow = factory.new_unit_of_work();
        let query = Query::of("Person")
            .matching(Predicate::var("age", CompareOp::Ge, "cutoff"))
            .variable("cutoff", 30)
            .build();
        assert_eq!(query.count(&uow).unwrap(), 2);
        uow.discard();
    }

    #[test]
    fn query_sees_committed_state_only() {
        let (factory, _) = factory();
        seed_people(&factory, &[("Alice", 34)]);

        let uow = factory.new_unit_of_work();
        let pending = uow.new_entity(&EntityType::new("Person")).unwrap();
        pending.set_property("name", "Eve").unwrap();

        let query = Query::of("Person").build();
        assert_eq!(query.count(&uow).unwrap(), 1);
        uow.discard();
    }

    #[test]
    fn missing_finder_is_reported_at_execution() {
        let store = Arc::new(MemoryEntityStore::new("people"));
        let module = Module::builder("people")
            .entity(person_descriptor(), store)
            .identity_generator(Arc::new(UuidGenerator::new()))
            .build();
        let factory = UnitOfWorkFactory::new(module);

        let uow = factory.new_unit_of_work();
        let query = Query::of("Person").build();
        assert!(matches!(
            query.find(&uow).unwrap_err(),
            UowError::NoFinder { .. }
        ));
        uow.discard();
    }

    struct ScriptedFinder {
        references: Vec<EntityReference>,
    }

    impl EntityFinder for ScriptedFinder {
        fn find_entity(
            &self,
            _entity_type: &EntityType,
            _predicate: &Predicate,
            _variables: &Variables,
        ) -> Result<Option<EntityReference>, FinderError> {
            Ok(self.references.first().cloned())
        }

        fn find_entities(
            &self,
            _entity_type: &EntityType,
            _predicate: &Predicate,
            _order_by: &[OrderBy],
            _first: Option<usize>,
            _max: Option<usize>,
            _variables: &Variables,
        ) -> Result<Vec<EntityReference>, FinderError> {
            Ok(self.references.clone())
        }

        fn count_entities(
            &self,
            _entity_type: &EntityType,
            _predicate: &Predicate,
            _variables: &Variables,
        ) -> Result<u64, FinderError> {
            Err(FinderError::backend("index offline"))
        }
    }

    #[test]
    fn stale_references_are_skipped() {
        let store = Arc::new(MemoryEntityStore::new("people"));
        let finder = ScriptedFinder {
            references: vec![
                EntityReference::parse("gone-1"),
                EntityReference::parse("gone-2"),
            ],
        };
        let module = Module::builder("people")
            .entity(person_descriptor(), store)
            .identity_generator(Arc::new(UuidGenerator::new()))
            .finder(Arc::new(finder))
            .build();
        let factory = UnitOfWorkFactory::new(module);

        let uow = factory.new_unit_of_work();
        let query = Query::of("Person").build();
        assert!(query.find(&uow).unwrap().is_none());
        assert_eq!(query.stream(&uow).unwrap().count(), 0);
        uow.discard();
    }

    #[test]
    fn count_propagates_finder_errors() {
        let store = Arc::new(MemoryEntityStore::new("people"));
        let module = Module::builder("people")
            .entity(person_descriptor(), store)
            .identity_generator(Arc::new(UuidGenerator::new()))
            .finder(Arc::new(ScriptedFinder { references: Vec::new() }))
            .build();
        let factory = UnitOfWorkFactory::new(module);

        let uow = factory.new_unit_of_work();
        let query = Query::of("Person").build();
        assert!(matches!(
            query.count(&uow).unwrap_err(),
            UowError::Query { .. }
        ));
        uow.discard();
    }
}
