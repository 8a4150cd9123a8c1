//! Integration tests for the session layer over in-memory stores.

use proptest::prelude::*;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;
use workset_core::{
    Entity, LifecycleError, Module, Query, UnitOfWorkCallback, UnitOfWorkFactory,
    UnitOfWorkOptions, UowError,
};
use workset_store::{
    EntityReference, EntityStore, EntityVersion, Identity, MemoryEntityStore, OrderBy, Predicate,
    Usecase, UuidGenerator,
};
use workset_testkit::doubles::{
    CallLog, ConflictingPrepareStore, FailingPrepareStore, RecordingStore,
};
use workset_testkit::fixtures::{
    order_descriptor, order_type, person_descriptor, person_type, ShopFixture,
};
use workset_testkit::generators::{session_workload_strategy, PropTestConfig, SessionOp};
use workset_testkit::logging::init_test_tracing;

/// Builds a two-store shop module around the given store implementations.
fn shop_factory(people: Arc<dyn EntityStore>, orders: Arc<dyn EntityStore>) -> UnitOfWorkFactory {
    let module = Module::builder("shop")
        .entity(person_descriptor(), people)
        .entity(order_descriptor(), orders)
        .identity_generator(Arc::new(UuidGenerator::new()))
        .build();
    UnitOfWorkFactory::new(module)
}

struct FailingBeforeCompletion;

impl UnitOfWorkCallback for FailingBeforeCompletion {
    fn before_completion(&self) -> Result<(), LifecycleError> {
        Err(LifecycleError::new("audit check refused completion"))
    }
}

#[test]
fn create_update_reload_against_one_store() {
    init_test_tracing();
    let fixture = ShopFixture::single_store();
    let reference = fixture.seed_person("Alice", 34);

    // Update in a second session
    let uow = fixture.factory.new_unit_of_work();
    let person = uow.get(&person_type(), &reference).unwrap();
    assert_eq!(person.property::<String>("name").unwrap(), "Alice");
    person.set_property("age", 35).unwrap();
    uow.complete().unwrap();

    // Committed state carries the update and a bumped version
    assert_eq!(fixture.people.version_of(&reference), Some(EntityVersion::new(1)));
    let check = fixture.factory.new_unit_of_work();
    let reloaded = check.get(&person_type(), &reference).unwrap();
    assert_eq!(reloaded.property::<i64>("age").unwrap(), 35);
    check.discard();
}

#[test]
fn queries_and_gets_share_one_identity_map() {
    init_test_tracing();
    let fixture = ShopFixture::single_store();
    fixture.seed_person("Alice", 34);
    fixture.seed_person("Bob", 27);
    fixture.seed_person("Carol", 19);

    let uow = fixture.factory.new_unit_of_work();
    let adults = Query::of("Person")
        .matching(Predicate::ge("age", 21))
        .order_by(OrderBy::ascending("age"))
        .build();

    let first: Vec<Entity> = adults.stream(&uow).unwrap().collect::<Result<_, _>>().unwrap();
    let second: Vec<Entity> = adults.stream(&uow).unwrap().collect::<Result<_, _>>().unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(first[0].property::<String>("name").unwrap(), "Bob");
    for (a, b) in first.iter().zip(&second) {
        assert!(Entity::same(a, b));
    }

    // Direct gets resolve to the very same instances
    let direct = uow.get(&person_type(), &first[1].reference()).unwrap();
    assert!(Entity::same(&first[1], &direct));
    assert_eq!(adults.count(&uow).unwrap(), 2);
    uow.discard();
}

#[test]
fn overlapping_sessions_conflict_and_retry() {
    init_test_tracing();
    let fixture = ShopFixture::single_store();
    let reference = fixture.seed_person("Alice", 34);

    let first = fixture.factory.new_unit_of_work();
    let second = fixture.factory.new_unit_of_work();
    let in_first = first.get(&person_type(), &reference).unwrap();
    let in_second = second.get(&person_type(), &reference).unwrap();

    in_first.set_property("age", 40).unwrap();
    in_second.set_property("age", 50).unwrap();
    first.complete().unwrap();

    // The loser learns exactly which of its instances went stale
    let err = second.complete().unwrap_err();
    match &err {
        UowError::ConcurrentModification { entities } => {
            assert_eq!(entities.len(), 1);
            assert!(Entity::same(&entities[0], &in_second));
        }
        other => panic!("expected concurrent modification, got {other:?}"),
    }
    assert!(second.is_open());
    second.discard();

    // Retry on fresh state wins
    let retry = fixture.factory.new_unit_of_work();
    let person = retry.get(&person_type(), &reference).unwrap();
    assert_eq!(person.property::<i64>("age").unwrap(), 40);
    person.set_property("age", 50).unwrap();
    retry.complete().unwrap();
    assert_eq!(fixture.people.committed_property(&reference, "age"), Some(50.into()));
}

#[test]
fn prepare_failure_leaves_every_store_untouched() {
    init_test_tracing();
    let log = CallLog::new();
    let people = Arc::new(MemoryEntityStore::new("people"));
    let orders = Arc::new(FailingPrepareStore::new("orders"));
    let factory = shop_factory(
        Arc::new(RecordingStore::new(Arc::clone(&people) as Arc<dyn EntityStore>, log.clone())),
        Arc::clone(&orders) as Arc<dyn EntityStore>,
    );

    let uow = factory.new_unit_of_work();
    uow.new_entity(&person_type()).unwrap();
    uow.new_entity(&order_type()).unwrap();
    let err = uow.complete().unwrap_err();

    assert!(matches!(err, UowError::CompletionFailure { .. }));
    assert!(uow.is_open());
    // People prepared fine, then had to roll back; nothing committed anywhere
    assert_eq!(log.entries_matching(":prepare"), vec!["people:prepare"]);
    assert_eq!(log.entries_matching(":cancel"), vec!["people:cancel"]);
    assert!(log.entries_matching(":commit").is_empty());
    assert_eq!(people.entity_count(), 0);
    assert_eq!(orders.store().entity_count(), 0);
    uow.discard();
}

#[test]
fn commit_order_follows_first_touch_order() {
    init_test_tracing();
    let log = CallLog::new();
    let people = Arc::new(MemoryEntityStore::new("people"));
    let orders = Arc::new(MemoryEntityStore::new("orders"));
    let factory = shop_factory(
        Arc::new(RecordingStore::new(Arc::clone(&people) as Arc<dyn EntityStore>, log.clone())),
        Arc::new(RecordingStore::new(Arc::clone(&orders) as Arc<dyn EntityStore>, log.clone())),
    );

    // Touch the order store first, so it also prepares and commits first
    let uow = factory.new_unit_of_work();
    uow.new_entity(&order_type()).unwrap();
    uow.new_entity(&person_type()).unwrap();
    uow.complete().unwrap();

    assert_eq!(log.entries_matching(":open"), vec!["orders:open", "people:open"]);
    assert_eq!(log.entries_matching(":prepare"), vec!["orders:prepare", "people:prepare"]);
    assert_eq!(log.entries_matching(":commit"), vec!["orders:commit", "people:commit"]);
    assert_eq!(people.entity_count(), 1);
    assert_eq!(orders.entity_count(), 1);
}

#[test]
fn failed_before_completion_cancels_prepared_work() {
    init_test_tracing();
    let log = CallLog::new();
    let people = Arc::new(MemoryEntityStore::new("people"));
    let factory = shop_factory(
        Arc::new(RecordingStore::new(Arc::clone(&people) as Arc<dyn EntityStore>, log.clone())),
        Arc::new(MemoryEntityStore::new("orders")),
    );

    let uow = factory.new_unit_of_work();
    uow.new_entity(&person_type()).unwrap();
    uow.register_callback(Rc::new(FailingBeforeCompletion));
    let err = uow.complete().unwrap_err();

    assert!(matches!(err, UowError::Lifecycle { .. }));
    assert!(uow.is_open());
    assert_eq!(log.entries_matching(":prepare"), vec!["people:prepare"]);
    assert_eq!(log.entries_matching(":cancel"), vec!["people:cancel"]);
    assert!(log.entries_matching(":commit").is_empty());
    assert_eq!(people.entity_count(), 0);
    uow.discard();
}

#[test]
fn scripted_conflict_carries_the_loaded_instance() {
    init_test_tracing();
    let people = Arc::new(ConflictingPrepareStore::new("people"));
    let factory = shop_factory(
        Arc::clone(&people) as Arc<dyn EntityStore>,
        Arc::new(MemoryEntityStore::new("orders")),
    );

    let seed = factory.new_unit_of_work();
    let reference = seed.new_entity(&person_type()).unwrap().reference();
    seed.complete().unwrap();

    people.conflict_on(reference.clone());
    let uow = factory.new_unit_of_work();
    let person = uow.get(&person_type(), &reference).unwrap();
    person.set_property("name", "stale").unwrap();
    let err = uow.complete().unwrap_err();

    match &err {
        UowError::ConcurrentModification { entities } => {
            assert_eq!(entities.len(), 1);
            assert!(Entity::same(&entities[0], &person));
        }
        other => panic!("expected concurrent modification, got {other:?}"),
    }
    assert!(uow.is_open());
    uow.discard();
}

#[test]
fn pause_evicts_clean_instances_and_rereads_them() {
    init_test_tracing();
    let log = CallLog::new();
    let people = Arc::new(MemoryEntityStore::new("people"));
    let factory = shop_factory(
        Arc::new(RecordingStore::new(Arc::clone(&people) as Arc<dyn EntityStore>, log.clone())),
        Arc::new(MemoryEntityStore::new("orders")),
    );

    let seed = factory.new_unit_of_work();
    for id in ["anna", "bruno"] {
        seed.new_entity_builder_with_identity(&person_type(), Identity::new(id))
            .unwrap()
            .property("name", id)
            .unwrap()
            .build()
            .unwrap();
    }
    seed.complete().unwrap();
    let anna_ref = EntityReference::parse("anna");
    let bruno_ref = EntityReference::parse("bruno");

    let uow = factory.new_unit_of_work_with(
        Usecase::named("audit"),
        UnitOfWorkOptions::new().prune_on_pause(true),
    );
    let anna = uow.get(&person_type(), &anna_ref).unwrap();
    let bruno = uow.get(&person_type(), &bruno_ref).unwrap();
    bruno.set_property("age", 31).unwrap();
    log.clear();

    uow.pause().unwrap();
    uow.resume().unwrap();

    // Clean anna was evicted and is read afresh; dirty bruno survived
    let anna_again = uow.get(&person_type(), &anna_ref).unwrap();
    let bruno_again = uow.get(&person_type(), &bruno_ref).unwrap();
    assert!(!Entity::same(&anna, &anna_again));
    assert!(Entity::same(&bruno, &bruno_again));
    assert_eq!(log.entries(), vec![format!("people:fetch {anna_ref}")]);
    assert_eq!(bruno_again.property::<i64>("age").unwrap(), 31);
    uow.discard();
}

#[test]
fn snapshot_moves_state_between_sessions() {
    init_test_tracing();
    let fixture = ShopFixture::single_store();

    // Capture uncommitted state, then throw the session away
    let source = fixture.factory.new_unit_of_work();
    let person = source
        .new_entity_builder(&person_type())
        .unwrap()
        .property("name", "Alice")
        .unwrap()
        .property("age", 34)
        .unwrap()
        .build()
        .unwrap();
    let snapshot = source.snapshot_of(&person).unwrap();
    source.discard();
    assert_eq!(fixture.people.entity_count(), 0);

    // Ship it as JSON and merge it into a fresh session
    let wire = serde_json::to_string(&snapshot).unwrap();
    let restored = serde_json::from_str(&wire).unwrap();
    let target = fixture.factory.new_unit_of_work();
    let merged = target.merge_snapshot(&restored).unwrap();
    assert_eq!(&merged.reference(), snapshot.reference());
    target.complete().unwrap();

    let check = fixture.factory.new_unit_of_work();
    let reloaded = check.get(&person_type(), snapshot.reference()).unwrap();
    assert_eq!(reloaded.property::<String>("name").unwrap(), "Alice");
    assert_eq!(reloaded.property::<i64>("age").unwrap(), 34);
    check.discard();
}

fn pick(created: &[EntityReference], slot: usize) -> Option<EntityReference> {
    if created.is_empty() {
        None
    } else {
        Some(created[slot % created.len()].clone())
    }
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn randomized_workload_matches_a_model(ops in session_workload_strategy(1, 24)) {
        init_test_tracing();
        let fixture = ShopFixture::single_store();
        let uow = fixture.factory.new_unit_of_work();
        let mut created: Vec<EntityReference> = Vec::new();
        let mut model: BTreeMap<EntityReference, (String, i64)> = BTreeMap::new();

        for op in ops {
            match op {
                SessionOp::Create { name, age } => {
                    let person = uow
                        .new_entity_builder(&person_type())
                        .unwrap()
                        .property("name", &name)
                        .unwrap()
                        .property("age", age)
                        .unwrap()
                        .build()
                        .unwrap();
                    let reference = person.reference();
                    created.push(reference.clone());
                    model.insert(reference, (name, age));
                }
                SessionOp::Update { slot, age } => {
                    let Some(reference) = pick(&created, slot) else { continue };
                    if !model.contains_key(&reference) {
                        continue;
                    }
                    let person = uow.get(&person_type(), &reference).unwrap();
                    person.set_property("age", age).unwrap();
                    if let Some(entry) = model.get_mut(&reference) {
                        entry.1 = age;
                    }
                }
                SessionOp::Remove { slot } => {
                    let Some(reference) = pick(&created, slot) else { continue };
                    if !model.contains_key(&reference) {
                        continue;
                    }
                    let person = uow.get(&person_type(), &reference).unwrap();
                    uow.remove(&person).unwrap();
                    model.remove(&reference);
                }
                SessionOp::Fetch { slot } => {
                    let Some(reference) = pick(&created, slot) else { continue };
                    if !model.contains_key(&reference) {
                        continue;
                    }
                    let person = uow.get(&person_type(), &reference).unwrap();
                    let again = uow.get(&person_type(), &reference).unwrap();
                    prop_assert!(Entity::same(&person, &again));
                }
            }
        }

        for (reference, (name, age)) in &model {
            let person = uow.get(&person_type(), reference).unwrap();
            prop_assert_eq!(&person.property::<String>("name").unwrap(), name);
            prop_assert_eq!(person.property::<i64>("age").unwrap(), *age);
        }
        uow.complete().unwrap();

        prop_assert_eq!(fixture.people.entity_count(), model.len());
        let check = fixture.factory.new_unit_of_work();
        for (reference, (name, age)) in &model {
            let person = check.get(&person_type(), reference).unwrap();
            prop_assert_eq!(&person.property::<String>("name").unwrap(), name);
            prop_assert_eq!(person.property::<i64>("age").unwrap(), *age);
        }
        check.discard();
    }
}
