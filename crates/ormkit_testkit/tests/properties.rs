//! Property tests for the unit of work and criteria normalization.

use ormkit_core::{
    CoreError, Criterion, EntityDescriptor, EntityPersister, EntityRef, EntityState,
    ObjectPersister, OrderBy,
};
use ormkit_storage::{Concatenator, InMemoryBackend, OrderClause, Value};
use ormkit_testkit::prelude::*;
use proptest::prelude::*;
use std::sync::Arc;

/// What a handle should look like after a sequence of operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Modeled {
    New,
    PendingInsert,
    Managed,
    PendingDelete,
    Detached,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    state: Modeled,
    stored: bool,
}

impl Slot {
    const fn fresh() -> Self {
        Self {
            state: Modeled::New,
            stored: false,
        }
    }
}

fn apply(slot: &mut Slot, op: LifecycleOp) {
    let next = match (op, slot.state) {
        (LifecycleOp::Persist(_), Modeled::New) => Modeled::PendingInsert,
        (LifecycleOp::Persist(_), Modeled::PendingDelete) => Modeled::Managed,
        (LifecycleOp::Remove(_), Modeled::PendingInsert) => Modeled::New,
        (LifecycleOp::Remove(_), Modeled::Managed) => Modeled::PendingDelete,
        (LifecycleOp::Detach(_), Modeled::PendingInsert | Modeled::Managed) => Modeled::Detached,
        (LifecycleOp::Flush, Modeled::PendingInsert) => {
            slot.stored = true;
            Modeled::Managed
        }
        (LifecycleOp::Flush, Modeled::PendingDelete) => {
            slot.stored = false;
            Modeled::New
        }
        (_, state) => state,
    };
    slot.state = next;
}

fn snapshot(session: &mut TestSession, entity: &EntityRef) -> (EntityState, bool, bool, bool, usize) {
    let uow = session.unit_of_work_mut();
    (
        uow.entity_state(entity, Some(EntityState::New)).unwrap(),
        uow.is_scheduled_for_insert(entity),
        uow.is_scheduled_for_delete(entity),
        uow.is_in_identity_map(entity),
        uow.size(),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn lifecycle_matches_model(ops in lifecycle_ops_strategy(4, 40)) {
        let mut session = TestSession::new();
        let entities: Vec<_> = (0..4).map(|i| product(&format!("p{i}"), i)).collect();
        let mut model = [Slot::fresh(); 4];

        for op in ops {
            let target = match op {
                LifecycleOp::Persist(i) | LifecycleOp::Remove(i) | LifecycleOp::Detach(i) => Some(i),
                LifecycleOp::Flush => None,
            };
            let before = target.map(|i| snapshot(&mut session, &entities[i]));

            let result = match op {
                LifecycleOp::Persist(i) => session.persist(&entities[i]),
                LifecycleOp::Remove(i) => session.remove(&entities[i]),
                LifecycleOp::Detach(i) => session.detach(&entities[i]),
                LifecycleOp::Flush => session.flush(),
            };

            match result {
                Ok(()) => match target {
                    Some(i) => apply(&mut model[i], op),
                    None => model.iter_mut().for_each(|slot| apply(slot, op)),
                },
                Err(CoreError::InvalidStateTransition { .. }) => {
                    let i = target.unwrap();
                    prop_assert_eq!(model[i].state, Modeled::Detached);
                    prop_assert_eq!(snapshot(&mut session, &entities[i]), before.unwrap());
                }
                Err(other) => prop_assert!(false, "unexpected error {:?}", other),
            }

            if op == LifecycleOp::Flush {
                let stored = model.iter().filter(|slot| slot.stored).count();
                prop_assert_eq!(session.backend.inner().row_count(PRODUCT_TABLE), stored);
                prop_assert!(!session.unit_of_work().has_pending_changes());
            }
        }

        let managed = model.iter().filter(|slot| slot.state == Modeled::Managed).count();
        prop_assert_eq!(session.unit_of_work().size(), managed);
        for (entity, slot) in entities.iter().zip(&model) {
            prop_assert_eq!(
                session.contains(entity),
                matches!(slot.state, Modeled::PendingInsert | Modeled::Managed)
            );
        }
    }

    #[test]
    fn failed_commit_leaves_no_rows(n in 1usize..6, k in 1usize..6) {
        let k = k.min(n);
        let mut session = TestSession::new();
        let products: Vec<_> = (0..n).map(|i| product(&format!("p{i}"), 1)).collect();
        for p in &products {
            session.persist(p).unwrap();
        }
        session.backend.fail_on_nth_save(k);

        prop_assert!(session.flush().is_err());
        prop_assert_eq!(session.backend.inner().row_count(PRODUCT_TABLE), 0);
        prop_assert!(!session.is_open());
        for p in &products {
            prop_assert!(p.get("o_id").is_null());
        }
    }

    #[test]
    fn related_types_are_written_first(kinds in prop::collection::vec(any::<bool>(), 1..10)) {
        let mut session = TestSession::new();
        let entities: Vec<_> = kinds
            .iter()
            .enumerate()
            .map(|(i, is_category)| {
                if *is_category {
                    category(&format!("c{i}"))
                } else {
                    product(&format!("p{i}"), 0)
                }
            })
            .collect();
        for entity in &entities {
            session.persist(entity).unwrap();
        }
        session.flush().unwrap();

        let categories = kinds.iter().filter(|k| **k).count();
        let saved = session.backend.saved_tables();
        prop_assert!(saved[..categories].iter().all(|t| t == CATEGORY_TABLE));
        prop_assert!(saved[categories..].iter().all(|t| t == PRODUCT_TABLE));

        for entity in &entities {
            session.remove(entity).unwrap();
        }
        session.flush().unwrap();

        let deleted = session.backend.deleted_tables();
        let products = kinds.len() - categories;
        prop_assert!(deleted[..products].iter().all(|t| t == PRODUCT_TABLE));
        prop_assert!(deleted[products..].iter().all(|t| t == CATEGORY_TABLE));
    }

    #[test]
    fn loads_share_one_instance_per_row(ids in prop::collection::vec(1i64..=4, 1..12)) {
        let mut session = scenarios::seeded_catalog();
        let mut seen: Vec<Option<EntityRef>> = vec![None; 5];

        for id in ids {
            let loaded = if id % 2 == 0 {
                session.find(PRODUCT, &[Value::Integer(id)]).unwrap().unwrap()
            } else {
                session
                    .repository(PRODUCT)
                    .unwrap()
                    .find_one_by(&[Criterion::field("o_id", id)], &[])
                    .unwrap()
                    .unwrap()
            };
            let slot = &mut seen[usize::try_from(id).unwrap()];
            match slot {
                Some(first) => prop_assert!(first.same_as(&loaded)),
                None => *slot = Some(loaded),
            }
        }
        let distinct = seen.iter().flatten().count();
        prop_assert_eq!(session.unit_of_work().size(), distinct);
    }

    #[test]
    fn inserted_entity_is_served_from_identity_map(stock in 0i64..1_000) {
        let mut session = TestSession::new();
        let entity = product("lamp", stock);
        session.persist(&entity).unwrap();
        session.flush().unwrap();
        session.backend.clear_calls();

        let id = entity.get("o_id");
        let found = session.find(PRODUCT, &[id]).unwrap().unwrap();
        prop_assert!(found.same_as(&entity));
        prop_assert!(session.backend.calls().is_empty());
    }

    #[test]
    fn field_criteria_normalize_to_equality(
        field in field_name_strategy(),
        value in identifier_value_strategy(),
    ) {
        let persister = ObjectPersister::new(
            Arc::new(EntityDescriptor::structured(PRODUCT)),
            Arc::new(InMemoryBackend::new()),
        );
        let normalized = persister
            .normalize_criteria(&[Criterion::field(field.clone(), value.clone())])
            .unwrap();

        prop_assert_eq!(normalized.len(), 1);
        prop_assert_eq!(&normalized[0].condition, &format!("{field} = ?"));
        prop_assert_eq!(&normalized[0].variable, &Some(value));
        prop_assert_eq!(normalized[0].concatenator, Concatenator::And);
    }

    #[test]
    fn condition_criteria_pass_through(
        field in field_name_strategy(),
        value in scalar_value_strategy(),
    ) {
        let persister = ObjectPersister::new(
            Arc::new(EntityDescriptor::structured(PRODUCT)),
            Arc::new(InMemoryBackend::new()),
        );
        let condition = format!("{field} >= ?");
        let normalized = persister
            .normalize_criteria(&[Criterion::condition(condition.clone())
                .with_variable(value.clone())
                .or()])
            .unwrap();

        prop_assert_eq!(&normalized[0].condition, &condition);
        prop_assert_eq!(&normalized[0].variable, &Some(value));
        prop_assert_eq!(normalized[0].concatenator, Concatenator::Or);
    }

    #[test]
    fn order_clauses_normalize((text, key, direction) in order_clause_strategy()) {
        prop_assert_eq!(
            OrderBy::from(text).normalize().unwrap(),
            OrderClause::new(key, direction)
        );
    }
}
