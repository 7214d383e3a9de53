//! Lifecycle state transitions through the entity manager.

use ormkit_core::{CoreError, EntityManager, EntityRef, EntityState};
use ormkit_storage::{record, StorageBackend, Value};
use ormkit_testkit::prelude::*;

/// Everything the unit of work knows about one handle.
fn bookkeeping(em: &mut EntityManager, entity: &EntityRef) -> (EntityState, bool, bool, bool, bool, usize) {
    let uow = em.unit_of_work_mut();
    (
        uow.entity_state(entity, Some(EntityState::New)).unwrap(),
        uow.is_scheduled_for_insert(entity),
        uow.is_scheduled_for_update(entity),
        uow.is_scheduled_for_delete(entity),
        uow.is_in_identity_map(entity),
        uow.size(),
    )
}

fn state(em: &mut EntityManager, entity: &EntityRef) -> EntityState {
    em.unit_of_work_mut().entity_state(entity, None).unwrap()
}

#[test]
fn new_entity_becomes_managed_on_persist() {
    let mut session = TestSession::new();
    let lamp = product("lamp", 3);
    assert_eq!(state(&mut session, &lamp), EntityState::New);

    session.persist(&lamp).unwrap();
    assert_eq!(state(&mut session, &lamp), EntityState::Managed);
    assert!(session.unit_of_work().is_scheduled_for_insert(&lamp));
    assert!(session.backend.calls().is_empty());
}

#[test]
fn persist_is_idempotent_for_new_and_managed() {
    let mut session = TestSession::new();
    let lamp = product("lamp", 3);
    session.persist(&lamp).unwrap();
    let before = bookkeeping(&mut session, &lamp);
    session.persist(&lamp).unwrap();
    assert_eq!(bookkeeping(&mut session, &lamp), before);

    session.flush().unwrap();
    session.persist(&lamp).unwrap();
    session.persist(&lamp).unwrap();
    assert!(session.unit_of_work().is_scheduled_for_update(&lamp));
}

#[test]
fn managed_entity_is_removed_then_deleted() {
    let mut session = TestSession::new();
    let lamp = product("lamp", 3);
    session.persist(&lamp).unwrap();
    session.flush().unwrap();

    session.remove(&lamp).unwrap();
    assert_eq!(state(&mut session, &lamp), EntityState::Removed);
    assert!(session.unit_of_work().is_scheduled_for_delete(&lamp));
    assert!(!session.contains(&lamp));

    session.flush().unwrap();
    assert_eq!(session.backend.inner().row_count(PRODUCT_TABLE), 0);
    assert_eq!(session.unit_of_work().size(), 0);
}

#[test]
fn remove_then_persist_cancels_delete_without_backend_calls() {
    let mut session = TestSession::new();
    let lamp = product("lamp", 3);
    session.persist(&lamp).unwrap();
    session.flush().unwrap();
    session.backend.clear_calls();

    session.remove(&lamp).unwrap();
    session.persist(&lamp).unwrap();

    assert_eq!(state(&mut session, &lamp), EntityState::Managed);
    assert!(!session.unit_of_work().is_scheduled_for_delete(&lamp));
    assert!(session.unit_of_work().is_in_identity_map(&lamp));
    assert!(session.contains(&lamp));

    session.flush().unwrap();
    assert!(session.backend.calls().is_empty());
    assert_eq!(session.backend.inner().row_count(PRODUCT_TABLE), 1);
}

#[test]
fn find_after_remove_resolves_to_removed_instance() {
    let mut session = scenarios::seeded_catalog();
    let lamp = session.find(PRODUCT, &[Value::Integer(1)]).unwrap().unwrap();
    session.remove(&lamp).unwrap();

    let found = session.find(PRODUCT, &[Value::Integer(1)]).unwrap().unwrap();
    assert!(found.same_as(&lamp));
    assert_eq!(state(&mut session, &found), EntityState::Removed);
    let listed = session.repository(PRODUCT).unwrap().find_all().unwrap();
    assert!(listed.iter().any(|e| e.same_as(&lamp)));
    assert!(session.unit_of_work().is_scheduled_for_delete(&lamp));

    session.flush().unwrap();
    assert!(session.find(PRODUCT, &[Value::Integer(1)]).unwrap().is_none());
    assert!(session
        .unit_of_work()
        .try_get_by_id(PRODUCT, &[Value::Integer(1)])
        .is_none());
}

#[test]
fn removed_instance_found_again_can_be_restored_and_removed() {
    let mut session = scenarios::seeded_catalog();
    let lamp = session.find(PRODUCT, &[Value::Integer(1)]).unwrap().unwrap();
    session.remove(&lamp).unwrap();
    session.find(PRODUCT, &[Value::Integer(1)]).unwrap();

    session.persist(&lamp).unwrap();
    assert_eq!(state(&mut session, &lamp), EntityState::Managed);
    assert!(session.unit_of_work().is_in_identity_map(&lamp));

    session.remove(&lamp).unwrap();
    assert!(session.unit_of_work().is_scheduled_for_delete(&lamp));
    session.flush().unwrap();
    let row = session
        .backend
        .inner()
        .fetch(PRODUCT_TABLE, "o_id", &Value::Integer(1))
        .unwrap();
    assert!(row.is_none());
}

#[test]
fn removing_new_or_removed_entities_is_a_noop() {
    let mut session = TestSession::new();
    let lamp = product("lamp", 3);
    session.remove(&lamp).unwrap();
    assert_eq!(state(&mut session, &lamp), EntityState::New);

    session.persist(&lamp).unwrap();
    session.flush().unwrap();
    session.remove(&lamp).unwrap();
    let before = bookkeeping(&mut session, &lamp);
    session.remove(&lamp).unwrap();
    assert_eq!(bookkeeping(&mut session, &lamp), before);
}

#[test]
fn remove_of_pending_insert_forgets_entity() {
    let mut session = TestSession::new();
    let lamp = product("lamp", 3);
    session.persist(&lamp).unwrap();
    session.remove(&lamp).unwrap();

    assert_eq!(state(&mut session, &lamp), EntityState::New);
    assert!(!session.contains(&lamp));
    session.flush().unwrap();
    assert!(session.backend.calls().is_empty());
}

#[test]
fn detached_entity_rejects_persist_and_remove() {
    let mut session = TestSession::new();
    let lamp = product("lamp", 3);
    session.persist(&lamp).unwrap();
    session.flush().unwrap();
    session.detach(&lamp).unwrap();
    assert!(!session.contains(&lamp));

    let before = bookkeeping(&mut session, &lamp);
    assert!(matches!(
        session.persist(&lamp),
        Err(CoreError::InvalidStateTransition { .. })
    ));
    assert!(matches!(
        session.remove(&lamp),
        Err(CoreError::InvalidStateTransition { .. })
    ));
    assert_eq!(bookkeeping(&mut session, &lamp), before);
}

#[test]
fn untracked_copy_of_existing_row_is_detached() {
    let mut session = scenarios::seeded_catalog();
    let copy = EntityRef::create(PRODUCT, record! { "o_id" => 1, "name" => "lamp" });

    assert_eq!(state(&mut session, &copy), EntityState::Detached);
    assert!(session
        .backend
        .calls()
        .contains(&BackendCall::Exists { table: PRODUCT_TABLE.into() }));

    let before = bookkeeping(&mut session, &copy);
    assert!(matches!(
        session.remove(&copy),
        Err(CoreError::InvalidStateTransition { .. })
    ));
    assert_eq!(bookkeeping(&mut session, &copy), before);
}

#[test]
fn copy_of_tracked_row_is_detached_without_probe() {
    let mut session = scenarios::seeded_catalog();
    session.find(PRODUCT, &[Value::Integer(1)]).unwrap().unwrap();
    session.backend.clear_calls();

    let copy = EntityRef::create(PRODUCT, record! { "o_id" => 1 });
    assert_eq!(state(&mut session, &copy), EntityState::Detached);
    assert!(session.backend.calls().is_empty());
}

#[test]
fn refresh_reloads_managed_entity() {
    let mut session = scenarios::seeded_catalog();
    let lamp = session.find(PRODUCT, &[Value::Integer(1)]).unwrap().unwrap();
    lamp.set("name", "changed locally");

    session.refresh(&lamp).unwrap();
    assert_eq!(lamp.get("name"), Value::from("lamp"));

    session
        .backend
        .inner()
        .delete(PRODUCT_TABLE, "o_id", &Value::Integer(1))
        .unwrap();
    assert!(matches!(
        session.refresh(&lamp),
        Err(CoreError::EntityNotFound { .. })
    ));
}

#[test]
fn refresh_requires_managed_entity() {
    let mut session = TestSession::new();
    let lamp = product("lamp", 3);
    assert!(matches!(
        session.refresh(&lamp),
        Err(CoreError::NotManaged { .. })
    ));
}

#[test]
fn merge_is_unsupported() {
    let mut session = TestSession::new();
    assert!(matches!(
        session.merge(&product("lamp", 3)),
        Err(CoreError::Unsupported { .. })
    ));
}

#[test]
fn clear_by_type_detaches_only_that_type() {
    let mut session = scenarios::seeded_catalog();
    let lamp = session.find(PRODUCT, &[Value::Integer(1)]).unwrap().unwrap();
    let lighting = session.find(CATEGORY, &[Value::Integer(1)]).unwrap().unwrap();
    let pending = product("stool", 1);
    let pending_category = category("outdoor");
    session.persist(&pending).unwrap();
    session.persist(&pending_category).unwrap();

    session.clear(Some(PRODUCT)).unwrap();

    assert!(!session.contains(&lamp));
    assert!(!session.contains(&pending));
    assert!(session.contains(&lighting));
    assert!(session.contains(&pending_category));
    assert!(matches!(
        session.persist(&lamp),
        Err(CoreError::InvalidStateTransition { .. })
    ));
}

#[test]
fn clear_all_forgets_everything() {
    let mut session = scenarios::seeded_catalog();
    let lamp = session.find(PRODUCT, &[Value::Integer(1)]).unwrap().unwrap();
    session.persist(&product("stool", 1)).unwrap();

    session.clear(None).unwrap();
    assert_eq!(session.unit_of_work().size(), 0);
    assert!(!session.unit_of_work().has_pending_changes());
    assert!(!session.contains(&lamp));
}
