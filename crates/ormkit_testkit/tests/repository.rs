//! Repository queries over the seeded catalog.

use ormkit_core::{CoreError, Criteria, Criterion, EntityRef, Expr, OrderBy};
use ormkit_storage::{record, Direction, OrderClause, Value};
use ormkit_testkit::prelude::*;

fn names(entities: &[EntityRef]) -> Vec<Value> {
    entities.iter().map(|e| e.get("name")).collect()
}

#[test]
fn find_all_hides_unpublished_rows() {
    let mut session = scenarios::seeded_catalog();
    let all = session.repository(PRODUCT).unwrap().find_all().unwrap();
    assert_eq!(names(&all), ["lamp", "desk", "chair"].map(Value::from));
}

#[test]
fn find_by_id_includes_unpublished_rows() {
    let mut session = scenarios::seeded_catalog();
    let sofa = session
        .repository(PRODUCT)
        .unwrap()
        .find(&[Value::Integer(4)])
        .unwrap()
        .unwrap();
    assert_eq!(sofa.get("published"), Value::Bool(false));
}

#[test]
fn inserted_entity_is_found_without_backend_round_trip() {
    let mut session = TestSession::new();
    let lamp = product("lamp", 3);
    session.persist(&lamp).unwrap();
    session.flush().unwrap();
    session.backend.clear_calls();

    let found = session.find(PRODUCT, &[Value::Integer(1)]).unwrap().unwrap();
    assert!(found.same_as(&lamp));
    assert!(session.backend.calls().is_empty());
}

#[test]
fn loaded_rows_resolve_to_tracked_instances() {
    let mut session = scenarios::seeded_catalog();
    let lamp = session.find(PRODUCT, &[Value::Integer(1)]).unwrap().unwrap();
    lamp.set("name", "unsaved rename");

    let mut repo = session.repository(PRODUCT).unwrap();
    let found = repo
        .find_by(&[Criterion::field("stock", 3)], &[], None, None)
        .unwrap();
    assert_eq!(found.len(), 1);
    assert!(found[0].same_as(&lamp));
    assert_eq!(found[0].get("name"), Value::from("unsaved rename"));
}

#[test]
fn find_by_with_order_limit_and_offset() {
    let mut session = scenarios::seeded_catalog();
    let mut repo = session.repository(PRODUCT).unwrap();

    let page = repo
        .find_by(&[], &[OrderBy::from("stock DESC")], Some(2), Some(1))
        .unwrap();
    assert_eq!(names(&page), ["lamp", "desk"].map(Value::from));

    let ascending = repo
        .find_by(&[], &[OrderBy::key("stock")], None, None)
        .unwrap();
    assert_eq!(names(&ascending), ["desk", "lamp", "chair"].map(Value::from));
}

#[test]
fn find_by_condition_criteria() {
    let mut session = scenarios::seeded_catalog();
    let mut repo = session.repository(PRODUCT).unwrap();

    let found = repo
        .find_by(
            &[
                Criterion::condition("stock > ?").with_variable(0),
                Criterion::condition("name = ?").with_variable("desk").or(),
            ],
            &[OrderBy::keyed("name", Direction::Ascending)],
            None,
            None,
        )
        .unwrap();
    assert_eq!(names(&found), ["chair", "desk", "lamp"].map(Value::from));
}

#[test]
fn find_one_by_returns_first_match() {
    let mut session = scenarios::seeded_catalog();
    let mut repo = session.repository(PRODUCT).unwrap();

    let cheapest = repo
        .find_one_by(&[], &[OrderBy::from("stock ASC")])
        .unwrap()
        .unwrap();
    assert_eq!(cheapest.get("name"), Value::from("desk"));
    assert!(repo
        .find_one_by(&[Criterion::field("name", "missing")], &[])
        .unwrap()
        .is_none());
}

#[test]
fn unknown_fields_are_rejected() {
    let mut session = scenarios::seeded_catalog();
    let mut repo = session.repository(PRODUCT).unwrap();
    assert!(matches!(
        repo.find_by(&[Criterion::field("colour", "red")], &[], None, None),
        Err(CoreError::UnrecognizedField { .. })
    ));
}

#[test]
fn malformed_order_is_rejected() {
    let mut session = scenarios::seeded_catalog();
    let mut repo = session.repository(PRODUCT).unwrap();
    assert!(matches!(
        repo.find_by(&[], &[OrderBy::from("stock sideways")], None, None),
        Err(CoreError::InvalidArgument { .. })
    ));
}

#[test]
fn matching_translates_expressions() {
    let mut session = scenarios::seeded_catalog();
    let mut repo = session.repository(PRODUCT).unwrap();

    let criteria = Criteria::new()
        .where_expr(Expr::gte("stock", 1))
        .and_where(Expr::or(vec![
            Expr::starts_with("name", "la"),
            Expr::ends_with("name", "air"),
        ]))
        .order_by(OrderClause::desc("stock"));
    assert_eq!(
        names(&repo.matching(&criteria).unwrap()),
        ["chair", "lamp"].map(Value::from)
    );
    assert_eq!(repo.count_matching(&criteria).unwrap(), 2);

    let in_list = Criteria::new().where_expr(Expr::in_list(
        "o_id",
        vec![Value::Integer(2), Value::Integer(4)],
    ));
    assert_eq!(names(&repo.matching(&in_list).unwrap()), ["desk"].map(Value::from));

    let with_drafts = in_list.hide_unpublished(false);
    assert_eq!(repo.count_matching(&with_drafts).unwrap(), 2);
}

#[test]
fn matching_applies_paging() {
    let mut session = scenarios::seeded_catalog();
    let mut repo = session.repository(PRODUCT).unwrap();
    let criteria = Criteria::new()
        .order_by(OrderClause::asc("name"))
        .first_result(Some(1))
        .max_results(Some(1));

    assert_eq!(names(&repo.matching(&criteria).unwrap()), ["desk"].map(Value::from));
    assert_eq!(repo.count_matching(&criteria).unwrap(), 3);
}

#[test]
fn not_expressions_are_unsupported() {
    let mut session = scenarios::seeded_catalog();
    let mut repo = session.repository(PRODUCT).unwrap();
    let criteria = Criteria::new().where_expr(Expr::not(Expr::eq("name", "lamp")));
    assert!(matches!(
        repo.matching(&criteria),
        Err(CoreError::Unsupported { .. })
    ));
}

#[test]
fn count_uses_raw_criteria() {
    let mut session = scenarios::seeded_catalog();
    let mut repo = session.repository(PRODUCT).unwrap();
    assert_eq!(repo.count(&[]).unwrap(), 3);
    assert_eq!(repo.count(&[Criterion::field("category", 2)]).unwrap(), 2);
}

#[test]
fn element_repositories_quote_columns() {
    let mut session = TestSession::new();
    for key in ["home", "about"] {
        session.persist(&page(key)).unwrap();
    }
    session.flush().unwrap();

    let mut repo = session.repository(PAGE).unwrap();
    let home = repo
        .find_by(&[Criterion::field("key", "home")], &[], None, None)
        .unwrap();
    assert_eq!(home.len(), 1);
    assert_eq!(home[0].get("key"), Value::from("home"));

    let about = repo
        .find_one_by(&[Criterion::condition("key").with_variable("about")], &[])
        .unwrap()
        .unwrap();
    assert_eq!(about.get("id"), Value::Integer(2));
}

#[test]
fn repository_clear_detaches_its_type() {
    let mut session = scenarios::seeded_catalog();
    let lighting = session.find(CATEGORY, &[Value::Integer(1)]).unwrap().unwrap();
    let products = session.repository(PRODUCT).unwrap().find_all().unwrap();

    session.repository(PRODUCT).unwrap().clear().unwrap();
    for p in &products {
        assert!(!session.contains(p));
    }
    assert!(session.contains(&lighting));
}

#[test]
fn closed_manager_rejects_repository_reads() {
    let mut session = scenarios::seeded_catalog();
    session.close();
    let mut repo = session.repository(PRODUCT).unwrap();
    assert!(matches!(repo.find_all(), Err(CoreError::ManagerClosed)));
    assert!(matches!(repo.count(&[]), Err(CoreError::ManagerClosed)));
    assert!(matches!(
        repo.find(&[Value::Integer(1)]),
        Err(CoreError::ManagerClosed)
    ));
}

#[test]
fn rows_without_identifier_cannot_be_hydrated() {
    let mut session = TestSession::new();
    session
        .backend
        .inner()
        .seed("documents", "id", Value::Null, record! { "key" => "orphan" });
    let mut repo = session.repository(PAGE).unwrap();
    assert!(matches!(
        repo.find_all(),
        Err(CoreError::MissingIdentity { .. })
    ));
}
