//! Property-based test generators using proptest.
//!
//! Provides strategies for generating records, identifiers and sequences
//! of lifecycle operations.

use ormkit_storage::{Direction, Record, Value};
use proptest::prelude::*;

/// Strategy for generating field names.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,11}").expect("Invalid regex")
}

/// Strategy for generating scalar values, null included.
pub fn scalar_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        prop::string::string_regex("[a-zA-Z0-9 ]{0,16}")
            .expect("Invalid regex")
            .prop_map(Value::Text),
    ]
}

/// Strategy for generating non-null identifier values.
pub fn identifier_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        (1i64..100_000).prop_map(Value::Integer),
        prop::string::string_regex("[a-z0-9]{1,12}")
            .expect("Invalid regex")
            .prop_map(Value::Text),
    ]
}

/// Strategy for generating records without the `o_id` field.
pub fn record_strategy() -> impl Strategy<Value = Record> {
    prop::collection::btree_map(
        field_name_strategy().prop_filter("identifier field", |f| f != "o_id"),
        scalar_value_strategy(),
        0..8,
    )
}

/// Strategy for generating order clauses as text, with their expected key
/// and direction.
pub fn order_clause_strategy() -> impl Strategy<Value = (String, String, Direction)> {
    (
        field_name_strategy(),
        prop_oneof![
            Just(("", Direction::Ascending)),
            Just((" ASC", Direction::Ascending)),
            Just((" asc", Direction::Ascending)),
            Just((" DESC", Direction::Descending)),
            Just((" desc", Direction::Descending)),
        ],
    )
        .prop_map(|(key, (suffix, direction))| (format!("{key}{suffix}"), key, direction))
}

/// One step of a generated entity lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleOp {
    /// Persist the entity at this index.
    Persist(usize),
    /// Remove the entity at this index.
    Remove(usize),
    /// Detach the entity at this index.
    Detach(usize),
    /// Flush the session.
    Flush,
}

/// Strategy for generating lifecycle operations over `entities` handles.
pub fn lifecycle_op_strategy(entities: usize) -> impl Strategy<Value = LifecycleOp> {
    let last = entities.max(1);
    prop_oneof![
        4 => (0..last).prop_map(LifecycleOp::Persist),
        3 => (0..last).prop_map(LifecycleOp::Remove),
        1 => (0..last).prop_map(LifecycleOp::Detach),
        2 => Just(LifecycleOp::Flush),
    ]
}

/// Strategy for generating a sequence of lifecycle operations.
pub fn lifecycle_ops_strategy(
    entities: usize,
    max_len: usize,
) -> impl Strategy<Value = Vec<LifecycleOp>> {
    prop::collection::vec(lifecycle_op_strategy(entities), 1..max_len.max(2))
}
