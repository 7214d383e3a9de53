//! In-memory storage backend for testing.

use crate::backend::{SaveOptions, StorageBackend};
use crate::condition::CompiledCondition;
use crate::error::{StorageError, StorageResult};
use crate::query::{Direction, Query};
use crate::value::{Record, Value};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
struct Table {
    rows: BTreeMap<Value, Record>,
    next_id: i64,
}

impl Table {
    fn assign_id(&mut self) -> Value {
        self.next_id += 1;
        Value::Integer(self.next_id)
    }

    fn observe_id(&mut self, id: &Value) {
        if let Value::Integer(v) = id {
            self.next_id = self.next_id.max(*v);
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: BTreeMap<String, Table>,
    snapshot: Option<BTreeMap<String, Table>>,
    required: BTreeMap<String, Vec<String>>,
}

/// An in-memory, transactional storage backend.
///
/// Rows live in per-table ordered maps keyed by identifier. Integer
/// identifiers are assigned from a per-table counter when a saved record
/// has none. A transaction snapshots every table on `begin_transaction`
/// and restores the snapshot on rollback.
///
/// Rows whose publish field (default `published`) is `false` are hidden
/// from `query` and `count` unless the query includes unpublished rows.
///
/// # Thread Safety
///
/// This backend is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use ormkit_storage::{record, InMemoryBackend, SaveOptions, StorageBackend, Value};
///
/// let backend = InMemoryBackend::new().require_fields("object_product", &["name"]);
/// let draft = record! { "published" => false };
///
/// assert!(backend.save("object_product", "o_id", &draft, SaveOptions::default()).is_err());
///
/// let id = backend
///     .save("object_product", "o_id", &draft, SaveOptions::default().omit_mandatory_check(true))
///     .unwrap();
/// assert_eq!(id, Value::Integer(1));
/// ```
#[derive(Debug)]
pub struct InMemoryBackend {
    state: RwLock<MemoryState>,
    published_field: String,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            published_field: "published".to_string(),
        }
    }
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares fields that every saved record of `table` must carry as
    /// non-null values, unless the save skips the mandatory check.
    #[must_use]
    pub fn require_fields(self, table: &str, fields: &[&str]) -> Self {
        self.state.write().required.insert(
            table.to_string(),
            fields.iter().map(|f| (*f).to_string()).collect(),
        );
        self
    }

    /// Sets the field consulted for hiding unpublished rows.
    #[must_use]
    pub fn with_published_field(mut self, field: impl Into<String>) -> Self {
        self.published_field = field.into();
        self
    }

    /// Inserts a row directly, bypassing constraints and transactions.
    ///
    /// Useful for seeding fixtures.
    pub fn seed(&self, table: &str, id_field: &str, id: Value, mut record: Record) {
        record.insert(id_field.to_string(), id.clone());
        let mut state = self.state.write();
        let table = state.tables.entry(table.to_string()).or_default();
        table.observe_id(&id);
        table.rows.insert(id, record);
    }

    /// Returns a copy of every row of `table`, ordered by identifier.
    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.state
            .read()
            .tables
            .get(table)
            .map(|t| t.rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the number of rows in `table`, published or not.
    #[must_use]
    pub fn row_count(&self, table: &str) -> usize {
        self.state
            .read()
            .tables
            .get(table)
            .map_or(0, |t| t.rows.len())
    }

    /// Returns true while a transaction is open.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.state.read().snapshot.is_some()
    }

    fn is_visible(&self, record: &Record, query: &Query) -> bool {
        query.include_unpublished
            || !matches!(record.get(&self.published_field), Some(Value::Bool(false)))
    }

    fn matching_rows(&self, table: &str, query: &Query) -> StorageResult<Vec<Record>> {
        let condition = query
            .combined_condition()
            .map(|(sql, params)| CompiledCondition::compile(&sql, &params))
            .transpose()?;

        let state = self.state.read();
        let Some(table) = state.tables.get(table) else {
            return Ok(Vec::new());
        };

        Ok(table
            .rows
            .values()
            .filter(|row| self.is_visible(row, query))
            .filter(|row| condition.as_ref().map_or(true, |c| c.matches(row)))
            .cloned()
            .collect())
    }
}

fn compare_rows(a: &Record, b: &Record, query: &Query) -> Ordering {
    for clause in &query.order_by {
        let left = a.get(&clause.key).unwrap_or(&Value::Null);
        let right = b.get(&clause.key).unwrap_or(&Value::Null);
        let ordering = match clause.direction {
            Direction::Ascending => left.cmp(right),
            Direction::Descending => right.cmp(left),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

impl StorageBackend for InMemoryBackend {
    fn save(
        &self,
        table: &str,
        id_field: &str,
        record: &Record,
        options: SaveOptions,
    ) -> StorageResult<Value> {
        let mut state = self.state.write();

        if !options.omit_mandatory_check {
            if let Some(required) = state.required.get(table) {
                let missing: Vec<&str> = required
                    .iter()
                    .filter(|f| record.get(*f).map_or(true, Value::is_null))
                    .map(String::as_str)
                    .collect();
                if !missing.is_empty() {
                    return Err(StorageError::constraint_violation(
                        table,
                        format!("missing mandatory fields: {}", missing.join(", ")),
                    ));
                }
            }
        }

        let rows = state.tables.entry(table.to_string()).or_default();
        let id = match record.get(id_field) {
            Some(id) if !id.is_null() => {
                rows.observe_id(id);
                id.clone()
            }
            _ => rows.assign_id(),
        };

        let mut stored = record.clone();
        stored.insert(id_field.to_string(), id.clone());
        rows.rows.insert(id.clone(), stored);
        Ok(id)
    }

    fn delete(&self, table: &str, _id_field: &str, id: &Value) -> StorageResult<()> {
        let mut state = self.state.write();
        let removed = state
            .tables
            .get_mut(table)
            .and_then(|t| t.rows.remove(id));
        match removed {
            Some(_) => Ok(()),
            None => Err(StorageError::RowNotFound {
                table: table.to_string(),
                id: id.to_string(),
            }),
        }
    }

    fn fetch(&self, table: &str, _id_field: &str, id: &Value) -> StorageResult<Option<Record>> {
        Ok(self
            .state
            .read()
            .tables
            .get(table)
            .and_then(|t| t.rows.get(id))
            .cloned())
    }

    fn exists(&self, table: &str, field: &str, value: &Value) -> StorageResult<bool> {
        if value.is_null() {
            return Ok(false);
        }
        Ok(self.state.read().tables.get(table).is_some_and(|t| {
            t.rows
                .values()
                .any(|row| row.get(field).is_some_and(|v| v == value))
        }))
    }

    fn query(&self, table: &str, query: &Query) -> StorageResult<Vec<Record>> {
        let mut rows = self.matching_rows(table, query)?;
        rows.sort_by(|a, b| compare_rows(a, b, query));

        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    fn count(&self, table: &str, query: &Query) -> StorageResult<u64> {
        Ok(self.matching_rows(table, query)?.len() as u64)
    }

    fn begin_transaction(&self) -> StorageResult<()> {
        let mut state = self.state.write();
        if state.snapshot.is_some() {
            return Err(StorageError::TransactionAlreadyActive);
        }
        state.snapshot = Some(state.tables.clone());
        Ok(())
    }

    fn commit_transaction(&self) -> StorageResult<()> {
        let mut state = self.state.write();
        match state.snapshot.take() {
            Some(_) => Ok(()),
            None => Err(StorageError::NoActiveTransaction),
        }
    }

    fn rollback_transaction(&self) -> StorageResult<()> {
        let mut state = self.state.write();
        match state.snapshot.take() {
            Some(snapshot) => {
                state.tables = snapshot;
                Ok(())
            }
            None => Err(StorageError::NoActiveTransaction),
        }
    }
}
