//! A backend wrapper that journals calls and injects failures.

use ormkit_storage::{
    InMemoryBackend, Query, Record, SaveOptions, StorageBackend, StorageError, StorageResult,
    Value,
};
use parking_lot::Mutex;

/// One call made against a [`RecordingBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    /// `save` on a table.
    Save {
        /// Table written.
        table: String,
    },
    /// `delete` of one row.
    Delete {
        /// Table written.
        table: String,
        /// Deleted identifier.
        id: Value,
    },
    /// `fetch` of one row.
    Fetch {
        /// Table read.
        table: String,
    },
    /// `exists` probe.
    Exists {
        /// Table read.
        table: String,
    },
    /// `query` on a table.
    Query {
        /// Table read.
        table: String,
    },
    /// `count` on a table.
    Count {
        /// Table read.
        table: String,
    },
    /// `begin_transaction`.
    Begin,
    /// `commit_transaction`.
    Commit,
    /// `rollback_transaction`.
    Rollback,
}

impl BackendCall {
    /// Returns true for `save` and `delete`.
    #[must_use]
    pub fn is_write(&self) -> bool {
        matches!(self, BackendCall::Save { .. } | BackendCall::Delete { .. })
    }
}

#[derive(Debug, Default)]
struct Journal {
    calls: Vec<BackendCall>,
    saves: usize,
    fail_on_save: Option<usize>,
}

/// Wraps an [`InMemoryBackend`], recording every call.
///
/// [`RecordingBackend::fail_on_nth_save`] makes one later save fail, which
/// drives the commit-failure path in tests.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    inner: InMemoryBackend,
    journal: Mutex<Journal>,
}

impl RecordingBackend {
    /// Creates a recorder over an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a recorder over `inner`.
    #[must_use]
    pub fn wrap(inner: InMemoryBackend) -> Self {
        Self {
            inner,
            journal: Mutex::new(Journal::default()),
        }
    }

    /// Returns the wrapped backend.
    #[must_use]
    pub fn inner(&self) -> &InMemoryBackend {
        &self.inner
    }

    /// Returns every recorded call in order.
    #[must_use]
    pub fn calls(&self) -> Vec<BackendCall> {
        self.journal.lock().calls.clone()
    }

    /// Returns the number of recorded `save` and `delete` calls.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.journal.lock().calls.iter().filter(|c| c.is_write()).count()
    }

    /// Returns the tables of recorded saves, in order.
    #[must_use]
    pub fn saved_tables(&self) -> Vec<String> {
        self.journal
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                BackendCall::Save { table } => Some(table.clone()),
                _ => None,
            })
            .collect()
    }

    /// Returns the tables of recorded deletes, in order.
    #[must_use]
    pub fn deleted_tables(&self) -> Vec<String> {
        self.journal
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                BackendCall::Delete { table, .. } => Some(table.clone()),
                _ => None,
            })
            .collect()
    }

    /// Forgets recorded calls. An armed failure stays armed.
    pub fn clear_calls(&self) {
        self.journal.lock().calls.clear();
    }

    /// Makes the `n`th save from now (1-based) fail.
    pub fn fail_on_nth_save(&self, n: usize) {
        let mut journal = self.journal.lock();
        journal.fail_on_save = Some(journal.saves + n);
    }

    /// Disarms an injected failure.
    pub fn disarm(&self) {
        self.journal.lock().fail_on_save = None;
    }

    fn record(&self, call: BackendCall) {
        self.journal.lock().calls.push(call);
    }
}

impl StorageBackend for RecordingBackend {
    fn save(
        &self,
        table: &str,
        id_field: &str,
        record: &Record,
        options: SaveOptions,
    ) -> StorageResult<Value> {
        {
            let mut journal = self.journal.lock();
            journal.calls.push(BackendCall::Save {
                table: table.to_string(),
            });
            journal.saves += 1;
            if journal.fail_on_save == Some(journal.saves) {
                journal.fail_on_save = None;
                return Err(StorageError::rejected(format!(
                    "injected failure on save #{}",
                    journal.saves
                )));
            }
        }
        self.inner.save(table, id_field, record, options)
    }

    fn delete(&self, table: &str, id_field: &str, id: &Value) -> StorageResult<()> {
        self.record(BackendCall::Delete {
            table: table.to_string(),
            id: id.clone(),
        });
        self.inner.delete(table, id_field, id)
    }

    fn fetch(&self, table: &str, id_field: &str, id: &Value) -> StorageResult<Option<Record>> {
        self.record(BackendCall::Fetch {
            table: table.to_string(),
        });
        self.inner.fetch(table, id_field, id)
    }

    fn exists(&self, table: &str, field: &str, value: &Value) -> StorageResult<bool> {
        self.record(BackendCall::Exists {
            table: table.to_string(),
        });
        self.inner.exists(table, field, value)
    }

    fn query(&self, table: &str, query: &Query) -> StorageResult<Vec<Record>> {
        self.record(BackendCall::Query {
            table: table.to_string(),
        });
        self.inner.query(table, query)
    }

    fn count(&self, table: &str, query: &Query) -> StorageResult<u64> {
        self.record(BackendCall::Count {
            table: table.to_string(),
        });
        self.inner.count(table, query)
    }

    fn begin_transaction(&self) -> StorageResult<()> {
        self.record(BackendCall::Begin);
        self.inner.begin_transaction()
    }

    fn commit_transaction(&self) -> StorageResult<()> {
        self.record(BackendCall::Commit);
        self.inner.commit_transaction()
    }

    fn rollback_transaction(&self) -> StorageResult<()> {
        self.record(BackendCall::Rollback);
        self.inner.rollback_transaction()
    }
}
