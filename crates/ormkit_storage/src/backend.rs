//! Storage backend trait definition.

use crate::error::StorageResult;
use crate::query::Query;
use crate::value::{Record, Value};

/// Per-call options for [`StorageBackend::save`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SaveOptions {
    /// Skip the backend's mandatory-field validation.
    ///
    /// Set for unpublished drafts, which may legitimately be incomplete.
    pub omit_mandatory_check: bool,
}

impl SaveOptions {
    /// Sets whether mandatory-field validation is skipped.
    #[must_use]
    pub const fn omit_mandatory_check(mut self, value: bool) -> Self {
        self.omit_mandatory_check = value;
        self
    }
}

/// A storage backend for ormkit.
///
/// Backends are the platform-owned side of persistence: they store records
/// in tables and evaluate condition fragments. ormkit owns identity, state
/// tracking and write ordering; backends never see entity handles.
///
/// # Invariants
///
/// - `save` returns the row identifier, assigning one when the record has none
/// - `save` of a record whose identifier already exists replaces that row
/// - Writes between `begin_transaction` and `rollback_transaction` leave no trace
/// - Backends must be `Send + Sync`; a single instance serves every persister
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - Reference backend
pub trait StorageBackend: Send + Sync {
    /// Inserts or replaces a record and returns its identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if a constraint rejects the record.
    fn save(
        &self,
        table: &str,
        id_field: &str,
        record: &Record,
        options: SaveOptions,
    ) -> StorageResult<Value>;

    /// Deletes the row with the given identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the row does not exist.
    fn delete(&self, table: &str, id_field: &str, id: &Value) -> StorageResult<()>;

    /// Fetches one row by identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn fetch(&self, table: &str, id_field: &str, id: &Value) -> StorageResult<Option<Record>>;

    /// Checks whether any row has `field = value`.
    ///
    /// Used with the first identifier component to tell detached entities
    /// from new ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn exists(&self, table: &str, field: &str, value: &Value) -> StorageResult<bool>;

    /// Returns the rows matching a query.
    ///
    /// # Errors
    ///
    /// Returns an error if a condition is malformed.
    fn query(&self, table: &str, query: &Query) -> StorageResult<Vec<Record>>;

    /// Counts the rows matching a query, ignoring its paging.
    ///
    /// # Errors
    ///
    /// Returns an error if a condition is malformed.
    fn count(&self, table: &str, query: &Query) -> StorageResult<u64>;

    /// Opens a transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if a transaction is already open.
    fn begin_transaction(&self) -> StorageResult<()>;

    /// Makes every write since `begin_transaction` durable.
    ///
    /// # Errors
    ///
    /// Returns an error if no transaction is open.
    fn commit_transaction(&self) -> StorageResult<()>;

    /// Discards every write since `begin_transaction`.
    ///
    /// # Errors
    ///
    /// Returns an error if no transaction is open.
    fn rollback_transaction(&self) -> StorageResult<()>;
}
