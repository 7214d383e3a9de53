//! Entity handles and identifiers.

mod id;

pub use id::ObjectId;

use ormkit_storage::{Record, Value};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// The data of one entity: its type and field values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    type_name: String,
    /// Field values, including identifier fields once assigned.
    pub fields: Record,
}

impl Entity {
    /// Creates an entity of the given type.
    pub fn new(type_name: impl Into<String>, fields: Record) -> Self {
        Self {
            type_name: type_name.into(),
            fields,
        }
    }

    /// Returns the entity's type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Returns a field value, or `Null` when absent.
    #[must_use]
    pub fn get(&self, field: &str) -> Value {
        self.fields.get(field).cloned().unwrap_or(Value::Null)
    }
}

/// A shared handle to a tracked entity.
///
/// Cloning the handle does not copy the entity: every clone observes the
/// same fields and carries the same [`ObjectId`]. Equality and hashing use
/// the object ID only.
#[derive(Clone)]
pub struct EntityRef {
    oid: ObjectId,
    inner: Arc<RwLock<Entity>>,
}

impl EntityRef {
    /// Wraps an entity in a new handle with a fresh object ID.
    #[must_use]
    pub fn new(entity: Entity) -> Self {
        Self {
            oid: ObjectId::next(),
            inner: Arc::new(RwLock::new(entity)),
        }
    }

    /// Creates a new entity of `type_name` with `fields`.
    pub fn create(type_name: impl Into<String>, fields: Record) -> Self {
        Self::new(Entity::new(type_name, fields))
    }

    /// Returns the object ID.
    #[must_use]
    pub fn oid(&self) -> ObjectId {
        self.oid
    }

    /// Returns the entity's type name.
    #[must_use]
    pub fn type_name(&self) -> String {
        self.inner.read().type_name.clone()
    }

    /// Returns a field value, or `Null` when absent.
    #[must_use]
    pub fn get(&self, field: &str) -> Value {
        self.inner.read().get(field)
    }

    /// Sets a field value.
    pub fn set(&self, field: impl Into<String>, value: impl Into<Value>) {
        self.inner.write().fields.insert(field.into(), value.into());
    }

    /// Locks the entity for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, Entity> {
        self.inner.read()
    }

    /// Locks the entity for writing.
    pub fn write(&self) -> RwLockWriteGuard<'_, Entity> {
        self.inner.write()
    }

    /// Returns a copy of the field values.
    #[must_use]
    pub fn snapshot(&self) -> Record {
        self.inner.read().fields.clone()
    }

    /// Replaces every field value.
    pub fn replace_fields(&self, fields: Record) {
        self.inner.write().fields = fields;
    }

    /// Returns true if both handles refer to the same entity.
    #[must_use]
    pub fn same_as(&self, other: &EntityRef) -> bool {
        self.oid == other.oid
    }
}

impl PartialEq for EntityRef {
    fn eq(&self, other: &Self) -> bool {
        self.oid == other.oid
    }
}

impl Eq for EntityRef {}

impl Hash for EntityRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.oid.hash(state);
    }
}

impl fmt::Debug for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entity = self.inner.read();
        f.debug_struct("EntityRef")
            .field("oid", &self.oid)
            .field("type_name", &entity.type_name)
            .field("fields", &entity.fields)
            .finish()
    }
}

/// Ordered identifier values of an entity: `(field, value)` pairs in the
/// descriptor's identifier-field order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Identifier(Vec<(String, Value)>);

impl Identifier {
    /// Creates an identifier from `(field, value)` pairs.
    #[must_use]
    pub fn new(pairs: Vec<(String, Value)>) -> Self {
        Self(pairs)
    }

    /// Creates a single-field identifier.
    pub fn single(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self(vec![(field.into(), value.into())])
    }

    /// Returns true if no components were captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true if any component is null.
    #[must_use]
    pub fn has_null(&self) -> bool {
        self.0.iter().any(|(_, v)| v.is_null())
    }

    /// Returns true if the identifier can key the identity map.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        !self.is_empty() && !self.has_null()
    }

    /// Returns the `(field, value)` pairs.
    #[must_use]
    pub fn pairs(&self) -> &[(String, Value)] {
        &self.0
    }

    /// Returns the values in field order.
    #[must_use]
    pub fn values(&self) -> Vec<Value> {
        self.0.iter().map(|(_, v)| v.clone()).collect()
    }

    /// Returns the first component.
    #[must_use]
    pub fn first(&self) -> Option<&(String, Value)> {
        self.0.first()
    }

    /// Joins the values with `separator` into an identity-map key.
    #[must_use]
    pub fn hash_key(&self, separator: &str) -> String {
        hash_values(self.0.iter().map(|(_, v)| v), separator)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (field, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{field}={value}")?;
        }
        Ok(())
    }
}

/// Joins identifier values into an identity-map key.
pub(crate) fn hash_values<'a>(values: impl Iterator<Item = &'a Value>, separator: &str) -> String {
    values
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(separator)
}
