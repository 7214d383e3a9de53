//! Identity map and per-entity bookkeeping.

use crate::entity::{EntityRef, Identifier, ObjectId};
use crate::error::{CoreError, CoreResult};
use crate::types::EntityState;
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Tracks which instance represents each `(type, identifier)` and the
/// lifecycle state and captured identifier of every tracked entity.
///
/// # Invariants
///
/// - At most one entity per `(type, identifier hash)`; the first occupant wins
/// - A slot key never contains a null identifier component
/// - Bookkeeping is keyed by [`ObjectId`], never by field values
#[derive(Debug)]
pub(crate) struct IdentityMap {
    separator: &'static str,
    entries: HashMap<String, HashMap<String, EntityRef>>,
    identifiers: HashMap<ObjectId, Identifier>,
    states: HashMap<ObjectId, EntityState>,
    detached: HashSet<ObjectId>,
}

impl IdentityMap {
    pub(crate) fn new(separator: &'static str) -> Self {
        Self {
            separator,
            entries: HashMap::new(),
            identifiers: HashMap::new(),
            states: HashMap::new(),
            detached: HashSet::new(),
        }
    }

    pub(crate) fn separator(&self) -> &'static str {
        self.separator
    }

    pub(crate) fn state(&self, oid: ObjectId) -> Option<EntityState> {
        self.states.get(&oid).copied()
    }

    pub(crate) fn set_state(&mut self, oid: ObjectId, state: EntityState) {
        self.detached.remove(&oid);
        self.states.insert(oid, state);
    }

    pub(crate) fn identifier(&self, oid: ObjectId) -> Option<&Identifier> {
        self.identifiers.get(&oid)
    }

    pub(crate) fn set_identifier(&mut self, oid: ObjectId, identifier: Identifier) {
        self.identifiers.insert(oid, identifier);
    }

    /// Returns true if `oid` was explicitly detached and not re-managed since.
    pub(crate) fn is_detached(&self, oid: ObjectId) -> bool {
        self.detached.contains(&oid)
    }

    /// Drops state and captured identifier. Does not touch map slots.
    pub(crate) fn forget(&mut self, oid: ObjectId) {
        self.states.remove(&oid);
        self.identifiers.remove(&oid);
    }

    /// Drops all bookkeeping for `oid` and remembers it as detached.
    pub(crate) fn mark_detached(&mut self, oid: ObjectId) {
        self.forget(oid);
        self.detached.insert(oid);
    }

    fn usable_key(&self, entity: &EntityRef, type_name: &str) -> CoreResult<String> {
        match self.identifiers.get(&entity.oid()) {
            Some(identifier) if identifier.is_usable() => Ok(identifier.hash_key(self.separator)),
            _ => Err(CoreError::missing_identity(type_name)),
        }
    }

    /// Adds `entity` under its captured identifier.
    ///
    /// Returns `Ok(false)` when the slot is already occupied.
    pub(crate) fn add(&mut self, entity: &EntityRef, type_name: &str) -> CoreResult<bool> {
        let key = self.usable_key(entity, type_name)?;
        let slots = self.entries.entry(type_name.to_string()).or_default();
        if let Some(occupant) = slots.get(&key) {
            if !occupant.same_as(entity) {
                warn!(
                    type_name = %type_name,
                    identifier = %key,
                    occupant = %occupant.oid(),
                    rejected = %entity.oid(),
                    "identity map slot already occupied"
                );
            }
            return Ok(false);
        }
        slots.insert(key, entity.clone());
        Ok(true)
    }

    /// Removes `entity` from its slot if it is the occupant.
    pub(crate) fn remove(&mut self, entity: &EntityRef, type_name: &str) -> CoreResult<bool> {
        let key = match self.identifiers.get(&entity.oid()) {
            Some(identifier) if !identifier.is_empty() => identifier.hash_key(self.separator),
            _ => return Err(CoreError::missing_identity(type_name)),
        };
        let Some(slots) = self.entries.get_mut(type_name) else {
            return Ok(false);
        };
        match slots.get(&key) {
            Some(occupant) if occupant.same_as(entity) => {
                slots.remove(&key);
                if slots.is_empty() {
                    self.entries.remove(type_name);
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Returns true if `entity` occupies the slot of its captured identifier.
    pub(crate) fn contains(&self, entity: &EntityRef, type_name: &str) -> bool {
        let Some(identifier) = self.identifiers.get(&entity.oid()) else {
            return false;
        };
        if identifier.is_empty() {
            return false;
        }
        self.get(type_name, &identifier.hash_key(self.separator))
            .is_some_and(|occupant| occupant.same_as(entity))
    }

    pub(crate) fn get(&self, type_name: &str, key: &str) -> Option<&EntityRef> {
        self.entries.get(type_name).and_then(|slots| slots.get(key))
    }

    /// Returns a snapshot of the entities tracked under `type_name`.
    pub(crate) fn entities_of(&self, type_name: &str) -> Vec<EntityRef> {
        let mut entities: Vec<_> = self
            .entries
            .get(type_name)
            .map(|slots| slots.values().cloned().collect())
            .unwrap_or_default();
        entities.sort_by_key(EntityRef::oid);
        entities
    }

    /// Number of map entries across all types.
    pub(crate) fn len(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.identifiers.clear();
        self.states.clear();
        self.detached.clear();
    }
}
