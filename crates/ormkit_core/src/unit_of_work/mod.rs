//! Unit of work: state tracking, change scheduling and commit.
//!
//! The unit of work stages creates, updates and deletes in memory and
//! applies them as one backend transaction on [`UnitOfWork::commit`].
//!
//! ## Lifecycle
//!
//! ```text
//! NEW --persist--> MANAGED (scheduled for insert)
//! MANAGED --remove--> REMOVED (scheduled for delete)
//! REMOVED --persist--> MANAGED (delete cancelled)
//! MANAGED --detach--> untracked
//! ```

mod commit_order;
mod identity;

pub use commit_order::CommitOrderCalculator;

use crate::config::ManagerConfig;
use crate::entity::{hash_values, Entity, EntityRef, Identifier, ObjectId};
use crate::error::{CoreError, CoreResult};
use crate::metadata::{DescriptorRegistry, EntityDescriptor, Relations};
use crate::persister::{EntityPersister, PersisterFactory};
use crate::types::{EntityState, SessionId};
use identity::IdentityMap;
use ormkit_storage::{StorageBackend, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, debug_span, error};

type ChangeSet = BTreeMap<ObjectId, EntityRef>;

/// Tracks entity states and pending changes for one session.
///
/// # Invariants
///
/// - An entity is staged in at most one of insertions, updates, deletions
/// - Every staged deletion has state [`EntityState::Removed`]
/// - A failed commit leaves nothing tracked and the backend rolled back
pub struct UnitOfWork {
    session: SessionId,
    config: ManagerConfig,
    registry: Arc<dyn DescriptorRegistry>,
    backend: Arc<dyn StorageBackend>,
    factory: PersisterFactory,
    persisters: HashMap<String, Box<dyn EntityPersister>>,
    identity: IdentityMap,
    insertions: ChangeSet,
    updates: ChangeSet,
    deletions: ChangeSet,
    rolled_back: bool,
}

impl UnitOfWork {
    /// Creates a unit of work over `registry` and `backend`.
    #[must_use]
    pub fn new(
        registry: Arc<dyn DescriptorRegistry>,
        backend: Arc<dyn StorageBackend>,
        config: ManagerConfig,
    ) -> Self {
        Self::with_session(SessionId::new(), registry, backend, config)
    }

    /// Creates a unit of work labelled with an existing session id.
    #[must_use]
    pub fn with_session(
        session: SessionId,
        registry: Arc<dyn DescriptorRegistry>,
        backend: Arc<dyn StorageBackend>,
        config: ManagerConfig,
    ) -> Self {
        Self {
            session,
            identity: IdentityMap::new(config.identifier_separator),
            config,
            registry,
            factory: PersisterFactory::new(Arc::clone(&backend)),
            backend,
            persisters: HashMap::new(),
            insertions: ChangeSet::new(),
            updates: ChangeSet::new(),
            deletions: ChangeSet::new(),
            rolled_back: false,
        }
    }

    /// Returns the session id.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Returns the descriptor registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<dyn DescriptorRegistry> {
        &self.registry
    }

    /// Returns true once a commit has failed and been rolled back.
    ///
    /// The flag stays set; an owning manager treats it as closed.
    #[must_use]
    pub fn is_rolled_back(&self) -> bool {
        self.rolled_back
    }

    fn descriptor_of(&self, entity: &EntityRef) -> CoreResult<Arc<EntityDescriptor>> {
        self.registry.descriptor(&entity.type_name())
    }

    /// Returns the persister for `type_name`, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownEntityType`] if the type has no descriptor.
    pub fn entity_persister(
        &mut self,
        type_name: &str,
    ) -> CoreResult<&mut (dyn EntityPersister + 'static)> {
        if !self.persisters.contains_key(type_name) {
            let descriptor = self.registry.descriptor(type_name)?;
            let persister = self.factory.create(descriptor);
            self.persisters.insert(type_name.to_string(), persister);
        }
        self.persisters
            .get_mut(type_name)
            .map(|persister| &mut **persister)
            .ok_or_else(|| CoreError::unknown_type(type_name))
    }

    /// Resolves the lifecycle state of `entity`.
    ///
    /// A tracked state wins. Otherwise `assume` is returned if given.
    /// Otherwise the identifier decides: none means [`EntityState::New`];
    /// an identity-map hit or a positive backend probe means
    /// [`EntityState::Detached`].
    ///
    /// # Errors
    ///
    /// Propagates registry and backend errors from the probe.
    pub fn entity_state(
        &mut self,
        entity: &EntityRef,
        assume: Option<EntityState>,
    ) -> CoreResult<EntityState> {
        let oid = entity.oid();
        if let Some(state) = self.identity.state(oid) {
            return Ok(state);
        }
        if self.identity.is_detached(oid) {
            return Ok(EntityState::Detached);
        }
        if let Some(assume) = assume {
            return Ok(assume);
        }

        let descriptor = self.descriptor_of(entity)?;
        let identifier = descriptor.identifier_values(&entity.read());
        if !identifier.is_usable() {
            return Ok(EntityState::New);
        }
        let key = identifier.hash_key(self.identity.separator());
        if self.identity.get(descriptor.type_name(), &key).is_some() {
            return Ok(EntityState::Detached);
        }
        if self.config.probe_backend_for_state
            && self.entity_persister(descriptor.type_name())?.exists(entity, None)?
        {
            return Ok(EntityState::Detached);
        }
        Ok(EntityState::New)
    }

    /// Makes `entity` managed, scheduling an insert for new entities.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidStateTransition`] for detached entities.
    pub fn persist(&mut self, entity: &EntityRef) -> CoreResult<()> {
        let descriptor = self.descriptor_of(entity)?;
        let oid = entity.oid();

        match self.entity_state(entity, Some(EntityState::New))? {
            EntityState::New => {
                self.schedule_for_insert(entity)?;
                self.identity.set_state(oid, EntityState::Managed);
            }
            EntityState::Managed => {
                if !self.insertions.contains_key(&oid) && !self.updates.contains_key(&oid) {
                    debug!(oid = %oid, type_name = %descriptor.type_name(), "scheduled update");
                    self.updates.insert(oid, entity.clone());
                }
            }
            EntityState::Removed => {
                self.deletions.remove(&oid);
                self.identity.add(entity, descriptor.type_name())?;
                self.identity.set_state(oid, EntityState::Managed);
                debug!(oid = %oid, type_name = %descriptor.type_name(), "cancelled delete");
            }
            EntityState::Detached => {
                return Err(CoreError::invalid_state(format!(
                    "cannot persist detached entity {oid}"
                )))
            }
        }
        Ok(())
    }

    /// Schedules a managed entity for deletion.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidStateTransition`] for detached entities.
    pub fn remove(&mut self, entity: &EntityRef) -> CoreResult<()> {
        match self.entity_state(entity, None)? {
            EntityState::New | EntityState::Removed => Ok(()),
            EntityState::Managed => self.schedule_for_delete(entity),
            EntityState::Detached => Err(CoreError::invalid_state(format!(
                "cannot remove detached entity {}",
                entity.oid()
            ))),
        }
    }

    /// Stages `entity` for insertion.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidStateTransition`] if the entity is already
    /// staged in any change set.
    pub fn schedule_for_insert(&mut self, entity: &EntityRef) -> CoreResult<()> {
        let oid = entity.oid();
        if self.updates.contains_key(&oid) {
            return Err(CoreError::invalid_state(format!(
                "entity {oid} is scheduled for update"
            )));
        }
        if self.deletions.contains_key(&oid) {
            return Err(CoreError::invalid_state(format!(
                "entity {oid} is scheduled for delete"
            )));
        }
        if self.insertions.contains_key(&oid) {
            return Err(CoreError::invalid_state(format!(
                "entity {oid} is already scheduled for insert"
            )));
        }

        let type_name = entity.type_name();
        self.insertions.insert(oid, entity.clone());
        if self.identity.identifier(oid).is_some() {
            self.identity.add(entity, &type_name)?;
        }
        debug!(oid = %oid, type_name = %type_name, "scheduled insert");
        Ok(())
    }

    /// Stages `entity` for deletion, or cancels its pending insert.
    ///
    /// # Errors
    ///
    /// Propagates identity-map errors.
    pub fn schedule_for_delete(&mut self, entity: &EntityRef) -> CoreResult<()> {
        let oid = entity.oid();
        let type_name = entity.type_name();

        if self.insertions.remove(&oid).is_some() {
            if self.identity.contains(entity, &type_name) {
                self.identity.remove(entity, &type_name)?;
            }
            self.identity.forget(oid);
            debug!(oid = %oid, type_name = %type_name, "cancelled insert");
            return Ok(());
        }

        if !self.identity.contains(entity, &type_name) {
            return Ok(());
        }

        self.identity.remove(entity, &type_name)?;
        self.updates.remove(&oid);
        if !self.deletions.contains_key(&oid) {
            self.deletions.insert(oid, entity.clone());
            self.identity.set_state(oid, EntityState::Removed);
            debug!(oid = %oid, type_name = %type_name, "scheduled delete");
        }
        Ok(())
    }

    /// Stops tracking a managed entity.
    ///
    /// A detached handle is classified [`EntityState::Detached`] until it is
    /// registered again.
    ///
    /// # Errors
    ///
    /// Propagates identity-map errors.
    pub fn detach(&mut self, entity: &EntityRef) -> CoreResult<()> {
        if self.entity_state(entity, Some(EntityState::Detached))? != EntityState::Managed {
            return Ok(());
        }

        let oid = entity.oid();
        let type_name = entity.type_name();
        if self.identity.contains(entity, &type_name) {
            self.identity.remove(entity, &type_name)?;
        }
        self.insertions.remove(&oid);
        self.updates.remove(&oid);
        self.deletions.remove(&oid);
        self.identity.mark_detached(oid);
        debug!(oid = %oid, type_name = %type_name, "detached");
        Ok(())
    }

    /// Reloads a managed entity's fields from the backend.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotManaged`] if the entity is not managed and
    /// [`CoreError::EntityNotFound`] if its row is gone.
    pub fn refresh(&mut self, entity: &EntityRef) -> CoreResult<()> {
        if self.entity_state(entity, None)? != EntityState::Managed {
            return Err(CoreError::NotManaged {
                oid: entity.oid().to_string(),
            });
        }
        self.entity_persister(&entity.type_name())?.refresh(entity)
    }

    /// Always fails: merging detached copies is not supported.
    ///
    /// # Errors
    ///
    /// Always returns [`CoreError::Unsupported`].
    pub fn merge(&mut self, _entity: &EntityRef) -> CoreResult<EntityRef> {
        Err(CoreError::unsupported("merge"))
    }

    /// Clears tracking for one type, or everything when `type_name` is `None`.
    ///
    /// Clearing one type detaches its identity-map entries and drops its
    /// pending insertions; the type name must match exactly.
    ///
    /// # Errors
    ///
    /// Propagates identity-map errors.
    pub fn clear(&mut self, type_name: Option<&str>) -> CoreResult<()> {
        let Some(type_name) = type_name else {
            self.clear_all();
            return Ok(());
        };

        for entity in self.identity.entities_of(type_name) {
            self.detach(&entity)?;
        }
        let pending: Vec<_> = self
            .insertions
            .values()
            .filter(|entity| entity.type_name() == type_name)
            .cloned()
            .collect();
        for entity in pending {
            self.insertions.remove(&entity.oid());
            self.identity.forget(entity.oid());
        }
        debug!(session = %self.session, type_name = %type_name, "cleared type");
        Ok(())
    }

    /// Drops every tracked entity and staged change.
    pub fn clear_all(&mut self) {
        self.identity.clear();
        self.insertions.clear();
        self.updates.clear();
        self.deletions.clear();
        debug!(session = %self.session, "cleared unit of work");
    }

    /// Marks `entity` managed under `identifier` and adds it to the
    /// identity map. If the slot is taken, the earlier occupant stays.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MissingIdentity`] if the identifier is empty or
    /// has a null component.
    pub fn register_managed(&mut self, entity: &EntityRef, identifier: Identifier) -> CoreResult<()> {
        let type_name = entity.type_name();
        if !identifier.is_usable() {
            return Err(CoreError::missing_identity(type_name));
        }
        let oid = entity.oid();
        self.identity.set_identifier(oid, identifier);
        self.identity.set_state(oid, EntityState::Managed);
        self.identity.add(entity, &type_name)?;
        Ok(())
    }

    /// Adds `entity` to the identity map under its captured identifier.
    ///
    /// Returns `false` if the slot is already occupied.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MissingIdentity`] if no usable identifier was
    /// captured.
    pub fn add_to_identity_map(&mut self, entity: &EntityRef) -> CoreResult<bool> {
        self.identity.add(entity, &entity.type_name())
    }

    /// Removes `entity` from the identity map.
    ///
    /// Returns `false` if it was not present.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MissingIdentity`] if no identifier was captured.
    pub fn remove_from_identity_map(&mut self, entity: &EntityRef) -> CoreResult<bool> {
        self.identity.remove(entity, &entity.type_name())
    }

    /// Returns true if `entity` is the identity-map occupant for its key.
    #[must_use]
    pub fn is_in_identity_map(&self, entity: &EntityRef) -> bool {
        self.identity.contains(entity, &entity.type_name())
    }

    /// Returns true if `entity` is staged for insertion.
    #[must_use]
    pub fn is_scheduled_for_insert(&self, entity: &EntityRef) -> bool {
        self.insertions.contains_key(&entity.oid())
    }

    /// Returns true if `entity` is staged for update.
    #[must_use]
    pub fn is_scheduled_for_update(&self, entity: &EntityRef) -> bool {
        self.updates.contains_key(&entity.oid())
    }

    /// Returns true if `entity` is staged for deletion.
    #[must_use]
    pub fn is_scheduled_for_delete(&self, entity: &EntityRef) -> bool {
        self.deletions.contains_key(&entity.oid())
    }

    /// Returns true if any change is staged.
    #[must_use]
    pub fn has_pending_changes(&self) -> bool {
        !(self.insertions.is_empty() && self.updates.is_empty() && self.deletions.is_empty())
    }

    /// Returns the captured identifier of `entity`.
    #[must_use]
    pub fn identifier_of(&self, entity: &EntityRef) -> Option<&Identifier> {
        self.identity.identifier(entity.oid())
    }

    /// Looks up a tracked entity by type and identifier values.
    #[must_use]
    pub fn try_get_by_id(&self, type_name: &str, identifier: &[Value]) -> Option<EntityRef> {
        if identifier.is_empty() || identifier.iter().any(Value::is_null) {
            return None;
        }
        let key = hash_values(identifier.iter(), self.identity.separator());
        self.identity.get(type_name, &key).cloned()
    }

    /// Number of identity-map entries.
    #[must_use]
    pub fn size(&self) -> usize {
        self.identity.len()
    }

    /// Materializes a loaded row as a managed entity.
    ///
    /// Returns the tracked instance if the identity map already holds one
    /// for the row's identifier, or the instance staged for deleting that
    /// row.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MissingIdentity`] if the row has no usable
    /// identifier.
    pub fn hydrate(&mut self, entity: Entity) -> CoreResult<EntityRef> {
        let descriptor = self.registry.descriptor(entity.type_name())?;
        let identifier = descriptor.identifier_values(&entity);
        if !identifier.is_usable() {
            return Err(CoreError::missing_identity(descriptor.type_name()));
        }

        let key = identifier.hash_key(self.identity.separator());
        if let Some(tracked) = self.identity.get(descriptor.type_name(), &key) {
            return Ok(tracked.clone());
        }
        if let Some(removed) = self.pending_delete(descriptor.type_name(), &key) {
            return Ok(removed);
        }

        let entity = EntityRef::new(entity);
        self.register_managed(&entity, identifier)?;
        Ok(entity)
    }

    fn pending_delete(&self, type_name: &str, key: &str) -> Option<EntityRef> {
        let separator = self.identity.separator();
        self.deletions
            .values()
            .find(|entity| {
                entity.type_name() == type_name
                    && self
                        .identity
                        .identifier(entity.oid())
                        .is_some_and(|id| id.hash_key(separator) == key)
            })
            .cloned()
    }

    /// Applies every staged change in one backend transaction.
    ///
    /// Inserts and updates run in dependency order, deletions in reverse
    /// dependency order. On failure the transaction is rolled back, all
    /// tracking is cleared and the error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CyclicDependency`] under
    /// [`crate::CyclePolicy::Fail`], or the first registry or backend error.
    pub fn commit(&mut self) -> CoreResult<()> {
        if !self.has_pending_changes() {
            return Ok(());
        }

        let span = debug_span!(
            "commit",
            session = %self.session,
            inserts = self.insertions.len(),
            updates = self.updates.len(),
            deletions = self.deletions.len(),
        );
        let _enter = span.enter();

        let order = self.commit_order()?;
        self.backend.begin_transaction()?;

        let result = self.execute(&order).and_then(|inserted| {
            self.backend.commit_transaction()?;
            Ok(inserted)
        });
        let inserted = match result {
            Ok(inserted) => inserted,
            Err(err) => return Err(self.abort(err)),
        };

        for entity in std::mem::take(&mut self.deletions).into_values() {
            self.identity.forget(entity.oid());
        }
        if self.config.register_generated_identifiers {
            for (entity, id) in inserted {
                self.register_inserted(&entity, id)?;
            }
        }
        self.insertions.clear();
        self.updates.clear();
        debug!("commit complete");
        Ok(())
    }

    fn execute(&mut self, order: &[Arc<EntityDescriptor>]) -> CoreResult<Vec<(EntityRef, Value)>> {
        let mut inserted = Vec::with_capacity(self.insertions.len());

        for descriptor in order {
            let batch = Self::of_type(&self.insertions, descriptor.type_name());
            if batch.is_empty() {
                continue;
            }
            let persister = self.entity_persister(descriptor.type_name())?;
            for entity in batch {
                persister.add_insert(entity);
            }
            inserted.extend(persister.execute_inserts()?);
        }

        for descriptor in order {
            let batch = Self::of_type(&self.updates, descriptor.type_name());
            if batch.is_empty() {
                continue;
            }
            let persister = self.entity_persister(descriptor.type_name())?;
            for entity in &batch {
                persister.update(entity)?;
            }
        }

        for descriptor in order.iter().rev() {
            let batch = Self::of_type(&self.deletions, descriptor.type_name());
            if batch.is_empty() {
                continue;
            }
            let persister = self.entity_persister(descriptor.type_name())?;
            for entity in &batch {
                persister.delete(entity)?;
            }
        }

        Ok(inserted)
    }

    fn of_type(changes: &ChangeSet, type_name: &str) -> Vec<EntityRef> {
        changes
            .values()
            .filter(|entity| entity.type_name() == type_name)
            .cloned()
            .collect()
    }

    fn abort(&mut self, err: CoreError) -> CoreError {
        for persister in self.persisters.values_mut() {
            persister.clear_inserts();
        }
        self.clear_all();
        if let Err(rollback) = self.backend.rollback_transaction() {
            error!(session = %self.session, error = %rollback, "rollback failed");
        }
        self.rolled_back = true;
        debug!(error = %err, "commit rolled back");
        err
    }

    fn register_inserted(&mut self, entity: &EntityRef, id: Value) -> CoreResult<()> {
        let descriptor = self.descriptor_of(entity)?;
        if entity.get(descriptor.primary_identifier()).is_null() {
            entity.set(descriptor.primary_identifier(), id);
        }
        let identifier = descriptor.identifier_values(&entity.read());
        if identifier.is_usable() {
            self.register_managed(entity, identifier)?;
        } else {
            debug!(oid = %entity.oid(), "inserted entity has no usable identifier");
        }
        Ok(())
    }

    /// Computes the dependency order over every type with staged changes.
    fn commit_order(&self) -> CoreResult<Vec<Arc<EntityDescriptor>>> {
        let mut committed: Vec<String> = Vec::new();
        for entity in self
            .insertions
            .values()
            .chain(self.updates.values())
            .chain(self.deletions.values())
        {
            let type_name = entity.type_name();
            if !committed.contains(&type_name) {
                committed.push(type_name);
            }
        }

        let mut calc = CommitOrderCalculator::new();
        for type_name in &committed {
            let descriptor = self.registry.descriptor(type_name)?;
            calc.add_node(Arc::clone(&descriptor));

            let related: Vec<&String> = match descriptor.relations() {
                Relations::None => continue,
                Relations::Unresolved => committed.iter().collect(),
                Relations::Declared(types) => committed
                    .iter()
                    .filter(|name| types.contains(name.as_str()))
                    .collect(),
            };
            for related in related {
                if related == type_name {
                    continue;
                }
                if !calc.has_node(related) {
                    calc.add_node(self.registry.descriptor(related)?);
                }
                calc.add_dependency(related, type_name);
            }
        }

        calc.sort(self.config.cycle_policy)
    }
}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("session", &self.session)
            .field("identity_map_size", &self.identity.len())
            .field("insertions", &self.insertions.len())
            .field("updates", &self.updates.len())
            .field("deletions", &self.deletions.len())
            .field("rolled_back", &self.rolled_back)
            .finish_non_exhaustive()
    }
}
