//! Entity manager: the session facade over a unit of work.

use crate::config::ManagerConfig;
use crate::entity::{EntityRef, Identifier};
use crate::error::{CoreError, CoreResult};
use crate::metadata::{DescriptorRegistry, EntityDescriptor};
use crate::repository::EntityRepository;
use crate::types::SessionId;
use crate::unit_of_work::UnitOfWork;
use ormkit_storage::{StorageBackend, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Entry point for working with managed entities in one session.
///
/// The manager forwards lifecycle calls to its [`UnitOfWork`] and refuses
/// most of them once closed. A commit that fails and rolls back closes the
/// manager; open a new one to continue.
///
/// # Example
///
/// ```rust
/// use ormkit_core::{EntityDescriptor, EntityManager, EntityRef, StaticRegistry};
/// use ormkit_storage::{record, InMemoryBackend, Value};
/// use std::sync::Arc;
///
/// let registry = StaticRegistry::new()
///     .with(EntityDescriptor::structured("product"))
///     .unwrap();
/// let mut em = EntityManager::new(Arc::new(registry), Arc::new(InMemoryBackend::new()));
///
/// let lamp = EntityRef::create("product", record! { "name" => "lamp" });
/// em.persist(&lamp).unwrap();
/// em.flush().unwrap();
///
/// let found = em.find("product", &[Value::Integer(1)]).unwrap().unwrap();
/// assert!(found.same_as(&lamp));
/// ```
#[derive(Debug)]
pub struct EntityManager {
    unit_of_work: UnitOfWork,
    open: bool,
}

impl EntityManager {
    /// Creates a manager with the default configuration.
    #[must_use]
    pub fn new(registry: Arc<dyn DescriptorRegistry>, backend: Arc<dyn StorageBackend>) -> Self {
        Self::with_config(registry, backend, ManagerConfig::default())
    }

    /// Creates a manager with a custom configuration.
    #[must_use]
    pub fn with_config(
        registry: Arc<dyn DescriptorRegistry>,
        backend: Arc<dyn StorageBackend>,
        config: ManagerConfig,
    ) -> Self {
        let unit_of_work = UnitOfWork::new(registry, backend, config);
        debug!(session = %unit_of_work.session_id(), "opened entity manager");
        Self {
            unit_of_work,
            open: true,
        }
    }

    /// Returns the session id.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.unit_of_work.session_id()
    }

    pub(crate) fn ensure_open(&self) -> CoreResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(CoreError::ManagerClosed)
        }
    }

    /// Makes an entity managed and schedules it for insert or update.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ManagerClosed`] if closed, or the unit of work's
    /// error.
    pub fn persist(&mut self, entity: &EntityRef) -> CoreResult<()> {
        self.ensure_open()?;
        self.unit_of_work.persist(entity)
    }

    /// Schedules an entity for deletion.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ManagerClosed`] if closed, or the unit of work's
    /// error.
    pub fn remove(&mut self, entity: &EntityRef) -> CoreResult<()> {
        self.ensure_open()?;
        self.unit_of_work.remove(entity)
    }

    /// Merging is not supported.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ManagerClosed`] if closed, otherwise
    /// [`CoreError::Unsupported`].
    pub fn merge(&mut self, entity: &EntityRef) -> CoreResult<EntityRef> {
        self.ensure_open()?;
        self.unit_of_work.merge(entity)
    }

    /// Detaches every entity, or only those of `type_name`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownEntityType`] for an unregistered type.
    pub fn clear(&mut self, type_name: Option<&str>) -> CoreResult<()> {
        match type_name {
            None => {
                self.unit_of_work.clear_all();
                Ok(())
            }
            Some(type_name) => {
                let descriptor = self.unit_of_work.registry().descriptor(type_name)?;
                self.unit_of_work.clear(Some(descriptor.type_name()))
            }
        }
    }

    /// Stops tracking an entity. Pending changes to it are discarded.
    ///
    /// # Errors
    ///
    /// Propagates the unit of work's error.
    pub fn detach(&mut self, entity: &EntityRef) -> CoreResult<()> {
        self.unit_of_work.detach(entity)
    }

    /// Reloads a managed entity's fields from the backend.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ManagerClosed`] if closed, [`CoreError::NotManaged`]
    /// for untracked entities, or a backend error.
    pub fn refresh(&mut self, entity: &EntityRef) -> CoreResult<()> {
        self.ensure_open()?;
        self.unit_of_work.refresh(entity)
    }

    /// Writes every staged change in one transaction.
    ///
    /// A failure rolls the transaction back, detaches everything and closes
    /// the manager.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ManagerClosed`] if closed, or the commit error.
    pub fn flush(&mut self) -> CoreResult<()> {
        self.ensure_open()?;
        let result = self.unit_of_work.commit();
        if self.unit_of_work.is_rolled_back() {
            warn!(session = %self.session_id(), "closing entity manager after failed commit");
            self.open = false;
        }
        result
    }

    /// Finds an entity by its identifier values, in identifier-field order.
    ///
    /// The identity map is consulted first; a loaded row is registered as
    /// managed.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ManagerClosed`] if closed,
    /// [`CoreError::MissingIdentity`] for an empty or null identifier, or a
    /// backend error.
    pub fn find(&mut self, type_name: &str, identifier: &[Value]) -> CoreResult<Option<EntityRef>> {
        self.ensure_open()?;
        let descriptor = self.unit_of_work.registry().descriptor(type_name)?;
        if identifier.is_empty() || identifier.iter().any(Value::is_null) {
            return Err(CoreError::missing_identity(descriptor.type_name()));
        }

        if let Some(entity) = self
            .unit_of_work
            .try_get_by_id(descriptor.type_name(), identifier)
        {
            return Ok(Some(entity));
        }

        let loaded = self
            .unit_of_work
            .entity_persister(descriptor.type_name())?
            .load_by_id(identifier)?;
        loaded
            .map(|entity| self.unit_of_work.hydrate(entity))
            .transpose()
    }

    /// Returns a repository for `type_name`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownEntityType`] for an unregistered type.
    pub fn repository(&mut self, type_name: &str) -> CoreResult<EntityRepository<'_>> {
        let descriptor = self.descriptor(type_name)?;
        Ok(EntityRepository::new(self, descriptor))
    }

    /// Returns the descriptor for `type_name`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownEntityType`] for an unregistered type.
    pub fn descriptor(&self, type_name: &str) -> CoreResult<Arc<EntityDescriptor>> {
        self.unit_of_work.registry().descriptor(type_name)
    }

    /// Returns true if `entity` is scheduled for insert, or tracked in the
    /// identity map and not scheduled for delete.
    #[must_use]
    pub fn contains(&self, entity: &EntityRef) -> bool {
        self.unit_of_work.is_scheduled_for_insert(entity)
            || (self.unit_of_work.is_in_identity_map(entity)
                && !self.unit_of_work.is_scheduled_for_delete(entity))
    }

    /// Detaches everything and refuses further work.
    pub fn close(&mut self) {
        self.unit_of_work.clear_all();
        self.open = false;
        debug!(session = %self.session_id(), "closed entity manager");
    }

    /// Returns true until the manager is closed or a commit on its unit of
    /// work has rolled back.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open && !self.unit_of_work.is_rolled_back()
    }

    /// Registers `entity` as managed under `identifier`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MissingIdentity`] for an unusable identifier.
    pub fn register_managed(&mut self, entity: &EntityRef, identifier: Identifier) -> CoreResult<()> {
        self.unit_of_work.register_managed(entity, identifier)
    }

    /// Returns the unit of work.
    #[must_use]
    pub fn unit_of_work(&self) -> &UnitOfWork {
        &self.unit_of_work
    }

    /// Returns the unit of work mutably.
    pub fn unit_of_work_mut(&mut self) -> &mut UnitOfWork {
        &mut self.unit_of_work
    }
}
