//! Per-type query facade.

use crate::entity::EntityRef;
use crate::error::CoreResult;
use crate::manager::EntityManager;
use crate::metadata::EntityDescriptor;
use crate::persister::{Criteria, Criterion, OrderBy};
use ormkit_storage::Value;
use std::sync::Arc;

/// Loads entities of one type through an [`EntityManager`].
///
/// Every loaded row is passed through the unit of work, so a row already
/// tracked comes back as the tracked instance.
#[derive(Debug)]
pub struct EntityRepository<'a> {
    manager: &'a mut EntityManager,
    descriptor: Arc<EntityDescriptor>,
}

impl<'a> EntityRepository<'a> {
    pub(crate) fn new(manager: &'a mut EntityManager, descriptor: Arc<EntityDescriptor>) -> Self {
        Self {
            manager,
            descriptor,
        }
    }

    /// Returns the managed type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        self.descriptor.type_name()
    }

    /// Returns the type's descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &Arc<EntityDescriptor> {
        &self.descriptor
    }

    /// Finds one entity by identifier values.
    ///
    /// # Errors
    ///
    /// See [`EntityManager::find`].
    pub fn find(&mut self, identifier: &[Value]) -> CoreResult<Option<EntityRef>> {
        self.manager.find(self.descriptor.type_name(), identifier)
    }

    /// Loads every published entity of the type.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::ManagerClosed`] if the manager is closed,
    /// or a backend error.
    pub fn find_all(&mut self) -> CoreResult<Vec<EntityRef>> {
        self.find_by(&[], &[], None, None)
    }

    /// Loads the entities matching `criteria`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::ManagerClosed`] if the manager is closed,
    /// a normalization error, or a backend error.
    pub fn find_by(
        &mut self,
        criteria: &[Criterion],
        order_by: &[OrderBy],
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> CoreResult<Vec<EntityRef>> {
        self.manager.ensure_open()?;
        let uow = self.manager.unit_of_work_mut();
        let loaded = uow
            .entity_persister(self.descriptor.type_name())?
            .load_all(criteria, order_by, limit, offset)?;
        loaded.into_iter().map(|entity| uow.hydrate(entity)).collect()
    }

    /// Loads the first entity matching `criteria`.
    ///
    /// # Errors
    ///
    /// Same as [`EntityRepository::find_by`].
    pub fn find_one_by(
        &mut self,
        criteria: &[Criterion],
        order_by: &[OrderBy],
    ) -> CoreResult<Option<EntityRef>> {
        self.manager.ensure_open()?;
        let uow = self.manager.unit_of_work_mut();
        let loaded = uow
            .entity_persister(self.descriptor.type_name())?
            .load(criteria, order_by)?;
        loaded.map(|entity| uow.hydrate(entity)).transpose()
    }

    /// Counts the published entities matching `criteria`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::ManagerClosed`] if the manager is closed,
    /// a normalization error, or a backend error.
    pub fn count(&mut self, criteria: &[Criterion]) -> CoreResult<u64> {
        self.manager.ensure_open()?;
        self.manager
            .unit_of_work_mut()
            .entity_persister(self.descriptor.type_name())?
            .count(criteria)
    }

    /// Loads the entities selected by a criteria object.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::ManagerClosed`] if the manager is closed,
    /// a translation error such as [`crate::CoreError::Unsupported`] for
    /// `NOT`, or a backend error.
    pub fn matching(&mut self, criteria: &Criteria) -> CoreResult<Vec<EntityRef>> {
        self.manager.ensure_open()?;
        let uow = self.manager.unit_of_work_mut();
        let loaded = uow
            .entity_persister(self.descriptor.type_name())?
            .load_criteria(criteria)?;
        loaded.into_iter().map(|entity| uow.hydrate(entity)).collect()
    }

    /// Counts the entities selected by a criteria object, ignoring paging.
    ///
    /// # Errors
    ///
    /// Same as [`EntityRepository::matching`].
    pub fn count_matching(&mut self, criteria: &Criteria) -> CoreResult<u64> {
        self.manager.ensure_open()?;
        self.manager
            .unit_of_work_mut()
            .entity_persister(self.descriptor.type_name())?
            .count_criteria(criteria)
    }

    /// Detaches every tracked entity of the type.
    ///
    /// # Errors
    ///
    /// Propagates the unit of work's error.
    pub fn clear(&mut self) -> CoreResult<()> {
        self.manager.clear(Some(self.descriptor.type_name()))
    }
}
