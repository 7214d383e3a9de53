//! Persister for structured records.

use super::{Criterion, EntityPersister, PersisterBase};
use crate::error::CoreResult;
use crate::metadata::EntityDescriptor;
use ormkit_storage::{ConditionParam, Record, SaveOptions, StorageBackend, Value};
use std::sync::Arc;

/// Persister for [`crate::ElementKind::Structured`] types.
///
/// Columns are rendered bare and validated against the descriptor's
/// declared fields. Unpublished records are saved without the backend's
/// mandatory-field check so drafts can be stored incomplete.
#[derive(Debug)]
pub struct ObjectPersister {
    base: PersisterBase,
}

impl ObjectPersister {
    /// Creates a persister for `descriptor`.
    #[must_use]
    pub fn new(descriptor: Arc<EntityDescriptor>, backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            base: PersisterBase::new(descriptor, backend),
        }
    }
}

impl EntityPersister for ObjectPersister {
    fn base(&self) -> &PersisterBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut PersisterBase {
        &mut self.base
    }

    fn check_field(&self, field: &str) -> CoreResult<()> {
        self.descriptor().ensure_field(field)
    }

    fn column_sql(&self, field: &str) -> CoreResult<String> {
        self.check_field(field)?;
        Ok(field.to_string())
    }

    fn normalize_criterion(&self, criterion: &Criterion) -> CoreResult<ConditionParam> {
        match criterion {
            Criterion::Field { field, value } => self.field_condition(field, value),
            Criterion::Condition {
                condition,
                variable,
                concatenator,
            } => Ok(ConditionParam {
                condition: condition.clone(),
                variable: variable.clone(),
                concatenator: *concatenator,
            }),
        }
    }

    fn save_options(&self, fields: &Record) -> SaveOptions {
        let unpublished = matches!(fields.get("published"), Some(Value::Bool(false)));
        SaveOptions::default().omit_mandatory_check(unpublished)
    }
}
