//! Persister for documents and assets.

use super::{Criterion, EntityPersister, PersisterBase};
use crate::error::CoreResult;
use crate::metadata::EntityDescriptor;
use ormkit_storage::{ConditionParam, StorageBackend};
use std::sync::Arc;

/// Persister for [`crate::ElementKind::DocumentLike`] and
/// [`crate::ElementKind::AssetLike`] types.
///
/// Columns are backtick-quoted, since element tables use reserved words
/// such as `key` and `type` as column names. A condition criterion without
/// a placeholder names a column and is lowered to `` `column` = ? ``.
#[derive(Debug)]
pub struct ElementPersister {
    base: PersisterBase,
}

impl ElementPersister {
    /// Creates a persister for `descriptor`.
    #[must_use]
    pub fn new(descriptor: Arc<EntityDescriptor>, backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            base: PersisterBase::new(descriptor, backend),
        }
    }
}

impl EntityPersister for ElementPersister {
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
        Ok(format!("`{field}`"))
    }

    fn normalize_criterion(&self, criterion: &Criterion) -> CoreResult<ConditionParam> {
        match criterion {
            Criterion::Field { field, value } => self.field_condition(field, value),
            Criterion::Condition {
                condition,
                variable,
                concatenator,
            } => {
                let condition = if condition.contains('?') {
                    condition.clone()
                } else {
                    format!("{} = ?", self.column_sql(condition.trim())?)
                };
                Ok(ConditionParam {
                    condition,
                    variable: variable.clone(),
                    concatenator: *concatenator,
                })
            }
        }
    }
}
