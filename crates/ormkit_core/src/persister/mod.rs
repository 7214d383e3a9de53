//! Per-type persisters.
//!
//! A persister turns generic load and write requests for one entity type
//! into [`StorageBackend`] calls. The shared behavior lives in default
//! methods of [`EntityPersister`]; the two implementations differ in how
//! they render columns, normalize criteria and pick save options.

mod criteria;
mod element;
mod expression;
mod object;

pub use criteria::{Criteria, Criterion, OrderBy};
pub use element::ElementPersister;
pub use expression::{
    CompositeKind, Expr, ExpressionVisitor, Operator, SqlExpressionVisitor, SqlValueVisitor,
    COMPARISON_MAP,
};
pub use object::ObjectPersister;

use crate::entity::{Entity, EntityRef};
use crate::error::{CoreError, CoreResult};
use crate::metadata::{ElementKind, EntityDescriptor};
use ormkit_storage::{
    ConditionParam, OrderClause, Query, Record, SaveOptions, StorageBackend, Value,
};
use std::fmt;
use std::sync::Arc;

/// State shared by every persister implementation.
pub struct PersisterBase {
    descriptor: Arc<EntityDescriptor>,
    backend: Arc<dyn StorageBackend>,
    queued_inserts: Vec<EntityRef>,
}

impl PersisterBase {
    /// Creates the shared state for `descriptor`.
    #[must_use]
    pub fn new(descriptor: Arc<EntityDescriptor>, backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            descriptor,
            backend,
            queued_inserts: Vec::new(),
        }
    }
}

impl fmt::Debug for PersisterBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersisterBase")
            .field("type_name", &self.descriptor.type_name())
            .field("queued_inserts", &self.queued_inserts.len())
            .finish()
    }
}

/// Wraps a criteria expression's SQL and parameters into one condition.
fn expression_condition(sql: String, mut params: Vec<Value>) -> ConditionParam {
    let condition = ConditionParam::new(sql);
    match params.len() {
        0 => condition,
        1 => condition.with_variable(params.remove(0)),
        _ => condition.with_variable(Value::List(params)),
    }
}

/// Loads and writes entities of one type.
///
/// # Invariants
///
/// - Queued inserts are written only by [`EntityPersister::execute_inserts`]
/// - The insert queue is empty after `execute_inserts`, even when it fails
/// - Load methods never register entities; hydration is the caller's job
pub trait EntityPersister: Send + Sync {
    /// Returns the shared state.
    fn base(&self) -> &PersisterBase;

    /// Returns the shared state mutably.
    fn base_mut(&mut self) -> &mut PersisterBase;

    /// Checks that `field` may appear in criteria or ordering.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnrecognizedField`] for unknown fields.
    fn check_field(&self, field: &str) -> CoreResult<()>;

    /// Renders `field` as a condition column.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnrecognizedField`] for unknown fields.
    fn column_sql(&self, field: &str) -> CoreResult<String>;

    /// Normalizes one criterion into a backend condition.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnrecognizedField`] for unknown fields.
    fn normalize_criterion(&self, criterion: &Criterion) -> CoreResult<ConditionParam>;

    /// Returns the save options for a record about to be written.
    fn save_options(&self, _fields: &Record) -> SaveOptions {
        SaveOptions::default()
    }

    /// Returns the descriptor of the persisted type.
    fn descriptor(&self) -> &Arc<EntityDescriptor> {
        &self.base().descriptor
    }

    /// Returns the backend.
    fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.base().backend
    }

    /// Normalizes criteria, in order.
    ///
    /// # Errors
    ///
    /// Propagates [`EntityPersister::normalize_criterion`] errors.
    fn normalize_criteria(&self, criteria: &[Criterion]) -> CoreResult<Vec<ConditionParam>> {
        criteria
            .iter()
            .map(|criterion| self.normalize_criterion(criterion))
            .collect()
    }

    /// Normalizes and validates orderings.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] for malformed orderings and
    /// [`CoreError::UnrecognizedField`] for unknown keys.
    fn normalize_order_by(&self, order_by: &[OrderBy]) -> CoreResult<Vec<OrderClause>> {
        order_by
            .iter()
            .map(|order| {
                let clause = order.normalize()?;
                self.check_field(&clause.key)?;
                Ok(clause)
            })
            .collect()
    }

    /// Renders one field condition.
    ///
    /// With an operator, null equality becomes `IS NULL` and null
    /// inequality `IS NOT NULL`; every other operator uses its template.
    /// Without one, a null value becomes `IS NULL`, a list becomes
    /// `IN (?)` (or-ed with `IS NULL` when it contains null) and anything
    /// else becomes `= ?`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnrecognizedField`] for unknown fields.
    fn select_condition_statement_sql(
        &self,
        field: &str,
        value: &Value,
        operator: Option<Operator>,
    ) -> CoreResult<String> {
        let column = self.column_sql(field)?;

        if let Some(operator) = operator {
            let sql = match operator {
                Operator::Eq | Operator::Is if value.is_null() => format!("{column} IS NULL"),
                Operator::Neq if value.is_null() => format!("{column} IS NOT NULL"),
                _ => format!("{column} {}", operator.template()),
            };
            return Ok(sql);
        }

        Ok(match value {
            Value::List(items) if items.iter().any(Value::is_null) => {
                format!("({column} IN (?) OR {column} IS NULL)")
            }
            Value::List(_) => format!("{column} IN (?)"),
            Value::Null => format!("{column} IS NULL"),
            _ => format!("{column} = ?"),
        })
    }

    /// Builds the condition for a raw `field => value` criterion.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnrecognizedField`] for unknown fields.
    fn field_condition(&self, field: &str, value: &Value) -> CoreResult<ConditionParam> {
        let condition = ConditionParam::new(self.select_condition_statement_sql(field, value, None)?);
        Ok(if value.is_null() {
            condition
        } else {
            condition.with_variable(value.clone())
        })
    }

    /// Renders the criteria's filter expression, or `""` when it has none.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Unsupported`] for `NOT` composites and
    /// [`CoreError::UnrecognizedField`] for unknown fields.
    fn select_condition_sql(&self, criteria: &Criteria) -> CoreResult<String> {
        match criteria.get_where_expr() {
            Some(expr) => SqlExpressionVisitor::new(self).dispatch(expr),
            None => Ok(String::new()),
        }
    }

    /// Collects the criteria's bound parameters in placeholder order.
    ///
    /// # Errors
    ///
    /// Propagates visitor errors.
    fn expand_criteria_parameters(&self, criteria: &Criteria) -> CoreResult<Vec<Value>> {
        let Some(expr) = criteria.get_where_expr() else {
            return Ok(Vec::new());
        };
        let mut visitor = SqlValueVisitor::new();
        visitor.dispatch(expr)?;
        Ok(visitor.into_params())
    }

    /// Builds the backend query for a criteria object.
    ///
    /// # Errors
    ///
    /// Propagates translation errors.
    fn criteria_query(&self, criteria: &Criteria) -> CoreResult<Query> {
        let mut query = Query::new()
            .limit(criteria.get_max_results())
            .offset(criteria.get_first_result())
            .include_unpublished(!criteria.is_hide_unpublished());

        if criteria.get_where_expr().is_some() {
            let sql = self.select_condition_sql(criteria)?;
            let params = self.expand_criteria_parameters(criteria)?;
            query = query.condition(expression_condition(sql, params));
        }
        for clause in criteria.orderings() {
            self.check_field(&clause.key)?;
            query = query.order(clause.clone());
        }
        Ok(query)
    }

    /// Loads the first entity matching `criteria`.
    ///
    /// # Errors
    ///
    /// Propagates normalization and backend errors.
    fn load(&self, criteria: &[Criterion], order_by: &[OrderBy]) -> CoreResult<Option<Entity>> {
        Ok(self
            .load_all(criteria, order_by, Some(1), None)?
            .into_iter()
            .next())
    }

    /// Loads an entity by its identifier values, in identifier-field order.
    ///
    /// Unpublished rows are included.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] if the number of values does
    /// not match the identifier fields.
    fn load_by_id(&self, identifier: &[Value]) -> CoreResult<Option<Entity>> {
        let fields = self.descriptor().identifier_fields();
        if fields.len() != identifier.len() {
            return Err(CoreError::invalid_argument(format!(
                "{} expects {} identifier values, got {}",
                self.descriptor().type_name(),
                fields.len(),
                identifier.len()
            )));
        }

        let mut query = Query::new().limit(Some(1)).include_unpublished(true);
        for (field, value) in fields.iter().zip(identifier) {
            let sql = self.select_condition_statement_sql(field, value, Some(Operator::Eq))?;
            let condition = ConditionParam::new(sql);
            query = query.condition(if value.is_null() {
                condition
            } else {
                condition.with_variable(value.clone())
            });
        }

        Ok(self.run_query(&query)?.into_iter().next())
    }

    /// Loads every entity matching `criteria`.
    ///
    /// # Errors
    ///
    /// Propagates normalization and backend errors.
    fn load_all(
        &self,
        criteria: &[Criterion],
        order_by: &[OrderBy],
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> CoreResult<Vec<Entity>> {
        let mut query = Query::new().limit(limit).offset(offset);
        for condition in self.normalize_criteria(criteria)? {
            query = query.condition(condition);
        }
        for clause in self.normalize_order_by(order_by)? {
            query = query.order(clause);
        }
        self.run_query(&query)
    }

    /// Loads every entity matching a criteria object.
    ///
    /// # Errors
    ///
    /// Propagates translation and backend errors.
    fn load_criteria(&self, criteria: &Criteria) -> CoreResult<Vec<Entity>> {
        let query = self.criteria_query(criteria)?;
        self.run_query(&query)
    }

    /// Runs a backend query and wraps the rows as entities.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    fn run_query(&self, query: &Query) -> CoreResult<Vec<Entity>> {
        let descriptor = self.descriptor();
        let rows = self
            .backend()
            .query(descriptor.storage_location(), query)?;
        Ok(rows
            .into_iter()
            .map(|row| Entity::new(descriptor.type_name(), row))
            .collect())
    }

    /// Counts the published entities matching `criteria`.
    ///
    /// # Errors
    ///
    /// Propagates normalization and backend errors.
    fn count(&self, criteria: &[Criterion]) -> CoreResult<u64> {
        let mut query = Query::new();
        for condition in self.normalize_criteria(criteria)? {
            query = query.condition(condition);
        }
        Ok(self
            .backend()
            .count(self.descriptor().storage_location(), &query)?)
    }

    /// Counts the entities matching a criteria object, ignoring paging.
    ///
    /// # Errors
    ///
    /// Propagates translation and backend errors.
    fn count_criteria(&self, criteria: &Criteria) -> CoreResult<u64> {
        let query = self.criteria_query(criteria)?;
        Ok(self
            .backend()
            .count(self.descriptor().storage_location(), &query)?)
    }

    /// Checks whether the entity's row exists, probing by the first
    /// identifier component and, if given, extra criteria.
    ///
    /// Returns `false` for an entity without identifier values.
    ///
    /// # Errors
    ///
    /// Propagates translation and backend errors.
    fn exists(&self, entity: &EntityRef, extra: Option<&Criteria>) -> CoreResult<bool> {
        let descriptor = self.descriptor();
        let identifier = descriptor.identifier_values(&entity.read());
        let Some((field, value)) = identifier.first() else {
            return Ok(false);
        };
        if value.is_null() {
            return Ok(false);
        }

        let table = descriptor.storage_location();
        match extra {
            None => Ok(self.backend().exists(table, field, value)?),
            Some(criteria) => {
                let id_condition = ConditionParam::new(format!("{} = ?", self.column_sql(field)?))
                    .with_variable(value.clone());
                let query = self
                    .criteria_query(criteria)?
                    .condition(id_condition)
                    .limit(None)
                    .offset(None)
                    .include_unpublished(true);
                Ok(self.backend().count(table, &query)? > 0)
            }
        }
    }

    /// Queues an entity for insertion. Queuing the same entity twice has no
    /// effect.
    fn add_insert(&mut self, entity: EntityRef) {
        let queue = &mut self.base_mut().queued_inserts;
        if !queue.contains(&entity) {
            queue.push(entity);
        }
    }

    /// Returns the queued inserts.
    fn inserts(&self) -> &[EntityRef] {
        &self.base().queued_inserts
    }

    /// Drops every queued insert without writing it.
    fn clear_inserts(&mut self) {
        self.base_mut().queued_inserts.clear();
    }

    /// Writes every queued insert and returns each entity with the
    /// identifier the backend reported.
    ///
    /// # Errors
    ///
    /// Stops at the first backend error; the queue is cleared regardless.
    fn execute_inserts(&mut self) -> CoreResult<Vec<(EntityRef, Value)>> {
        let queued = std::mem::take(&mut self.base_mut().queued_inserts);
        let descriptor = Arc::clone(self.descriptor());
        let key = descriptor.storage_key()?;
        let mut inserted = Vec::with_capacity(queued.len());

        for entity in queued {
            let record = entity.snapshot();
            let id = self.backend().save(
                descriptor.storage_location(),
                key,
                &record,
                self.save_options(&record),
            )?;
            inserted.push((entity, id));
        }
        Ok(inserted)
    }

    /// Writes a managed entity's current fields.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MissingIdentity`] if the entity has no
    /// identifier, or the backend error.
    fn update(&self, entity: &EntityRef) -> CoreResult<()> {
        let descriptor = self.descriptor();
        let key = descriptor.storage_key()?;
        let record = entity.snapshot();
        if record.get(key).map_or(true, Value::is_null) {
            return Err(CoreError::missing_identity(descriptor.type_name()));
        }
        self.backend().save(
            descriptor.storage_location(),
            key,
            &record,
            self.save_options(&record),
        )?;
        Ok(())
    }

    /// Deletes a managed entity's row.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MissingIdentity`] if the entity has no
    /// identifier, or the backend error.
    fn delete(&self, entity: &EntityRef) -> CoreResult<()> {
        let descriptor = self.descriptor();
        let key = descriptor.storage_key()?;
        let id = entity.get(key);
        if id.is_null() {
            return Err(CoreError::missing_identity(descriptor.type_name()));
        }
        self.backend()
            .delete(descriptor.storage_location(), key, &id)?;
        Ok(())
    }

    /// Reloads an entity's fields from the backend in place.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MissingIdentity`] if the entity has no
    /// identifier and [`CoreError::EntityNotFound`] if its row is gone.
    fn refresh(&self, entity: &EntityRef) -> CoreResult<()> {
        let descriptor = self.descriptor();
        let key = descriptor.storage_key()?;
        let id = entity.get(key);
        if id.is_null() {
            return Err(CoreError::missing_identity(descriptor.type_name()));
        }

        let row = self
            .backend()
            .fetch(descriptor.storage_location(), key, &id)?
            .ok_or_else(|| CoreError::EntityNotFound {
                type_name: descriptor.type_name().to_string(),
                identifier: id.to_string(),
            })?;
        entity.replace_fields(row);
        Ok(())
    }
}

/// Creates the persister matching a descriptor's kind.
#[derive(Clone)]
pub struct PersisterFactory {
    backend: Arc<dyn StorageBackend>,
}

impl PersisterFactory {
    /// Creates a factory whose persisters share `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Builds a persister for `descriptor`.
    #[must_use]
    pub fn create(&self, descriptor: Arc<EntityDescriptor>) -> Box<dyn EntityPersister> {
        let backend = Arc::clone(&self.backend);
        match descriptor.kind() {
            ElementKind::Structured => Box::new(ObjectPersister::new(descriptor, backend)),
            ElementKind::DocumentLike | ElementKind::AssetLike => {
                Box::new(ElementPersister::new(descriptor, backend))
            }
        }
    }
}

impl fmt::Debug for PersisterFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersisterFactory").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ormkit_storage::{record, InMemoryBackend};

    fn product_persister(backend: &Arc<InMemoryBackend>) -> Box<dyn EntityPersister> {
        let descriptor = Arc::new(
            EntityDescriptor::structured("product").with_fields(["name", "stock", "published"]),
        );
        let backend: Arc<dyn StorageBackend> = backend.clone();
        PersisterFactory::new(backend).create(descriptor)
    }

    fn seeded() -> Arc<InMemoryBackend> {
        let backend = Arc::new(InMemoryBackend::new());
        for (id, name, stock, published) in [
            (1, "lamp", 3, true),
            (2, "desk", 0, true),
            (3, "chair", 7, false),
        ] {
            backend.seed(
                "object_product",
                "o_id",
                Value::Integer(id),
                record! { "name" => name, "stock" => stock, "published" => published },
            );
        }
        backend
    }

    #[test]
    fn statement_sql_null_and_list_handling() {
        let persister = product_persister(&seeded());
        let sql = |value: Value, op| persister.select_condition_statement_sql("name", &value, op).unwrap();

        assert_eq!(sql(Value::Null, Some(Operator::Eq)), "name IS NULL");
        assert_eq!(sql(Value::Null, Some(Operator::Is)), "name IS NULL");
        assert_eq!(sql(Value::Null, Some(Operator::Neq)), "name IS NOT NULL");
        assert_eq!(sql(Value::from("x"), Some(Operator::Gte)), "name >= ?");
        assert_eq!(sql(Value::Null, None), "name IS NULL");
        assert_eq!(sql(Value::List(vec![Value::Integer(1)]), None), "name IN (?)");
        assert_eq!(
            sql(Value::List(vec![Value::Integer(1), Value::Null]), None),
            "(name IN (?) OR name IS NULL)"
        );
        assert_eq!(sql(Value::Integer(1), None), "name = ?");
    }

    #[test]
    fn select_condition_sql_composites() {
        let persister = product_persister(&seeded());
        let criteria = Criteria::new().where_expr(Expr::and(vec![
            Expr::eq("name", "lamp"),
            Expr::or(vec![Expr::gt("stock", 1), Expr::is_null("stock")]),
        ]));

        assert_eq!(
            persister.select_condition_sql(&criteria).unwrap(),
            "(name = ? AND (stock > ? OR stock IS NULL))"
        );
        assert_eq!(
            persister.expand_criteria_parameters(&criteria).unwrap(),
            vec![Value::from("lamp"), Value::Integer(1)]
        );
    }

    #[test]
    fn not_composite_is_unsupported() {
        let persister = product_persister(&seeded());
        let criteria = Criteria::new().where_expr(Expr::not(Expr::eq("name", "lamp")));
        assert!(matches!(
            persister.select_condition_sql(&criteria),
            Err(CoreError::Unsupported { .. })
        ));
    }

    #[test]
    fn empty_criteria_renders_nothing() {
        let persister = product_persister(&seeded());
        assert_eq!(persister.select_condition_sql(&Criteria::new()).unwrap(), "");
        assert!(persister
            .expand_criteria_parameters(&Criteria::new())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn load_all_hides_unpublished_and_orders() {
        let persister = product_persister(&seeded());
        let rows = persister
            .load_all(&[], &[OrderBy::from("stock DESC")], None, None)
            .unwrap();
        let names: Vec<_> = rows.iter().map(|e| e.get("name").to_string()).collect();
        assert_eq!(names, vec!["lamp", "desk"]);
    }

    #[test]
    fn load_criteria_applies_expression_and_paging() {
        let persister = product_persister(&seeded());
        let criteria = Criteria::new()
            .where_expr(Expr::in_list(
                "name",
                vec![Value::from("lamp"), Value::from("chair"), Value::from("desk")],
            ))
            .order_by(OrderClause::asc("name"))
            .hide_unpublished(false)
            .first_result(Some(1))
            .max_results(Some(1));

        let rows = persister.load_criteria(&criteria).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("name"), Value::from("desk"));
        assert_eq!(persister.count_criteria(&criteria).unwrap(), 3);
    }

    #[test]
    fn load_criteria_pattern_match() {
        let persister = product_persister(&seeded());
        let criteria = Criteria::new().where_expr(Expr::ends_with("name", "mp"));
        let rows = persister.load_criteria(&criteria).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("name"), Value::from("lamp"));
    }

    #[test]
    fn load_by_id_includes_unpublished() {
        let persister = product_persister(&seeded());
        let entity = persister.load_by_id(&[Value::Integer(3)]).unwrap().unwrap();
        assert_eq!(entity.get("name"), Value::from("chair"));
        assert!(persister.load_by_id(&[Value::Integer(99)]).unwrap().is_none());
        assert!(matches!(
            persister.load_by_id(&[]),
            Err(CoreError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let persister = product_persister(&seeded());
        assert!(matches!(
            persister.load_all(&[Criterion::field("colour", "red")], &[], None, None),
            Err(CoreError::UnrecognizedField { .. })
        ));
        assert!(matches!(
            persister.load_all(&[], &[OrderBy::key("colour")], None, None),
            Err(CoreError::UnrecognizedField { .. })
        ));
    }

    #[test]
    fn count_uses_raw_criteria() {
        let persister = product_persister(&seeded());
        assert_eq!(persister.count(&[]).unwrap(), 2);
        assert_eq!(
            persister
                .count(&[Criterion::condition("stock > ?").with_variable(0)])
                .unwrap(),
            1
        );
    }

    #[test]
    fn exists_probes_first_identifier() {
        let persister = product_persister(&seeded());
        let stored = EntityRef::create("product", record! { "o_id" => 2 });
        let missing = EntityRef::create("product", record! { "o_id" => 42 });
        let fresh = EntityRef::create("product", record! { "name" => "rug" });

        assert!(persister.exists(&stored, None).unwrap());
        assert!(!persister.exists(&missing, None).unwrap());
        assert!(!persister.exists(&fresh, None).unwrap());

        let in_stock = Criteria::new().where_expr(Expr::gt("stock", 0));
        assert!(!persister.exists(&stored, Some(&in_stock)).unwrap());
    }

    #[test]
    fn execute_inserts_clears_queue_on_failure() {
        let backend = Arc::new(InMemoryBackend::new().require_fields("object_product", &["name"]));
        let mut persister = product_persister(&backend);
        let ok = EntityRef::create("product", record! { "name" => "lamp" });
        let bad = EntityRef::create("product", record! { "stock" => 1 });

        persister.add_insert(ok.clone());
        persister.add_insert(ok.clone());
        persister.add_insert(bad);
        assert_eq!(persister.inserts().len(), 2);

        assert!(persister.execute_inserts().is_err());
        assert!(persister.inserts().is_empty());
    }

    #[test]
    fn unpublished_objects_skip_mandatory_check() {
        let backend = Arc::new(InMemoryBackend::new().require_fields("object_product", &["name"]));
        let mut persister = product_persister(&backend);
        let draft = EntityRef::create("product", record! { "published" => false });

        persister.add_insert(draft.clone());
        let inserted = persister.execute_inserts().unwrap();
        assert_eq!(inserted.len(), 1);
        assert!(inserted[0].0.same_as(&draft));
        assert_eq!(inserted[0].1, Value::Integer(1));
    }

    #[test]
    fn update_and_delete_require_identity() {
        let persister = product_persister(&seeded());
        let fresh = EntityRef::create("product", record! { "name" => "rug" });
        assert!(matches!(
            persister.update(&fresh),
            Err(CoreError::MissingIdentity { .. })
        ));
        assert!(matches!(
            persister.delete(&fresh),
            Err(CoreError::MissingIdentity { .. })
        ));
    }

    #[test]
    fn composite_identifiers_cannot_write() {
        let backend: Arc<dyn StorageBackend> = seeded();
        let descriptor = Arc::new(
            EntityDescriptor::structured("product").with_identifier_fields(["o_id", "variant"]),
        );
        let mut persister = PersisterFactory::new(backend).create(descriptor);
        let entity = EntityRef::create("product", record! { "o_id" => 1, "variant" => 2 });

        for result in [
            persister.update(&entity),
            persister.delete(&entity),
            persister.refresh(&entity),
        ] {
            assert!(matches!(result, Err(CoreError::InvalidDescriptor { .. })));
        }
        persister.add_insert(entity);
        assert!(matches!(
            persister.execute_inserts(),
            Err(CoreError::InvalidDescriptor { .. })
        ));
        assert!(persister.inserts().is_empty());
    }

    #[test]
    fn refresh_reloads_fields() {
        let backend = seeded();
        let persister = product_persister(&backend);
        let entity = EntityRef::create("product", record! { "o_id" => 1, "name" => "edited" });

        persister.refresh(&entity).unwrap();
        assert_eq!(entity.get("name"), Value::from("lamp"));

        let gone = EntityRef::create("product", record! { "o_id" => 77 });
        assert!(matches!(
            persister.refresh(&gone),
            Err(CoreError::EntityNotFound { .. })
        ));
    }

    #[test]
    fn factory_dispatches_on_kind() {
        let backend: Arc<dyn StorageBackend> = Arc::new(InMemoryBackend::new());
        let factory = PersisterFactory::new(backend);
        let page = factory.create(Arc::new(EntityDescriptor::document("page")));
        assert_eq!(page.column_sql("key").unwrap(), "`key`");

        let product = factory.create(Arc::new(EntityDescriptor::structured("product")));
        assert_eq!(product.column_sql("key").unwrap(), "key");
    }
}
