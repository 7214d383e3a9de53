//! Criteria and ordering inputs for persister queries.

use super::expression::{CompositeKind, Expr};
use crate::error::{CoreError, CoreResult};
use ormkit_storage::{Concatenator, Direction, OrderClause, Value};

/// One loosely-shaped filter input, normalized by the persister into a
/// [`ormkit_storage::ConditionParam`].
#[derive(Debug, Clone, PartialEq)]
pub enum Criterion {
    /// A raw `field => value` pair.
    Field {
        /// Field name.
        field: String,
        /// Required value. `Null` and lists get `IS NULL` / `IN` handling.
        value: Value,
    },
    /// A prebuilt condition fragment.
    Condition {
        /// Fragment, usually with `?` placeholders.
        condition: String,
        /// Value bound to the placeholders.
        variable: Option<Value>,
        /// Joins this condition to the ones before it.
        concatenator: Concatenator,
    },
}

impl Criterion {
    /// Creates a `field => value` criterion.
    pub fn field(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Criterion::Field {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Creates an `AND` condition criterion without a variable.
    pub fn condition(condition: impl Into<String>) -> Self {
        Criterion::Condition {
            condition: condition.into(),
            variable: None,
            concatenator: Concatenator::And,
        }
    }

    /// Binds a variable. Has no effect on field criteria.
    #[must_use]
    pub fn with_variable(mut self, value: impl Into<Value>) -> Self {
        if let Criterion::Condition { variable, .. } = &mut self {
            *variable = Some(value.into());
        }
        self
    }

    /// Joins the condition with `OR`. Has no effect on field criteria.
    #[must_use]
    pub fn or(mut self) -> Self {
        if let Criterion::Condition { concatenator, .. } = &mut self {
            *concatenator = Concatenator::Or;
        }
        self
    }
}

/// One loosely-shaped ordering input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderBy {
    /// `"field"` or `"field DIRECTION"`.
    Clause(String),
    /// A key with an optional direction (ascending when absent).
    Keyed {
        /// Field to order by.
        key: String,
        /// Sort direction.
        direction: Option<Direction>,
    },
}

impl OrderBy {
    /// Orders by `key` ascending.
    pub fn key(key: impl Into<String>) -> Self {
        OrderBy::Keyed {
            key: key.into(),
            direction: None,
        }
    }

    /// Orders by `key` in `direction`.
    pub fn keyed(key: impl Into<String>, direction: Direction) -> Self {
        OrderBy::Keyed {
            key: key.into(),
            direction: Some(direction),
        }
    }

    /// Normalizes into a key and direction.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] for an empty key, an unknown
    /// direction or a clause with trailing words.
    pub fn normalize(&self) -> CoreResult<OrderClause> {
        let clause = match self {
            OrderBy::Keyed { key, direction } => {
                OrderClause::new(key.clone(), direction.unwrap_or_default())
            }
            OrderBy::Clause(text) => {
                let mut parts = text.split_whitespace();
                let key = parts.next().unwrap_or_default();
                let direction = match parts.next() {
                    Some(word) => word.parse().map_err(CoreError::invalid_argument)?,
                    None => Direction::Ascending,
                };
                if parts.next().is_some() {
                    return Err(CoreError::invalid_argument(format!(
                        "malformed order clause '{text}'"
                    )));
                }
                OrderClause::new(key, direction)
            }
        };

        if clause.key.is_empty() {
            return Err(CoreError::invalid_argument("order key must not be empty"));
        }
        Ok(clause)
    }
}

impl From<&str> for OrderBy {
    fn from(clause: &str) -> Self {
        OrderBy::Clause(clause.to_string())
    }
}

impl From<String> for OrderBy {
    fn from(clause: String) -> Self {
        OrderBy::Clause(clause)
    }
}

/// A structured query: filter expression, orderings and paging.
///
/// Unpublished rows are hidden unless [`Criteria::hide_unpublished`] is
/// switched off.
///
/// # Example
///
/// ```rust
/// use ormkit_core::{Criteria, Expr};
/// use ormkit_storage::OrderClause;
///
/// let criteria = Criteria::new()
///     .where_expr(Expr::gt("stock", 0))
///     .and_where(Expr::contains("name", "lamp"))
///     .order_by(OrderClause::desc("stock"))
///     .max_results(Some(10));
/// assert!(criteria.is_hide_unpublished());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Criteria {
    where_expr: Option<Expr>,
    orderings: Vec<OrderClause>,
    first_result: Option<usize>,
    max_results: Option<usize>,
    hide_unpublished: bool,
}

impl Default for Criteria {
    fn default() -> Self {
        Self {
            where_expr: None,
            orderings: Vec::new(),
            first_result: None,
            max_results: None,
            hide_unpublished: true,
        }
    }
}

impl Criteria {
    /// Creates an empty criteria object.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the filter expression.
    #[must_use]
    pub fn where_expr(mut self, expr: Expr) -> Self {
        self.where_expr = Some(expr);
        self
    }

    /// Combines the filter with `expr` using `AND`.
    #[must_use]
    pub fn and_where(self, expr: Expr) -> Self {
        self.combine(CompositeKind::And, expr)
    }

    /// Combines the filter with `expr` using `OR`.
    #[must_use]
    pub fn or_where(self, expr: Expr) -> Self {
        self.combine(CompositeKind::Or, expr)
    }

    fn combine(mut self, kind: CompositeKind, expr: Expr) -> Self {
        self.where_expr = Some(match self.where_expr.take() {
            None => expr,
            Some(Expr::Composite {
                kind: existing,
                mut children,
            }) if existing == kind => {
                children.push(expr);
                Expr::Composite { kind, children }
            }
            Some(current) => Expr::Composite {
                kind,
                children: vec![current, expr],
            },
        });
        self
    }

    /// Appends an ordering.
    #[must_use]
    pub fn order_by(mut self, clause: OrderClause) -> Self {
        self.orderings.push(clause);
        self
    }

    /// Sets the number of leading rows to skip.
    #[must_use]
    pub const fn first_result(mut self, first: Option<usize>) -> Self {
        self.first_result = first;
        self
    }

    /// Sets the maximum number of rows.
    #[must_use]
    pub const fn max_results(mut self, max: Option<usize>) -> Self {
        self.max_results = max;
        self
    }

    /// Sets whether unpublished rows are hidden.
    #[must_use]
    pub const fn hide_unpublished(mut self, hide: bool) -> Self {
        self.hide_unpublished = hide;
        self
    }

    /// Returns the filter expression.
    #[must_use]
    pub fn get_where_expr(&self) -> Option<&Expr> {
        self.where_expr.as_ref()
    }

    /// Returns the orderings.
    #[must_use]
    pub fn orderings(&self) -> &[OrderClause] {
        &self.orderings
    }

    /// Returns the number of leading rows skipped.
    #[must_use]
    pub const fn get_first_result(&self) -> Option<usize> {
        self.first_result
    }

    /// Returns the maximum number of rows.
    #[must_use]
    pub const fn get_max_results(&self) -> Option<usize> {
        self.max_results
    }

    /// Returns whether unpublished rows are hidden.
    #[must_use]
    pub const fn is_hide_unpublished(&self) -> bool {
        self.hide_unpublished
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_clause_with_direction() {
        let clause = OrderBy::from("createdAt DESC").normalize().unwrap();
        assert_eq!(clause, OrderClause::desc("createdAt"));
    }

    #[test]
    fn keyed_order_defaults_to_ascending() {
        assert_eq!(OrderBy::key("id").normalize().unwrap(), OrderClause::asc("id"));
        assert_eq!(OrderBy::from("id").normalize().unwrap(), OrderClause::asc("id"));
    }

    #[test]
    fn malformed_orders_are_rejected() {
        for bad in ["", "id sideways", "id ASC extra"] {
            assert!(matches!(
                OrderBy::from(bad).normalize(),
                Err(CoreError::InvalidArgument { .. })
            ));
        }
        assert!(OrderBy::key("").normalize().is_err());
    }

    #[test]
    fn criterion_builders() {
        let c = Criterion::condition("age > ?").with_variable(5).or();
        assert_eq!(
            c,
            Criterion::Condition {
                condition: "age > ?".into(),
                variable: Some(Value::Integer(5)),
                concatenator: Concatenator::Or,
            }
        );
    }

    #[test]
    fn and_where_flattens_same_kind() {
        let criteria = Criteria::new()
            .where_expr(Expr::eq("a", 1))
            .and_where(Expr::eq("b", 2))
            .and_where(Expr::eq("c", 3));

        match criteria.get_where_expr() {
            Some(Expr::Composite { kind, children }) => {
                assert_eq!(*kind, CompositeKind::And);
                assert_eq!(children.len(), 3);
            }
            other => panic!("unexpected expression {other:?}"),
        }
    }

    #[test]
    fn or_where_wraps_existing() {
        let criteria = Criteria::new()
            .and_where(Expr::eq("a", 1))
            .and_where(Expr::eq("b", 2))
            .or_where(Expr::eq("c", 3));

        match criteria.get_where_expr() {
            Some(Expr::Composite { kind, children }) => {
                assert_eq!(*kind, CompositeKind::Or);
                assert_eq!(children.len(), 2);
            }
            other => panic!("unexpected expression {other:?}"),
        }
    }

    #[test]
    fn unpublished_hidden_by_default() {
        assert!(Criteria::new().is_hide_unpublished());
        assert!(!Criteria::new().hide_unpublished(false).is_hide_unpublished());
    }
}
