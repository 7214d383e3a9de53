//! Boolean filter expressions and their SQL translation.

use super::EntityPersister;
use crate::error::{CoreError, CoreResult};
use ormkit_storage::Value;
use std::fmt;

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `=`
    Eq,
    /// `!=`
    Neq,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `IS` (null test; equality for non-null values)
    Is,
    /// `IN`
    In,
    /// `NOT IN`
    NotIn,
    /// Substring match.
    Contains,
    /// Prefix match.
    StartsWith,
    /// Suffix match.
    EndsWith,
}

/// SQL template of each operator; `?` is the placeholder position.
pub const COMPARISON_MAP: [(Operator, &str); 12] = [
    (Operator::Eq, "= ?"),
    (Operator::Neq, "!= ?"),
    (Operator::Gt, "> ?"),
    (Operator::Gte, ">= ?"),
    (Operator::Lt, "< ?"),
    (Operator::Lte, "<= ?"),
    (Operator::Is, "= ?"),
    (Operator::In, "IN (?)"),
    (Operator::NotIn, "NOT IN (?)"),
    (Operator::Contains, "LIKE ?"),
    (Operator::StartsWith, "LIKE ?"),
    (Operator::EndsWith, "LIKE ?"),
];

impl Operator {
    /// Returns the operator's SQL template.
    #[must_use]
    pub fn template(self) -> &'static str {
        COMPARISON_MAP
            .iter()
            .find(|(op, _)| *op == self)
            .map_or("= ?", |(_, sql)| *sql)
    }
}

/// How a composite expression combines its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompositeKind {
    /// All children hold.
    And,
    /// Any child holds.
    Or,
    /// Negation. Representable, but not translatable to SQL.
    Not,
}

impl fmt::Display for CompositeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompositeKind::And => "AND",
            CompositeKind::Or => "OR",
            CompositeKind::Not => "NOT",
        };
        f.write_str(name)
    }
}

/// A filter expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `field <operator> value`
    Comparison {
        /// Field name.
        field: String,
        /// Operator.
        operator: Operator,
        /// Compared value.
        value: Value,
    },
    /// Combination of child expressions.
    Composite {
        /// Combination kind.
        kind: CompositeKind,
        /// Child expressions.
        children: Vec<Expr>,
    },
}

impl Expr {
    /// Builds a comparison.
    pub fn comparison(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Expr::Comparison {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    /// `field = value`
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::comparison(field, Operator::Eq, value)
    }

    /// `field != value`
    pub fn neq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::comparison(field, Operator::Neq, value)
    }

    /// `field < value`
    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::comparison(field, Operator::Lt, value)
    }

    /// `field <= value`
    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::comparison(field, Operator::Lte, value)
    }

    /// `field > value`
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::comparison(field, Operator::Gt, value)
    }

    /// `field >= value`
    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::comparison(field, Operator::Gte, value)
    }

    /// `field IS NULL`
    pub fn is_null(field: impl Into<String>) -> Self {
        Self::comparison(field, Operator::Is, Value::Null)
    }

    /// `field IN (values)`
    pub fn in_list(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::comparison(field, Operator::In, Value::List(values))
    }

    /// `field NOT IN (values)`
    pub fn not_in(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::comparison(field, Operator::NotIn, Value::List(values))
    }

    /// `field` contains `value`.
    pub fn contains(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::comparison(field, Operator::Contains, value.into())
    }

    /// `field` starts with `value`.
    pub fn starts_with(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::comparison(field, Operator::StartsWith, value.into())
    }

    /// `field` ends with `value`.
    pub fn ends_with(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::comparison(field, Operator::EndsWith, value.into())
    }

    /// Conjunction of `children`.
    #[must_use]
    pub fn and(children: Vec<Expr>) -> Self {
        Expr::Composite {
            kind: CompositeKind::And,
            children,
        }
    }

    /// Disjunction of `children`.
    #[must_use]
    pub fn or(children: Vec<Expr>) -> Self {
        Expr::Composite {
            kind: CompositeKind::Or,
            children,
        }
    }

    /// Negation of `child`.
    #[must_use]
    pub fn not(child: Expr) -> Self {
        Expr::Composite {
            kind: CompositeKind::Not,
            children: vec![child],
        }
    }
}

/// Walks an [`Expr`] tree.
pub trait ExpressionVisitor {
    /// Result of visiting one node.
    type Output;

    /// Visits a comparison node.
    ///
    /// # Errors
    ///
    /// Implementation specific.
    fn walk_comparison(
        &mut self,
        field: &str,
        operator: Operator,
        value: &Value,
    ) -> CoreResult<Self::Output>;

    /// Visits a composite node.
    ///
    /// # Errors
    ///
    /// Implementation specific.
    fn walk_composite(&mut self, kind: CompositeKind, children: &[Expr])
        -> CoreResult<Self::Output>;

    /// Dispatches on the node type.
    ///
    /// # Errors
    ///
    /// Propagates the errors of the walk methods.
    fn dispatch(&mut self, expr: &Expr) -> CoreResult<Self::Output> {
        match expr {
            Expr::Comparison {
                field,
                operator,
                value,
            } => self.walk_comparison(field, *operator, value),
            Expr::Composite { kind, children } => self.walk_composite(*kind, children),
        }
    }
}

/// Renders an expression into a condition fragment with `?` placeholders.
///
/// Column rendering and field validation are delegated to the persister.
pub struct SqlExpressionVisitor<'a, P: EntityPersister + ?Sized> {
    persister: &'a P,
}

impl<'a, P: EntityPersister + ?Sized> SqlExpressionVisitor<'a, P> {
    /// Creates a visitor rendering columns through `persister`.
    pub fn new(persister: &'a P) -> Self {
        Self { persister }
    }
}

impl<P: EntityPersister + ?Sized> ExpressionVisitor for SqlExpressionVisitor<'_, P> {
    type Output = String;

    fn walk_comparison(
        &mut self,
        field: &str,
        operator: Operator,
        value: &Value,
    ) -> CoreResult<String> {
        self.persister
            .select_condition_statement_sql(field, value, Some(operator))
    }

    fn walk_composite(&mut self, kind: CompositeKind, children: &[Expr]) -> CoreResult<String> {
        let keyword = match kind {
            CompositeKind::And => " AND ",
            CompositeKind::Or => " OR ",
            CompositeKind::Not => {
                return Err(CoreError::unsupported(format!("{kind} composite expression")))
            }
        };

        let parts = children
            .iter()
            .map(|child| self.dispatch(child))
            .collect::<CoreResult<Vec<_>>>()?;
        Ok(format!("({})", parts.join(keyword)))
    }
}

/// Collects the bound parameters of an expression, in placeholder order.
#[derive(Debug, Default)]
pub struct SqlValueVisitor {
    params: Vec<Value>,
}

impl SqlValueVisitor {
    /// Creates an empty visitor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the collected parameters.
    #[must_use]
    pub fn into_params(self) -> Vec<Value> {
        self.params
    }
}

fn wrap_pattern(operator: Operator, value: &Value) -> Value {
    let text = value.to_string();
    match operator {
        Operator::Contains => Value::Text(format!("%{text}%")),
        Operator::StartsWith => Value::Text(format!("{text}%")),
        Operator::EndsWith => Value::Text(format!("%{text}")),
        _ => value.clone(),
    }
}

impl ExpressionVisitor for SqlValueVisitor {
    type Output = ();

    fn walk_comparison(&mut self, _field: &str, operator: Operator, value: &Value) -> CoreResult<()> {
        // Null equality renders as IS [NOT] NULL and binds nothing.
        if value.is_null() && matches!(operator, Operator::Eq | Operator::Is | Operator::Neq) {
            return Ok(());
        }
        self.params.push(wrap_pattern(operator, value));
        Ok(())
    }

    fn walk_composite(&mut self, _kind: CompositeKind, children: &[Expr]) -> CoreResult<()> {
        for child in children {
            self.dispatch(child)?;
        }
        Ok(())
    }
}
