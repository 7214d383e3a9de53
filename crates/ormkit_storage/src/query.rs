//! Query vocabulary shared by persisters and backends.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a condition joins the conditions before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Concatenator {
    /// `AND`
    #[default]
    And,
    /// `OR`
    Or,
}

impl Concatenator {
    /// Returns the SQL keyword.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Concatenator::And => "AND",
            Concatenator::Or => "OR",
        }
    }
}

impl fmt::Display for Concatenator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Direction {
    /// Ascending (`ASC`).
    #[default]
    Ascending,
    /// Descending (`DESC`).
    Descending,
}

impl Direction {
    /// Returns the SQL keyword.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Direction::Ascending => "ASC",
            Direction::Descending => "DESC",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("asc") {
            Ok(Direction::Ascending)
        } else if s.eq_ignore_ascii_case("desc") {
            Ok(Direction::Descending)
        } else {
            Err(format!("unknown sort direction '{s}'"))
        }
    }
}

/// One normalized ordering instruction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderClause {
    /// Field to order by.
    pub key: String,
    /// Sort direction.
    pub direction: Direction,
}

impl OrderClause {
    /// Creates an ordering clause.
    pub fn new(key: impl Into<String>, direction: Direction) -> Self {
        Self {
            key: key.into(),
            direction,
        }
    }

    /// Creates an ascending ordering clause.
    pub fn asc(key: impl Into<String>) -> Self {
        Self::new(key, Direction::Ascending)
    }

    /// Creates a descending ordering clause.
    pub fn desc(key: impl Into<String>) -> Self {
        Self::new(key, Direction::Descending)
    }
}

/// A normalized condition: SQL fragment, optional bound variable, and the
/// keyword joining it to the previous condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionParam {
    /// Condition fragment with `?` placeholders.
    pub condition: String,
    /// Value bound to the placeholders.
    pub variable: Option<Value>,
    /// Joins this condition to the ones before it.
    pub concatenator: Concatenator,
}

impl ConditionParam {
    /// Creates an `AND` condition without a bound variable.
    pub fn new(condition: impl Into<String>) -> Self {
        Self {
            condition: condition.into(),
            variable: None,
            concatenator: Concatenator::And,
        }
    }

    /// Binds a variable.
    #[must_use]
    pub fn with_variable(mut self, variable: impl Into<Value>) -> Self {
        self.variable = Some(variable.into());
        self
    }

    /// Sets the concatenator.
    #[must_use]
    pub const fn with_concatenator(mut self, concatenator: Concatenator) -> Self {
        self.concatenator = concatenator;
        self
    }

    /// Number of `?` placeholders in the fragment, ignoring question marks
    /// inside quoted text.
    #[must_use]
    pub fn placeholder_count(&self) -> usize {
        crate::condition::placeholder_count(&self.condition)
    }

    /// Values for the fragment's placeholders, in order.
    ///
    /// A single placeholder takes the whole variable (so a list feeds
    /// `IN (?)`). Several placeholders take the items of a list variable
    /// positionally.
    #[must_use]
    pub fn bindings(&self) -> Vec<Value> {
        match (self.placeholder_count(), &self.variable) {
            (0, _) => Vec::new(),
            (1, Some(v)) => vec![v.clone()],
            (_, Some(Value::List(items))) => items.clone(),
            (_, Some(v)) => vec![v.clone()],
            (_, None) => Vec::new(),
        }
    }
}

/// A backend query: conditions, ordering and paging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Conditions, joined by their concatenators.
    pub conditions: Vec<ConditionParam>,
    /// Ordering clauses, most significant first.
    pub order_by: Vec<OrderClause>,
    /// Maximum number of rows.
    pub limit: Option<usize>,
    /// Number of rows to skip.
    pub offset: Option<usize>,
    /// Whether unpublished rows are included.
    pub include_unpublished: bool,
}

impl Query {
    /// Creates an empty query matching every published row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a condition.
    #[must_use]
    pub fn condition(mut self, condition: ConditionParam) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Adds an ordering clause.
    #[must_use]
    pub fn order(mut self, clause: OrderClause) -> Self {
        self.order_by.push(clause);
        self
    }

    /// Sets the row limit.
    #[must_use]
    pub const fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Sets the row offset.
    #[must_use]
    pub const fn offset(mut self, offset: Option<usize>) -> Self {
        self.offset = offset;
        self
    }

    /// Sets whether unpublished rows are included.
    #[must_use]
    pub const fn include_unpublished(mut self, value: bool) -> Self {
        self.include_unpublished = value;
        self
    }

    /// Renders all conditions into one fragment plus its bound values.
    ///
    /// Each fragment is parenthesized so the concatenators combine whole
    /// fragments; `AND` still binds tighter than `OR` across them, as in SQL.
    /// Returns `None` when there are no conditions.
    #[must_use]
    pub fn combined_condition(&self) -> Option<(String, Vec<Value>)> {
        if self.conditions.is_empty() {
            return None;
        }

        let mut sql = String::new();
        let mut params = Vec::new();
        for (i, param) in self.conditions.iter().enumerate() {
            if i > 0 {
                sql.push(' ');
                sql.push_str(param.concatenator.as_str());
                sql.push(' ');
            }
            sql.push('(');
            sql.push_str(&param.condition);
            sql.push(')');
            params.extend(param.bindings());
        }
        Some((sql, params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_parses_case_insensitively() {
        assert_eq!("desc".parse::<Direction>(), Ok(Direction::Descending));
        assert_eq!("ASC".parse::<Direction>(), Ok(Direction::Ascending));
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn single_placeholder_binds_whole_list() {
        let param = ConditionParam::new("id IN (?)")
            .with_variable(Value::List(vec![Value::Integer(1), Value::Integer(2)]));
        assert_eq!(param.bindings().len(), 1);
    }

    #[test]
    fn multiple_placeholders_spread_list() {
        let param = ConditionParam::new("age > ? AND age < ?")
            .with_variable(Value::List(vec![Value::Integer(1), Value::Integer(9)]));
        assert_eq!(
            param.bindings(),
            vec![Value::Integer(1), Value::Integer(9)]
        );
    }

    #[test]
    fn quoted_question_mark_does_not_split_list() {
        let ids = Value::List(vec![Value::Integer(1), Value::Integer(2)]);
        let param = ConditionParam::new("name = 'a?' AND id IN (?)").with_variable(ids.clone());
        assert_eq!(param.placeholder_count(), 1);
        assert_eq!(param.bindings(), vec![ids]);
    }

    #[test]
    fn fragment_without_placeholder_binds_nothing() {
        let param = ConditionParam::new("published = 1").with_variable(5);
        assert!(param.bindings().is_empty());
    }

    #[test]
    fn combined_condition_joins_with_concatenators() {
        let query = Query::new()
            .condition(ConditionParam::new("a = ?").with_variable(1))
            .condition(
                ConditionParam::new("b = ?")
                    .with_variable(2)
                    .with_concatenator(Concatenator::Or),
            );

        let (sql, params) = query.combined_condition().unwrap();
        assert_eq!(sql, "(a = ?) OR (b = ?)");
        assert_eq!(params, vec![Value::Integer(1), Value::Integer(2)]);
    }

    #[test]
    fn empty_query_has_no_condition() {
        assert!(Query::new().combined_condition().is_none());
    }
}
