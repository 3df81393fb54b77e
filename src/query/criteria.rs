use std::fmt;

use serde::{Deserialize, Serialize};

use super::ast::{BinaryOp, Expr};
use crate::core::{KEY_COLUMN, RecordKey, Value};

/// Either a typed expression or engine-native SQL text.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlFragment {
    Typed(Expr),
    Raw(String),
}

impl fmt::Display for SqlFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlFragment::Typed(expr) => write!(f, "{}", expr),
            SqlFragment::Raw(sql) => write!(f, "({})", sql),
        }
    }
}

/// Boolean operator used when a condition is appended to existing criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JoinOperator {
    #[default]
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Fragment(SqlFragment),
    /// Matches rows whose surrogate key is in the set.
    Keys(Vec<RecordKey>),
    All(Vec<Condition>),
    Any(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    pub fn raw(sql: impl Into<String>) -> Self {
        Self::Fragment(SqlFragment::Raw(sql.into()))
    }

    pub fn expr(expr: Expr) -> Self {
        Self::Fragment(SqlFragment::Typed(expr))
    }

    /// `column <op> value`
    pub fn compare(column: &str, op: BinaryOp, value: impl Into<Value>) -> Self {
        Self::expr(Expr::binary(Expr::column(column), op, Expr::Literal(value.into())))
    }

    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    fn join(self, other: Condition, op: JoinOperator) -> Self {
        match (op, self) {
            (JoinOperator::And, Condition::All(mut parts)) => {
                parts.push(other);
                Condition::All(parts)
            }
            (JoinOperator::Or, Condition::Any(mut parts)) => {
                parts.push(other);
                Condition::Any(parts)
            }
            (JoinOperator::And, current) => Condition::All(vec![current, other]),
            (JoinOperator::Or, current) => Condition::Any(vec![current, other]),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn joined(parts: &[Condition], sep: &str) -> String {
            let parts: Vec<String> = parts.iter().map(|p| format!("({})", p)).collect();
            parts.join(sep)
        }

        match self {
            Condition::Fragment(fragment) => write!(f, "{}", fragment),
            Condition::Keys(keys) if keys.is_empty() => write!(f, "FALSE"),
            Condition::Keys(keys) => {
                let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
                write!(f, "{} IN ({})", KEY_COLUMN, keys.join(", "))
            }
            Condition::All(parts) => write!(f, "{}", joined(parts, " AND ")),
            Condition::Any(parts) => write!(f, "{}", joined(parts, " OR ")),
            Condition::Not(inner) => write!(f, "NOT ({})", inner),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub fragment: SqlFragment,
    pub descending: bool,
}

/// Query criteria: an optional filter plus ordering. Conditions are appended
/// with AND/OR against whatever the criteria already holds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    condition: Option<Condition>,
    order: Vec<OrderBy>,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_condition(condition: Condition) -> Self {
        Self {
            condition: Some(condition),
            order: Vec::new(),
        }
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        Self::with_condition(Condition::raw(sql))
    }

    pub fn keys(keys: Vec<RecordKey>) -> Self {
        Self::with_condition(Condition::Keys(keys))
    }

    pub fn add_condition(&mut self, condition: Condition, op: JoinOperator) -> &mut Self {
        self.condition = Some(match self.condition.take() {
            Some(current) => current.join(condition, op),
            None => condition,
        });
        self
    }

    pub fn add_raw(&mut self, sql: impl Into<String>, op: JoinOperator) -> &mut Self {
        self.add_condition(Condition::raw(sql), op)
    }

    pub fn add_compare(
        &mut self,
        column: &str,
        cmp: BinaryOp,
        value: impl Into<Value>,
        op: JoinOperator,
    ) -> &mut Self {
        self.add_condition(Condition::compare(column, cmp, value), op)
    }

    /// Merges another criteria's filter and appends its ordering.
    pub fn merge(&mut self, other: &Criteria, op: JoinOperator) -> &mut Self {
        if let Some(condition) = &other.condition {
            self.add_condition(condition.clone(), op);
        }
        self.order.extend(other.order.iter().cloned());
        self
    }

    pub fn order_by(&mut self, fragment: SqlFragment, descending: bool) -> &mut Self {
        self.order.push(OrderBy {
            fragment,
            descending,
        });
        self
    }

    pub fn condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }

    pub fn orders(&self) -> &[OrderBy] {
        &self.order
    }

    pub fn is_empty(&self) -> bool {
        self.condition.is_none() && self.order.is_empty()
    }

    /// WHERE clause text, `None` when unfiltered.
    pub fn where_sql(&self) -> Option<String> {
        self.condition.as_ref().map(|c| c.to_string())
    }
}

impl fmt::Display for Criteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.condition {
            Some(condition) => write!(f, "WHERE {}", condition)?,
            None => write!(f, "WHERE TRUE")?,
        }
        if !self.order.is_empty() {
            let order: Vec<String> = self
                .order
                .iter()
                .map(|o| format!("{}{}", o.fragment, if o.descending { " DESC" } else { "" }))
                .collect();
            write!(f, " ORDER BY {}", order.join(", "))?;
        }
        Ok(())
    }
}
