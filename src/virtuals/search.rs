use std::sync::Arc;

use super::model::VirtualModel;
use crate::config::CacheStrategy;
use crate::core::{DbError, Result, Value};
use crate::query::pattern::escape_like;
use crate::query::{BinaryOp, Condition, Criteria, Expr, JoinOperator, SqlDialect, SqlFragment};

/// Leading operators recognised in a search value, longest first.
const OPERATORS: [&str; 6] = ["<>", "<=", ">=", "<", ">", "="];

/// Query scope that filters and orders by virtual attributes.
///
/// Packed attributes are matched through the codec's extraction expression,
/// shadowed ones through their shadow column. Each call narrows (or widens,
/// with [`JoinOperator::Or`]) the scope held by this instance.
#[derive(Debug, Clone)]
pub struct VirtualSearch {
    model: Arc<VirtualModel>,
    dialect: SqlDialect,
    scope: Criteria,
}

impl VirtualSearch {
    pub fn new(model: Arc<VirtualModel>, dialect: SqlDialect) -> Self {
        Self::with_scope(model, dialect, Criteria::new())
    }

    pub fn with_scope(model: Arc<VirtualModel>, dialect: SqlDialect, scope: Criteria) -> Self {
        Self {
            model,
            dialect,
            scope,
        }
    }

    pub fn criteria(&self) -> &Criteria {
        &self.scope
    }

    pub fn into_criteria(self) -> Criteria {
        self.scope
    }

    /// Appends a predicate on a virtual attribute (or its shadow alias).
    ///
    /// `value` may start with `<>`, `<=`, `>=`, `<`, `>` or `=`. Without an
    /// operator, `partial` turns the match into `LIKE '%value%'`; with `<>` it
    /// becomes `NOT LIKE`. An empty value adds nothing.
    pub fn compare(
        &mut self,
        name: &str,
        value: &str,
        partial: bool,
        join: JoinOperator,
    ) -> Result<&mut Self> {
        let (operator, operand) = split_operator(value);
        if operand.is_empty() {
            return Ok(self);
        }

        let target = self.target(name)?;
        let condition = match (operator, partial) {
            (None, true) | (Some(BinaryOp::NotEq), true) => {
                self.like(&target, operand, operator.is_some())
            }
            (op, _) => {
                let op = op.unwrap_or(BinaryOp::Eq);
                match self.model.strategy() {
                    CacheStrategy::Packed => Condition::raw(format!(
                        "{} {} {}",
                        target,
                        op,
                        self.dialect.quote_text(operand)
                    )),
                    CacheStrategy::Shadowed => {
                        Condition::compare(&target, op, infer_literal(operand))
                    }
                }
            }
        };

        self.scope.add_condition(condition, join);
        Ok(self)
    }

    pub fn order_by(&mut self, name: &str, descending: bool) -> Result<&mut Self> {
        let target = self.target(name)?;
        let fragment = match self.model.strategy() {
            CacheStrategy::Packed => SqlFragment::Raw(target),
            CacheStrategy::Shadowed => SqlFragment::Typed(Expr::column(target)),
        };
        self.scope.order_by(fragment, descending);
        Ok(self)
    }

    /// SQL expression (Packed) or column name (Shadowed) holding `name`.
    fn target(&self, name: &str) -> Result<String> {
        let attr = self.model.resolve(name).ok_or_else(|| {
            DbError::InvalidArgument(format!(
                "'{}' is not a virtual attribute of '{}'",
                name,
                self.model.table()
            ))
        })?;

        match self.model.strategy() {
            CacheStrategy::Packed => self.model.codec().query_expression(&attr.name, &self.dialect),
            CacheStrategy::Shadowed => Ok(attr.persisted_name.clone()),
        }
    }

    fn like(&self, target: &str, operand: &str, negated: bool) -> Condition {
        let pattern = self.dialect.quote_text(&format!("%{}%", escape_like(operand)));
        let escape = match self.dialect {
            SqlDialect::Sqlite => " ESCAPE '\\'",
            _ => "",
        };
        Condition::raw(format!(
            "{} {}LIKE {}{}",
            target,
            if negated { "NOT " } else { "" },
            pattern,
            escape
        ))
    }
}

fn split_operator(value: &str) -> (Option<BinaryOp>, &str) {
    let value = value.trim();
    for token in OPERATORS {
        if let Some(rest) = value.strip_prefix(token) {
            return (BinaryOp::parse_comparison(token), rest.trim_start());
        }
    }
    (None, value)
}

fn infer_literal(operand: &str) -> Value {
    if let Ok(i) = operand.parse::<i64>() {
        Value::Integer(i)
    } else if let Ok(f) = operand.parse::<f64>() {
        Value::Float(f)
    } else {
        Value::from(operand)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VirtualConfig;

    fn model(config: VirtualConfig) -> Arc<VirtualModel> {
        VirtualModel::builder("people", config)
            .attribute_with("ageBracket", |_| Value::Null)
            .attribute_with("score", |_| Value::Null)
            .build()
            .unwrap()
    }

    #[test]
    fn test_split_operator() {
        assert_eq!(split_operator(">= 18"), (Some(BinaryOp::GtEq), "18"));
        assert_eq!(split_operator("<>adult"), (Some(BinaryOp::NotEq), "adult"));
        assert_eq!(split_operator("<5"), (Some(BinaryOp::Lt), "5"));
        assert_eq!(split_operator(" adult "), (None, "adult"));
        assert_eq!(split_operator(">"), (Some(BinaryOp::Gt), ""));
    }

    #[test]
    fn test_packed_exact_compare() {
        let mut search = VirtualSearch::new(model(VirtualConfig::packed()), SqlDialect::MySql);
        search
            .compare("ageBracket", "adult", false, JoinOperator::And)
            .unwrap();
        assert_eq!(
            search.criteria().where_sql().unwrap(),
            "(SUBSTRING_INDEX(SUBSTRING_INDEX(virtual_cache, ',ageBracket:', -1), ',', 1) = 'adult')"
        );
    }

    #[test]
    fn test_packed_partial_compare_sqlite_escapes() {
        let mut search = VirtualSearch::new(model(VirtualConfig::packed()), SqlDialect::Sqlite);
        search.compare("score", "5%", true, JoinOperator::And).unwrap();
        let sql = search.criteria().where_sql().unwrap();
        assert!(sql.contains(r"LIKE '%5\%%' ESCAPE '\'"), "{}", sql);
    }

    #[test]
    fn test_mysql_literals_double_backslashes() {
        let mut search = VirtualSearch::new(model(VirtualConfig::packed()), SqlDialect::MySql);
        search
            .compare("score", r"a\b", true, JoinOperator::And)
            .unwrap()
            .compare("ageBracket", r"c\d", false, JoinOperator::And)
            .unwrap();
        let sql = search.criteria().where_sql().unwrap();
        assert!(sql.contains(r"LIKE '%a\\\\b%'"), "{}", sql);
        assert!(sql.contains(r"= 'c\\d'"), "{}", sql);
    }

    #[test]
    fn test_shadowed_compare_uses_column() {
        let mut search = VirtualSearch::new(model(VirtualConfig::shadowed()), SqlDialect::PostgreSql);
        search
            .compare("score", ">= 10", false, JoinOperator::And)
            .unwrap()
            .compare("_ageBracket", "adult", false, JoinOperator::Or)
            .unwrap();
        assert_eq!(
            search.criteria().where_sql().unwrap(),
            "((_score >= 10)) OR ((_ageBracket = 'adult'))"
        );
    }

    #[test]
    fn test_empty_value_is_noop() {
        let mut search = VirtualSearch::new(model(VirtualConfig::packed()), SqlDialect::MySql);
        search.compare("score", "  ", false, JoinOperator::And).unwrap();
        search.compare("score", "<>", false, JoinOperator::And).unwrap();
        assert!(search.criteria().is_empty());
    }

    #[test]
    fn test_errors() {
        let mut search = VirtualSearch::new(model(VirtualConfig::packed()), SqlDialect::MySql);
        assert!(matches!(
            search.compare("rank", "1", false, JoinOperator::And),
            Err(DbError::InvalidArgument(_))
        ));

        let mut oracle =
            VirtualSearch::new(model(VirtualConfig::packed()), SqlDialect::Other("oci".into()));
        assert!(matches!(
            oracle.order_by("score", false),
            Err(DbError::UnsupportedQueryEngine(_))
        ));
    }
}
