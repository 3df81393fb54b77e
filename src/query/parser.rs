// Raw engine-native expressions are read with sqlparser and converted into
// our own Expr tree so the memory store can evaluate them.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use sqlparser::ast as sql_ast;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::Token;

use super::ast::{BinaryOp, Expr, UnaryOp};
use super::dialect::SqlDialect;
use crate::core::{DbError, Result, Value};

const PARSED_CACHE_SIZE: NonZeroUsize = match NonZeroUsize::new(256) {
    Some(size) => size,
    None => panic!("cache size must be non-zero"),
};

lazy_static::lazy_static! {
    static ref PARSED_EXPR_CACHE: Mutex<LruCache<(SqlDialect, String), Arc<Expr>>> =
        Mutex::new(LruCache::new(PARSED_CACHE_SIZE));
}

/// Parses a single SQL expression in the given dialect, reusing earlier
/// parses of the same text.
pub fn parse_expression_cached(dialect: &SqlDialect, sql: &str) -> Result<Arc<Expr>> {
    let cache_key = (dialect.clone(), sql.to_string());
    {
        let mut cache = PARSED_EXPR_CACHE.lock()?;
        if let Some(expr) = cache.get(&cache_key) {
            return Ok(Arc::clone(expr));
        }
    }

    let parsed = Arc::new(ExpressionParser::new(dialect.clone()).parse(sql)?);
    PARSED_EXPR_CACHE.lock()?.put(cache_key, Arc::clone(&parsed));
    Ok(parsed)
}

pub struct ExpressionParser {
    dialect: SqlDialect,
    converter: ExpressionConverter,
}

impl ExpressionParser {
    pub fn new(dialect: SqlDialect) -> Self {
        Self {
            dialect,
            converter: ExpressionConverter,
        }
    }

    pub fn parse(&self, sql: &str) -> Result<Expr> {
        let dialect = self.dialect.parser_dialect();
        let mut parser = Parser::new(dialect.as_ref()).try_with_sql(sql)?;
        let parsed = parser.parse_expr()?;
        parser.expect_token(&Token::EOF)?;
        self.converter.convert(parsed)
    }
}

/// Converts sqlparser expressions into our AST
pub struct ExpressionConverter;

impl ExpressionConverter {
    pub fn convert(&self, expr: sql_ast::Expr) -> Result<Expr> {
        match expr {
            sql_ast::Expr::Identifier(ident) => Ok(Expr::Column(ident.value)),
            sql_ast::Expr::CompoundIdentifier(idents) => idents
                .into_iter()
                .last()
                .map(|ident| Expr::Column(ident.value))
                .ok_or_else(|| DbError::ParseError("Empty compound identifier".into())),
            sql_ast::Expr::Value(val) => Ok(Expr::Literal(self.convert_value(&val.value)?)),
            sql_ast::Expr::Nested(inner) => self.convert(*inner),

            sql_ast::Expr::BinaryOp { left, op, right } => Ok(Expr::BinaryOp {
                left: Box::new(self.convert(*left)?),
                op: self.convert_binary_op(&op)?,
                right: Box::new(self.convert(*right)?),
            }),

            sql_ast::Expr::UnaryOp { op, expr } => {
                let op = match op {
                    sql_ast::UnaryOperator::Not => UnaryOp::Not,
                    sql_ast::UnaryOperator::Minus => UnaryOp::Minus,
                    sql_ast::UnaryOperator::Plus => UnaryOp::Plus,
                    other => {
                        return Err(DbError::UnsupportedOperation(format!(
                            "Unsupported unary operator: {:?}",
                            other
                        )));
                    }
                };
                let inner = self.convert(*expr)?;
                // fold negative numeric literals so `-1` stays a literal
                Ok(match (op, inner) {
                    (UnaryOp::Minus, Expr::Literal(Value::Integer(i))) => {
                        Expr::Literal(Value::Integer(-i))
                    }
                    (UnaryOp::Minus, Expr::Literal(Value::Float(f))) => {
                        Expr::Literal(Value::Float(-f))
                    }
                    (op, inner) => Expr::UnaryOp {
                        op,
                        expr: Box::new(inner),
                    },
                })
            }

            sql_ast::Expr::Like {
                negated,
                expr,
                pattern,
                escape_char,
                ..
            } => {
                let escape = escape_char.map(|e| e.to_string());
                self.convert_like(*expr, *pattern, negated, escape, false)
            }
            sql_ast::Expr::ILike {
                negated,
                expr,
                pattern,
                escape_char,
                ..
            } => {
                let escape = escape_char.map(|e| e.to_string());
                self.convert_like(*expr, *pattern, negated, escape, true)
            }

            sql_ast::Expr::InList {
                expr,
                list,
                negated,
            } => Ok(Expr::In {
                expr: Box::new(self.convert(*expr)?),
                list: list
                    .into_iter()
                    .map(|item| self.convert(item))
                    .collect::<Result<Vec<_>>>()?,
                negated,
            }),

            sql_ast::Expr::IsNull(inner) => Ok(Expr::IsNull {
                expr: Box::new(self.convert(*inner)?),
                negated: false,
            }),
            sql_ast::Expr::IsNotNull(inner) => Ok(Expr::IsNull {
                expr: Box::new(self.convert(*inner)?),
                negated: true,
            }),

            sql_ast::Expr::Substring {
                expr,
                substring_from,
                substring_for,
                ..
            } => {
                let mut args = vec![self.convert(*expr)?];
                args.push(match substring_from {
                    Some(from) => self.convert(*from)?,
                    None => Expr::Literal(Value::Integer(1)),
                });
                if let Some(len) = substring_for {
                    args.push(self.convert(*len)?);
                }
                Ok(Expr::function("SUBSTRING", args))
            }

            // POSITION(needle IN haystack)
            sql_ast::Expr::Position { expr, r#in } => Ok(Expr::function(
                "POSITION",
                vec![self.convert(*expr)?, self.convert(*r#in)?],
            )),

            sql_ast::Expr::Function(func) => self.convert_function(func),

            other => Err(DbError::UnsupportedOperation(format!(
                "Unsupported expression: {}",
                other
            ))),
        }
    }

    fn convert_like(
        &self,
        expr: sql_ast::Expr,
        pattern: sql_ast::Expr,
        negated: bool,
        escape: Option<String>,
        case_insensitive: bool,
    ) -> Result<Expr> {
        // patterns are always matched with backslash as the escape character
        if let Some(escape) = escape
            && escape.trim_matches('\'') != "\\"
        {
            return Err(DbError::UnsupportedOperation(format!(
                "LIKE ESCAPE {} not supported",
                escape
            )));
        }
        Ok(Expr::Like {
            expr: Box::new(self.convert(expr)?),
            pattern: Box::new(self.convert(pattern)?),
            negated,
            case_insensitive,
        })
    }

    fn convert_function(&self, func: sql_ast::Function) -> Result<Expr> {
        let name = func.name.to_string().to_uppercase();

        let args = match func.args {
            sql_ast::FunctionArguments::List(arg_list) => arg_list
                .args
                .into_iter()
                .map(|arg| match arg {
                    sql_ast::FunctionArg::Unnamed(sql_ast::FunctionArgExpr::Expr(e)) => {
                        self.convert(e)
                    }
                    _ => Err(DbError::UnsupportedOperation(format!(
                        "Only unnamed expression arguments supported in {}",
                        name
                    ))),
                })
                .collect::<Result<Vec<_>>>()?,
            sql_ast::FunctionArguments::None => Vec::new(),
            sql_ast::FunctionArguments::Subquery(_) => {
                return Err(DbError::UnsupportedOperation(format!(
                    "Subquery arguments not supported in {}",
                    name
                )));
            }
        };

        Ok(Expr::Function { name, args })
    }

    pub fn convert_value(&self, val: &sql_ast::Value) -> Result<Value> {
        match val {
            sql_ast::Value::Number(n, _) => {
                if let Ok(i) = n.parse::<i64>() {
                    Ok(Value::Integer(i))
                } else if let Ok(f) = n.parse::<f64>() {
                    Ok(Value::Float(f))
                } else {
                    Err(DbError::TypeMismatch(format!("Invalid number: {}", n)))
                }
            }
            sql_ast::Value::SingleQuotedString(s) | sql_ast::Value::DoubleQuotedString(s) => {
                Ok(Value::Text(s.clone()))
            }
            sql_ast::Value::Boolean(b) => Ok(Value::Boolean(*b)),
            sql_ast::Value::Null => Ok(Value::Null),
            _ => Err(DbError::UnsupportedOperation(format!(
                "Unsupported value: {}",
                val
            ))),
        }
    }

    pub fn convert_binary_op(&self, op: &sql_ast::BinaryOperator) -> Result<BinaryOp> {
        use sql_ast::BinaryOperator as SqlOp;

        match op {
            SqlOp::Plus => Ok(BinaryOp::Add),
            SqlOp::Minus => Ok(BinaryOp::Subtract),
            SqlOp::Multiply => Ok(BinaryOp::Multiply),
            SqlOp::Divide => Ok(BinaryOp::Divide),
            SqlOp::Modulo => Ok(BinaryOp::Modulo),

            SqlOp::Eq => Ok(BinaryOp::Eq),
            SqlOp::NotEq => Ok(BinaryOp::NotEq),
            SqlOp::Lt => Ok(BinaryOp::Lt),
            SqlOp::LtEq => Ok(BinaryOp::LtEq),
            SqlOp::Gt => Ok(BinaryOp::Gt),
            SqlOp::GtEq => Ok(BinaryOp::GtEq),

            SqlOp::And => Ok(BinaryOp::And),
            SqlOp::Or => Ok(BinaryOp::Or),

            _ => Err(DbError::UnsupportedOperation(format!(
                "Unsupported binary operator: {}",
                op
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(dialect: SqlDialect, sql: &str) -> Expr {
        ExpressionParser::new(dialect).parse(sql).unwrap()
    }

    #[test]
    fn test_parse_nested_function() {
        let expr = parse(
            SqlDialect::MySql,
            "SUBSTRING_INDEX(SUBSTRING_INDEX(virtual_cache, ',a:', -1), ',', 1)",
        );
        let Expr::Function { name, args } = expr else {
            panic!("expected function");
        };
        assert_eq!(name, "SUBSTRING_INDEX");
        assert_eq!(args.len(), 3);
        assert_eq!(args[2], Expr::Literal(Value::Integer(1)));
        let Expr::Function { args: inner, .. } = &args[0] else {
            panic!("expected nested function");
        };
        assert_eq!(inner[2], Expr::Literal(Value::Integer(-1)));
    }

    #[test]
    fn test_parse_comparison_and_like() {
        let expr = parse(SqlDialect::PostgreSql, "(name = 'Ann') OR name LIKE '%ee%'");
        let Expr::BinaryOp { op, right, .. } = expr else {
            panic!("expected binary op");
        };
        assert_eq!(op, BinaryOp::Or);
        assert!(matches!(*right, Expr::Like { negated: false, .. }));
    }

    #[test]
    fn test_parse_substring_forms() {
        let expr = parse(SqlDialect::Sqlite, "SUBSTR(a, 2, 3)");
        let Expr::Function { name, args } = expr else {
            panic!("expected function");
        };
        assert!(name == "SUBSTR" || name == "SUBSTRING");
        assert_eq!(args.len(), 3);
    }

    #[test]
    fn test_parse_like_escape() {
        let expr = parse(SqlDialect::Sqlite, r"name LIKE '%50\%%' ESCAPE '\'");
        assert!(matches!(expr, Expr::Like { .. }));

        let other = ExpressionParser::new(SqlDialect::Sqlite).parse("name LIKE '%a!%' ESCAPE '!'");
        assert!(other.is_err());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let result = ExpressionParser::new(SqlDialect::MySql).parse("(a = ");
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_rejects_trailing_tokens() {
        let result = ExpressionParser::new(SqlDialect::MySql).parse("a = 1 b");
        assert!(result.is_err());
    }

    #[test]
    fn test_cached_parse_returns_same_tree() {
        let a = parse_expression_cached(&SqlDialect::MySql, "a = 1").unwrap();
        let b = parse_expression_cached(&SqlDialect::MySql, "a = 1").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
